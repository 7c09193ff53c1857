use std::sync::Arc;
use std::time::Duration;
use crossbeam_queue::SegQueue;
use crossbeam_utils::atomic::AtomicCell;
use enum_iterator::{all, Sequence};
use read_input::prelude::*;
use eartrainer::config::{user_pick_element, TrainerConfig};
use eartrainer::interval_patterns::IntervalMode;
use eartrainer::patterns::{Difficulty, Pattern};
use eartrainer::pitch::{PitchDetector, SineSource, TunerPoller, DEFAULT_BUFFER_SIZE};
use eartrainer::playback::{start_playback_thread, IntervalStyle, LoggingRenderer, PlaybackCommand, PlaybackSettings, Timbre};
use eartrainer::practice_log::{Bookmark, HistoryEntry, PracticeLog, SqliteStore};
use eartrainer::scales::{SolfegeSystem, SCALE_TABLE};
use eartrainer::session::{Exercise, PatternSource, PracticeMode, PracticeSession};

const TUNER_SAMPLE_RATE: f64 = 44100.0;
const TUNER_FRAMES: usize = 5;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence)]
enum Action {
    Generate,
    Intervals,
    Custom,
    Play,
    SelfPaced,
    Scale,
    Difficulty,
    Source,
    Display,
    Playback,
    Instrument,
    Bookmark,
    Bookmarks,
    History,
    Tuner,
    Quit,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Generate => "Generate melodic pattern",
            Action::Intervals => "Generate intervals",
            Action::Custom => "Enter custom pattern",
            Action::Play => "Play exercise",
            Action::SelfPaced => "Self-paced practice",
            Action::Scale => "Choose scale",
            Action::Difficulty => "Choose difficulty",
            Action::Source => "Choose pattern source",
            Action::Display => "Display options",
            Action::Playback => "Playback settings",
            Action::Instrument => "Choose instrument",
            Action::Bookmark => "Bookmark current pattern",
            Action::Bookmarks => "Load bookmark",
            Action::History => "Show history",
            Action::Tuner => "Tuner demo",
            Action::Quit => "Quit",
        }
    }
}

struct Player {
    commands: Arc<SegQueue<PlaybackCommand>>,
    progress: Arc<AtomicCell<Option<f32>>>,
    quit: Arc<AtomicCell<bool>>,
}

impl Player {
    fn start(settings: PlaybackSettings) -> Self {
        let commands = Arc::new(SegQueue::new());
        let progress = Arc::new(AtomicCell::new(None));
        let quit = Arc::new(AtomicCell::new(false));
        start_playback_thread(commands.clone(), LoggingRenderer, settings, progress.clone(), quit.clone());
        Player {commands, progress, quit}
    }

    fn play_through(&self, session: &PracticeSession, style: IntervalStyle) {
        self.commands.push(PlaybackCommand::Load(session.playback_cues(style)));
        self.commands.push(PlaybackCommand::Play);
        std::thread::sleep(Duration::from_millis(20));
        while let Some(progress) = self.progress.load() {
            println!("{:>3.0}%", progress * 100.0);
            std::thread::sleep(Duration::from_millis(250));
        }
        println!("Done");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.quit.store(true);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = TrainerConfig::load()?;
    let mut session = PracticeSession::new(config.base_frequency_hz());
    session.set_scale(config.scale_key())?;
    session.set_difficulty(config.difficulty());

    let db_path = config.database_path();
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut practice_log = PracticeLog::new(SqliteStore::open(&db_path.to_string_lossy())?, config.history_limit());
    let mut sliders = config.sliders();
    let mut timbre = practice_log.instrument().unwrap_or_else(|e| {
        log::warn!(target: "practice_log", "could not read instrument: {e}");
        config.timbre()
    });
    let player = Player::start(sliders.settings(timbre));

    loop {
        println!();
        println!("{}", session.scale_info());
        show_exercise(&session);
        match user_pick_element(all::<Action>(), |a| a.name().to_string()) {
            Action::Generate => {
                session.generate();
                record(&mut practice_log, &session);
            }
            Action::Intervals => {
                let mode = user_pick_element(all::<IntervalMode>(), |m| m.name().to_string());
                let length: usize = input().msg("How many intervals (1-12)? ").inside(1..=12).get();
                session.generate_intervals(mode, length);
                record(&mut practice_log, &session);
            }
            Action::Custom => {
                let text: String = input().msg("Degrees (e.g. 1 3 5 3 1): ").get();
                match Pattern::parse(text.as_str(), session.scale().len()) {
                    Ok(pattern) => {
                        session.use_custom_pattern(pattern.degrees())?;
                        record(&mut practice_log, &session);
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Action::Play => {
                let style = match session.exercise() {
                    Exercise::Intervals(_) => user_pick_element(all::<IntervalStyle>(), |s| format!("{s:?}")),
                    _ => IntervalStyle::Melodic,
                };
                player.play_through(&session, style);
            }
            Action::SelfPaced => self_paced(&mut session, &player),
            Action::Scale => {
                let key = user_pick_element(SCALE_TABLE.iter(), |s| s.display_name()).key().to_owned();
                session.set_scale(key.as_str())?;
            }
            Action::Difficulty => {
                session.set_difficulty(user_pick_element(all::<Difficulty>(), |d| d.name().to_string()));
            }
            Action::Source => {
                session.set_source(user_pick_element(all::<PatternSource>(), |s| s.name().to_string()));
            }
            Action::Display => {
                let system = user_pick_element(all::<SolfegeSystem>(), |s| s.name().to_string());
                let numbers = yes_no("Show numbers?");
                let syllables = yes_no("Show syllables?");
                let display = session.display_mut();
                display.set_system(system);
                display.toggle(numbers, syllables);
            }
            Action::Playback => {
                sliders.console_pick_all();
                player.commands.push(PlaybackCommand::Settings(sliders.settings(timbre)));
            }
            Action::Instrument => {
                timbre = user_pick_element(all::<Timbre>(), |t| format!("{}: {}", t.name(), t.description()));
                practice_log.set_instrument(timbre)?;
                player.commands.push(PlaybackCommand::Settings(sliders.settings(timbre)));
            }
            Action::Bookmark => match Bookmark::of(&session) {
                Some(bookmark) => {
                    if !practice_log.add_bookmark(bookmark)? {
                        println!("Already bookmarked");
                    }
                }
                None => println!("Only melodic patterns can be bookmarked"),
            },
            Action::Bookmarks => {
                let bookmarks = practice_log.bookmarks()?;
                if bookmarks.is_empty() {
                    println!("No bookmarks yet");
                } else {
                    let chosen = user_pick_element(bookmarks.into_iter(), |b| {
                        format!("{} ({}): {:?}", b.scale_key, b.difficulty, b.degrees)
                    });
                    session.set_scale(chosen.scale_key.as_str())?;
                    session.set_difficulty(chosen.difficulty);
                    let pattern = chosen.pattern(session.scale().len())?;
                    session.use_custom_pattern(pattern.degrees())?;
                }
            }
            Action::History => {
                for entry in practice_log.history()? {
                    println!("{} {} {} [{}]", entry.scale_key, entry.difficulty, entry.source.name(), entry.summary);
                }
            }
            Action::Tuner => tuner_demo(&config),
            Action::Quit => break,
        }
    }
    Ok(())
}

fn show_exercise(session: &PracticeSession) {
    match session.exercise() {
        Exercise::Empty => println!("No exercise yet"),
        Exercise::Melodic(_) => {
            let labels = (0..session.exercise().len())
                .filter_map(|i| session.highlight(i))
                .map(|h| h.label)
                .collect::<Vec<_>>();
            println!("Pattern: {}", labels.join(" "));
        }
        Exercise::Intervals(intervals) => {
            for i in 0..intervals.len() {
                if let Some(label) = session.interval_label(i) {
                    println!("{label}");
                }
            }
        }
    }
}

fn self_paced(session: &mut PracticeSession, player: &Player) {
    if session.pattern().is_none() {
        println!("Generate a melodic pattern first");
        return;
    }
    session.set_practice_mode(PracticeMode::SelfPaced);
    let mut current = session.restart_self_paced();
    while let Some(highlight) = current {
        let step = highlight.interval_label.map(|l| format!(" ({l})")).unwrap_or_default();
        println!("Note {}: {}{}", highlight.index + 1, highlight.label, step);
        let mut check = yes_no("Hear it before singing?");
        while check {
            if let Some(cue) = session.check_current_note() {
                player.commands.push(PlaybackCommand::Load(vec![cue]));
                player.commands.push(PlaybackCommand::Play);
            }
            check = yes_no("Hear it again?");
        }
        current = session.move_to_next_note();
    }
    println!("Pattern complete");
    session.set_practice_mode(PracticeMode::Listen);
}

fn tuner_demo(config: &TrainerConfig) {
    let frequency: f64 = input()
        .msg("Reference tone to analyze (80-1200 Hz): ")
        .inside(80.0..=1200.0)
        .get();
    let source = SineSource::new(frequency, 0.5, TUNER_SAMPLE_RATE);
    let detector = PitchDetector::new(config.rms_floor());
    let mut poller = TunerPoller::new(source, detector, DEFAULT_BUFFER_SIZE, config.a4_hz());
    for _ in 0..TUNER_FRAMES {
        match poller.poll_reading() {
            Some(reading) => println!(
                "{:.2} Hz: {} {:+} cents ({})",
                reading.frequency_hz(),
                reading.name(),
                reading.cents(),
                reading.syllable(SolfegeSystem::Western).unwrap_or("-")
            ),
            None => println!("No pitch detected"),
        }
    }
}

fn yes_no(prompt: &str) -> bool {
    let answer: String = input().msg(format!("{prompt} (y/n) ")).get();
    answer.trim().to_lowercase().starts_with('y')
}

fn record(practice_log: &mut PracticeLog<SqliteStore>, session: &PracticeSession) {
    if let Err(e) = practice_log.record_history(HistoryEntry::of(session)) {
        log::warn!(target: "practice_log", "could not record history: {e}");
    }
}
