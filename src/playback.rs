use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use crossbeam_queue::SegQueue;
use crossbeam_utils::atomic::AtomicCell;
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use crate::intervals::Interval;
use crate::patterns::Pattern;
use crate::scales::Scale;

pub const DEFAULT_NOTE_DURATION_MS: u64 = 500;
const DRIVER_TICK: Duration = Duration::from_millis(1);

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Partial {
    pub ratio: f64,
    pub gain: f64,
}

const fn p(ratio: f64, gain: f64) -> Partial {
    Partial {ratio, gain}
}

const HARMONIUM: [Partial; 6] = [p(1.0, 0.6), p(2.0, 0.3), p(3.0, 0.15), p(4.0, 0.1), p(5.0, 0.08), p(6.0, 0.05)];
const TANPURA: [Partial; 7] = [p(1.0, 0.5), p(2.0, 0.35), p(3.0, 0.25), p(4.0, 0.2), p(5.0, 0.15), p(6.0, 0.1), p(7.0, 0.08)];
const PIANO: [Partial; 7] = [p(1.0, 0.7), p(2.0, 0.4), p(3.0, 0.25), p(4.0, 0.15), p(5.0, 0.12), p(6.0, 0.08), p(7.0, 0.05)];
const BANSURI: [Partial; 6] = [p(1.0, 0.7), p(2.0, 0.2), p(3.0, 0.3), p(4.0, 0.1), p(5.0, 0.15), p(6.0, 0.05)];
const SARANGI: [Partial; 8] = [p(1.0, 0.5), p(2.0, 0.4), p(3.0, 0.35), p(4.0, 0.25), p(5.0, 0.2), p(6.0, 0.15), p(7.0, 0.12), p(8.0, 0.08)];
const VEENA: [Partial; 7] = [p(1.0, 0.8), p(2.0, 0.5), p(3.0, 0.4), p(4.0, 0.3), p(5.0, 0.25), p(6.0, 0.2), p(7.0, 0.15)];
const SINE: [Partial; 1] = [p(1.0, 0.3)];
const BELL: [Partial; 5] = [p(1.0, 0.7), p(2.4, 0.4), p(3.8, 0.25), p(5.2, 0.15), p(6.8, 0.1)];

/// Instrument presets handed to the tone renderer as data.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timbre {
    Harmonium,
    Tanpura,
    Piano,
    Bansuri,
    Sarangi,
    Veena,
    Sine,
    Bell,
}

impl Default for Timbre {
    fn default() -> Self {Timbre::Harmonium}
}

impl Timbre {
    pub fn name(&self) -> &'static str {
        match self {
            Timbre::Harmonium => "Harmonium",
            Timbre::Tanpura => "Tanpura",
            Timbre::Piano => "Piano",
            Timbre::Bansuri => "Bansuri (Flute)",
            Timbre::Sarangi => "Sarangi",
            Timbre::Veena => "Veena/Sitar",
            Timbre::Sine => "Pure Tone (Sine)",
            Timbre::Bell => "Bell",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Timbre::Harmonium => "Rich reed organ sound, popular in Indian classical",
            Timbre::Tanpura => "Resonant drone with rich overtones",
            Timbre::Piano => "Bright, percussive with clear attack",
            Timbre::Bansuri => "Soft, breathy bamboo flute",
            Timbre::Sarangi => "Rich bowed string with vocal quality",
            Timbre::Veena => "Plucked string with resonant decay",
            Timbre::Sine => "Clean reference tone for precise pitch",
            Timbre::Bell => "Bright, clear bell tone",
        }
    }

    /// Frequency multiples of the fundamental and their gains.
    pub fn partials(&self) -> &'static [Partial] {
        match self {
            Timbre::Harmonium => &HARMONIUM,
            Timbre::Tanpura => &TANPURA,
            Timbre::Piano => &PIANO,
            Timbre::Bansuri => &BANSURI,
            Timbre::Sarangi => &SARANGI,
            Timbre::Veena => &VEENA,
            Timbre::Sine => &SINE,
            Timbre::Bell => &BELL,
        }
    }
}

/// Fire-and-forget tone output. Implementations apply their own envelope.
pub trait ToneRenderer {
    fn render_tone(&mut self, frequency_hz: f64, duration_s: f64, timbre: Timbre);
}

/// Writes each tone to the log instead of a sound device.
#[derive(Copy, Clone, Debug, Default)]
pub struct LoggingRenderer;

impl ToneRenderer for LoggingRenderer {
    fn render_tone(&mut self, frequency_hz: f64, duration_s: f64, timbre: Timbre) {
        log::info!(target: "tone", "{frequency_hz:.2} Hz for {duration_s:.2} s ({})", timbre.name());
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalStyle {
    Melodic,
    Harmonic,
}

/// Tones that start together.
#[derive(Clone, Debug, PartialEq)]
pub struct Cue {
    frequencies: Vec<f64>,
}

impl Cue {
    pub fn single(frequency_hz: f64) -> Self {
        Cue {frequencies: vec![frequency_hz]}
    }

    pub fn together(frequencies: &[f64]) -> Self {
        Cue {frequencies: frequencies.to_vec()}
    }

    pub fn frequencies(&self) -> &[f64] {&self.frequencies}
}

/// One cue per degree, tuned with the scale's own ratios.
pub fn melodic_cues(pattern: &Pattern, scale: &Scale, base_frequency_hz: f64) -> Vec<Cue> {
    pattern
        .iter()
        .map(|d| Cue::single(scale.degree_frequency(base_frequency_hz, d)))
        .collect()
}

pub fn interval_cues(intervals: &[Interval], style: IntervalStyle) -> Vec<Cue> {
    let mut cues = vec![];
    for interval in intervals.iter() {
        let (start, end) = (interval.start_frequency_hz(), interval.end_frequency_hz());
        match style {
            IntervalStyle::Melodic => {
                cues.push(Cue::single(start));
                cues.push(Cue::single(end));
            }
            IntervalStyle::Harmonic => cues.push(Cue::together(&[start, end])),
        }
    }
    cues
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaybackSettings {
    note_duration: Duration,
    gap: Duration,
    speed: f64,
    loop_count: usize,
    timbre: Timbre,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        PlaybackSettings {
            note_duration: Duration::from_millis(DEFAULT_NOTE_DURATION_MS),
            gap: Duration::ZERO,
            speed: 1.0,
            loop_count: 1,
            timbre: Timbre::default(),
        }
    }
}

impl PlaybackSettings {
    /// Non-positive speeds fall back to 1.0 and zero loops become one.
    pub fn new(note_duration: Duration, gap: Duration, speed: f64, loop_count: usize, timbre: Timbre) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {speed} else {1.0};
        PlaybackSettings {note_duration, gap, speed, loop_count: loop_count.max(1), timbre}
    }

    pub fn note_duration(&self) -> Duration {self.note_duration}

    pub fn gap(&self) -> Duration {self.gap}

    pub fn speed(&self) -> f64 {self.speed}

    pub fn loop_count(&self) -> usize {self.loop_count}

    pub fn timbre(&self) -> Timbre {self.timbre}

    pub fn with_timbre(self, timbre: Timbre) -> Self {
        PlaybackSettings {timbre, ..self}
    }

    /// Time from the start of one cue to the start of the next.
    pub fn step_delay(&self) -> Duration {
        (self.note_duration + self.gap).div_f64(self.speed)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PlaybackState {
    Idle,
    Playing {step: usize, loop_index: usize},
    Paused {step: usize, loop_index: usize},
    Finished,
}

/// A scheduled continuation. It only fires if its epoch is still current.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Wakeup {
    epoch: u64,
    at: Duration,
}

impl Wakeup {
    pub fn epoch(&self) -> u64 {self.epoch}

    pub fn at(&self) -> Duration {self.at}
}

#[derive(Clone, Debug)]
pub enum PlaybackCommand {
    Load(Vec<Cue>),
    Play,
    Pause,
    Resume,
    Restart,
    Stop,
    Settings(PlaybackSettings),
}

/// Cue-by-cue playback on a single timeline. Times are offsets from an
/// arbitrary origin chosen by the driver.
#[derive(Clone, Debug)]
pub struct PlaybackScheduler {
    cues: Vec<Cue>,
    settings: PlaybackSettings,
    state: PlaybackState,
    epoch: u64,
    pending: Option<Wakeup>,
}

impl PlaybackScheduler {
    pub fn new(settings: PlaybackSettings) -> Self {
        PlaybackScheduler {cues: vec![], settings, state: PlaybackState::Idle, epoch: 0, pending: None}
    }

    pub fn state(&self) -> PlaybackState {self.state}

    pub fn epoch(&self) -> u64 {self.epoch}

    pub fn settings(&self) -> PlaybackSettings {self.settings}

    pub fn cues(&self) -> &[Cue] {&self.cues}

    pub fn pending(&self) -> Option<Wakeup> {self.pending}

    pub fn set_settings(&mut self, settings: PlaybackSettings) {
        self.settings = settings;
    }

    /// Replaces the sequence and cancels anything in flight.
    pub fn load(&mut self, cues: Vec<Cue>) {
        self.invalidate();
        self.cues = cues;
        self.state = PlaybackState::Idle;
    }

    pub fn play(&mut self, now: Duration) -> Option<Wakeup> {
        match self.state {
            PlaybackState::Playing {..} => self.pending,
            PlaybackState::Paused {..} => self.resume(now),
            PlaybackState::Idle | PlaybackState::Finished => {
                if self.cues.is_empty() {
                    return None;
                }
                log::info!("Playing {} cues, {} loop(s)", self.cues.len(), self.settings.loop_count());
                self.state = PlaybackState::Playing {step: 0, loop_index: 0};
                self.schedule(now)
            }
        }
    }

    pub fn pause(&mut self) {
        if let PlaybackState::Playing {step, loop_index} = self.state {
            self.invalidate();
            self.state = PlaybackState::Paused {step, loop_index};
            log::info!("Paused at cue {step}");
        }
    }

    pub fn resume(&mut self, now: Duration) -> Option<Wakeup> {
        match self.state {
            PlaybackState::Paused {step, loop_index} => {
                self.state = PlaybackState::Playing {step, loop_index};
                self.schedule(now)
            }
            _ => self.pending,
        }
    }

    pub fn restart(&mut self, now: Duration) -> Option<Wakeup> {
        self.invalidate();
        self.state = PlaybackState::Idle;
        self.play(now)
    }

    pub fn stop(&mut self) {
        self.invalidate();
        self.state = PlaybackState::Idle;
    }

    /// Plays the next cue and schedules the one after it. Stale wake-ups
    /// do nothing.
    pub fn fire<R: ToneRenderer + ?Sized>(&mut self, wakeup: Wakeup, now: Duration, renderer: &mut R) -> Option<Wakeup> {
        if wakeup.epoch != self.epoch {
            log::debug!("Ignoring wake-up from epoch {} (now {})", wakeup.epoch, self.epoch);
            return None;
        }
        let (mut step, mut loop_index) = match self.state {
            PlaybackState::Playing {step, loop_index} => (step, loop_index),
            _ => return None,
        };
        if step >= self.cues.len() {
            if loop_index + 1 < self.settings.loop_count() {
                step = 0;
                loop_index += 1;
            } else {
                log::info!("Playback finished");
                self.state = PlaybackState::Finished;
                self.pending = None;
                return None;
            }
        }
        let duration_s = self.settings.note_duration().as_secs_f64();
        for frequency in self.cues[step].frequencies() {
            renderer.render_tone(*frequency, duration_s, self.settings.timbre());
        }
        self.state = PlaybackState::Playing {step: step + 1, loop_index};
        self.schedule(now + self.settings.step_delay())
    }

    /// Index of the cue most recently started, for highlighting.
    pub fn current_cue(&self) -> Option<usize> {
        match self.state {
            PlaybackState::Playing {step, ..} | PlaybackState::Paused {step, ..} if step > 0 => Some(step - 1),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<f32> {
        let total = self.cues.len() * self.settings.loop_count();
        match self.state {
            PlaybackState::Playing {step, loop_index} | PlaybackState::Paused {step, loop_index} if total > 0 => {
                Some((loop_index * self.cues.len() + step) as f32 / total as f32)
            }
            _ => None,
        }
    }

    pub fn apply(&mut self, command: PlaybackCommand, now: Duration) {
        match command {
            PlaybackCommand::Load(cues) => self.load(cues),
            PlaybackCommand::Play => {self.play(now);}
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Resume => {self.resume(now);}
            PlaybackCommand::Restart => {self.restart(now);}
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::Settings(settings) => self.set_settings(settings),
        }
    }

    fn invalidate(&mut self) {
        self.epoch += 1;
        self.pending = None;
    }

    fn schedule(&mut self, at: Duration) -> Option<Wakeup> {
        self.pending = Some(Wakeup {epoch: self.epoch, at});
        self.pending
    }
}

/// Runs the only playback timeline. Commands arrive on `commands`; progress
/// is published after every tick. The renderer is handed back on quit.
pub fn start_playback_thread<R: ToneRenderer + Send + 'static>(
    commands: Arc<SegQueue<PlaybackCommand>>,
    mut renderer: R,
    settings: PlaybackSettings,
    progress: Arc<AtomicCell<Option<f32>>>,
    quit: Arc<AtomicCell<bool>>,
) -> JoinHandle<R> {
    std::thread::spawn(move || {
        let origin = Instant::now();
        let mut scheduler = PlaybackScheduler::new(settings);
        while !quit.load() {
            let now = origin.elapsed();
            while let Some(command) = commands.pop() {
                scheduler.apply(command, now);
            }
            if let Some(wakeup) = scheduler.pending() {
                if wakeup.at() <= now {
                    scheduler.fire(wakeup, now, &mut renderer);
                }
            }
            progress.store(scheduler.progress());
            std::thread::sleep(DRIVER_TICK);
        }
        renderer
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enum_iterator::all;
    use crate::intervals::{IntervalSpec, MIDDLE_C_HZ};
    use crate::scales::SCALE_TABLE;

    #[derive(Default)]
    struct Recorder {
        tones: Vec<(f64, f64, Timbre)>,
    }

    impl ToneRenderer for Recorder {
        fn render_tone(&mut self, frequency_hz: f64, duration_s: f64, timbre: Timbre) {
            self.tones.push((frequency_hz, duration_s, timbre));
        }
    }

    fn ms(n: u64) -> Duration {Duration::from_millis(n)}

    fn cues(n: usize) -> Vec<Cue> {
        (0..n).map(|i| Cue::single(100.0 * (i + 1) as f64)).collect()
    }

    fn run_to_end(scheduler: &mut PlaybackScheduler, recorder: &mut Recorder) -> Vec<Duration> {
        let mut times = vec![];
        while let Some(wakeup) = scheduler.pending() {
            times.push(wakeup.at());
            scheduler.fire(wakeup, wakeup.at(), recorder);
        }
        times
    }

    #[test]
    fn test_step_delay() {
        let settings = PlaybackSettings::new(ms(500), ms(100), 2.0, 1, Timbre::Sine);
        assert_eq!(settings.step_delay(), ms(300));
        assert_eq!(PlaybackSettings::default().step_delay(), ms(500));
        let bad = PlaybackSettings::new(ms(500), ms(0), -1.0, 0, Timbre::Sine);
        assert_eq!(bad.speed(), 1.0);
        assert_eq!(bad.loop_count(), 1);
    }

    #[test]
    fn test_plays_in_order_with_loops() {
        let mut scheduler = PlaybackScheduler::new(PlaybackSettings::new(ms(400), ms(100), 1.0, 2, Timbre::Piano));
        scheduler.load(cues(3));
        let mut recorder = Recorder::default();
        scheduler.play(ms(0));
        let times = run_to_end(&mut scheduler, &mut recorder);
        let played: Vec<f64> = recorder.tones.iter().map(|t| t.0).collect();
        assert_eq!(played, vec![100.0, 200.0, 300.0, 100.0, 200.0, 300.0]);
        assert!(recorder.tones.iter().all(|t| t.1 == 0.4 && t.2 == Timbre::Piano));
        assert_eq!(times, (0..7).map(|i| ms(500 * i)).collect::<Vec<_>>());
        assert_eq!(scheduler.state(), PlaybackState::Finished);
        assert_eq!(scheduler.progress(), None);
    }

    #[test]
    fn test_pause_cancels_pending() {
        let mut scheduler = PlaybackScheduler::new(PlaybackSettings::default());
        scheduler.load(cues(4));
        let mut recorder = Recorder::default();
        let first = scheduler.play(ms(0)).unwrap();
        let second = scheduler.fire(first, ms(0), &mut recorder).unwrap();
        scheduler.pause();
        assert_eq!(scheduler.state(), PlaybackState::Paused {step: 1, loop_index: 0});
        assert_eq!(scheduler.pending(), None);
        assert_eq!(scheduler.fire(second, ms(500), &mut recorder), None);
        assert_eq!(recorder.tones.len(), 1);

        let resumed = scheduler.resume(ms(2000)).unwrap();
        assert_ne!(resumed.epoch(), second.epoch());
        scheduler.fire(resumed, ms(2000), &mut recorder);
        assert_eq!(recorder.tones[1].0, 200.0);
        assert_eq!(scheduler.current_cue(), Some(1));
        assert_eq!(scheduler.progress(), Some(0.5));
    }

    #[test]
    fn test_rapid_stop_restart() {
        let mut scheduler = PlaybackScheduler::new(PlaybackSettings::default());
        scheduler.load(cues(3));
        let mut recorder = Recorder::default();
        let stale = scheduler.play(ms(0)).unwrap();
        scheduler.stop();
        let fresh = scheduler.restart(ms(10)).unwrap();
        assert_eq!(scheduler.fire(stale, ms(10), &mut recorder), None);
        assert!(recorder.tones.is_empty());
        scheduler.fire(fresh, ms(10), &mut recorder);
        assert_eq!(recorder.tones.len(), 1);

        let stale = scheduler.pending().unwrap();
        scheduler.load(cues(2));
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(scheduler.fire(stale, ms(600), &mut recorder), None);
        assert_eq!(recorder.tones.len(), 1);
    }

    #[test]
    fn test_empty_and_idle() {
        let mut scheduler = PlaybackScheduler::new(PlaybackSettings::default());
        assert_eq!(scheduler.play(ms(0)), None);
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        scheduler.pause();
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(scheduler.resume(ms(0)), None);
    }

    #[test]
    fn test_interval_cues() {
        let intervals = vec![
            Interval::resolve(IntervalSpec::up(7), 1, MIDDLE_C_HZ),
            Interval::resolve(IntervalSpec::down(3), 5, MIDDLE_C_HZ),
        ];
        let melodic = interval_cues(&intervals, IntervalStyle::Melodic);
        assert_eq!(melodic.len(), 4);
        assert!(melodic.iter().all(|c| c.frequencies().len() == 1));
        let harmonic = interval_cues(&intervals, IntervalStyle::Harmonic);
        assert_eq!(harmonic.len(), 2);

        let mut scheduler = PlaybackScheduler::new(PlaybackSettings::default());
        scheduler.load(harmonic);
        let mut recorder = Recorder::default();
        let first = scheduler.play(ms(0)).unwrap();
        scheduler.fire(first, ms(0), &mut recorder);
        assert_eq!(recorder.tones.len(), 2);
        assert_eq!(recorder.tones[0].0, intervals[0].start_frequency_hz());
        assert_eq!(recorder.tones[1].0, intervals[0].end_frequency_hz());
    }

    #[test]
    fn test_melodic_cues_use_scale_ratios() {
        let scale = SCALE_TABLE.get_or_default("major");
        let pattern = Pattern::custom(&[1, 3, 5], scale.len()).unwrap();
        let cues = melodic_cues(&pattern, scale, MIDDLE_C_HZ);
        assert_eq!(cues.len(), 3);
        assert!((cues[1].frequencies()[0] - MIDDLE_C_HZ * 1.25).abs() < 1e-9);
        assert!((cues[2].frequencies()[0] - MIDDLE_C_HZ * 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_timbres() {
        for timbre in all::<Timbre>() {
            assert!(!timbre.partials().is_empty());
            assert_eq!(timbre.partials()[0].ratio, 1.0);
            assert!(!timbre.description().is_empty());
        }
        assert_eq!(all::<Timbre>().count(), 8);
    }

    #[test]
    fn test_playback_thread() {
        let commands = Arc::new(SegQueue::new());
        let progress = Arc::new(AtomicCell::new(None));
        let quit = Arc::new(AtomicCell::new(false));
        let settings = PlaybackSettings::new(ms(5), ms(0), 1.0, 1, Timbre::Sine);
        let handle = start_playback_thread(commands.clone(), Recorder::default(), settings, progress.clone(), quit.clone());
        commands.push(PlaybackCommand::Load(cues(3)));
        commands.push(PlaybackCommand::Play);
        std::thread::sleep(ms(200));
        quit.store(true);
        let recorder = handle.join().unwrap();
        let played: Vec<f64> = recorder.tones.iter().map(|t| t.0).collect();
        assert_eq!(played, vec![100.0, 200.0, 300.0]);
        assert_eq!(progress.load(), None);
    }
}
