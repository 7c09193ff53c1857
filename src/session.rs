use anyhow::bail;
use enum_iterator::Sequence;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use crate::interval_patterns::{IntervalMode, IntervalPatternGenerator};
use crate::intervals::{Interval, MIDDLE_C_HZ};
use crate::patterns::{Difficulty, Pattern, PatternGenerator, PatternMode};
use crate::playback::{interval_cues, melodic_cues, Cue, IntervalStyle};
use crate::scales::{Scale, ScaleDegree, SolfegeSystem, DEFAULT_SCALE_KEY, SCALE_TABLE};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    Pedagogical,
    Random,
    Custom,
}

impl PatternSource {
    pub fn name(&self) -> &'static str {
        match self {
            PatternSource::Pedagogical => "Pedagogical",
            PatternSource::Random => "Random",
            PatternSource::Custom => "Custom",
        }
    }

    /// Generator mode for this source. Custom exercises reuse the pedagogical tables
    /// when something has to be generated.
    pub fn mode(&self) -> PatternMode {
        match self {
            PatternSource::Random => PatternMode::Random,
            PatternSource::Pedagogical | PatternSource::Custom => PatternMode::Pedagogical,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PracticeMode {
    Listen,
    SelfPaced,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Exercise {
    Empty,
    Melodic(Pattern),
    Intervals(Vec<Interval>),
}

impl Exercise {
    pub fn len(&self) -> usize {
        match self {
            Exercise::Empty => 0,
            Exercise::Melodic(pattern) => pattern.len(),
            Exercise::Intervals(intervals) => intervals.len(),
        }
    }

    pub fn is_empty(&self) -> bool {self.len() == 0}
}

/// Numbers, syllables or both; never neither.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct DisplayOptions {
    show_numbers: bool,
    show_syllables: bool,
    system: SolfegeSystem,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        DisplayOptions {show_numbers: true, show_syllables: true, system: SolfegeSystem::Western}
    }
}

impl DisplayOptions {
    pub fn new(show_numbers: bool, show_syllables: bool, system: SolfegeSystem) -> Self {
        DisplayOptions {show_numbers: show_numbers || !show_syllables, show_syllables, system}
    }

    pub fn show_numbers(&self) -> bool {self.show_numbers}

    pub fn show_syllables(&self) -> bool {self.show_syllables}

    pub fn system(&self) -> SolfegeSystem {self.system}

    /// Turning off the last visible label turns numbers back on.
    pub fn toggle(&mut self, show_numbers: bool, show_syllables: bool) {
        *self = DisplayOptions::new(show_numbers, show_syllables, self.system);
    }

    pub fn set_system(&mut self, system: SolfegeSystem) {
        self.system = system;
    }

    pub fn label(&self, scale: &Scale, degree: ScaleDegree) -> String {
        let syllable = if self.show_syllables {scale.syllable(self.system, degree)} else {None};
        match (self.show_numbers, syllable) {
            (true, Some(s)) => format!("{degree} ({s})"),
            (false, Some(s)) => s.to_owned(),
            _ => degree.to_string(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NoteHighlight {
    pub index: usize,
    pub degree: ScaleDegree,
    pub label: String,
    pub interval_label: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DegreeView {
    pub degree: ScaleDegree,
    pub number: Option<String>,
    pub syllable: Option<String>,
    pub in_pattern: bool,
    pub active: bool,
}

/// Everything a practice screen needs, passed around explicitly.
#[derive(Clone, Debug)]
pub struct PracticeSession {
    scale_key: String,
    difficulty: Difficulty,
    source: PatternSource,
    practice_mode: PracticeMode,
    display: DisplayOptions,
    exercise: Exercise,
    cursor: usize,
    base_frequency_hz: f64,
    patterns: PatternGenerator,
    intervals: IntervalPatternGenerator,
}

impl Default for PracticeSession {
    fn default() -> Self {
        PracticeSession::new(MIDDLE_C_HZ)
    }
}

impl PracticeSession {
    pub fn new(base_frequency_hz: f64) -> Self {
        let intervals = IntervalPatternGenerator::new(base_frequency_hz).unwrap_or_default();
        PracticeSession {
            scale_key: DEFAULT_SCALE_KEY.to_owned(),
            difficulty: Difficulty::Easy,
            source: PatternSource::Pedagogical,
            practice_mode: PracticeMode::Listen,
            display: DisplayOptions::default(),
            exercise: Exercise::Empty,
            cursor: 0,
            base_frequency_hz: intervals.base_frequency_hz(),
            patterns: PatternGenerator,
            intervals,
        }
    }

    pub fn scale(&self) -> &'static Scale {SCALE_TABLE.get_or_default(&self.scale_key)}

    pub fn scale_key(&self) -> &str {self.scale_key.as_str()}

    pub fn difficulty(&self) -> Difficulty {self.difficulty}

    pub fn source(&self) -> PatternSource {self.source}

    pub fn practice_mode(&self) -> PracticeMode {self.practice_mode}

    pub fn display(&self) -> DisplayOptions {self.display}

    pub fn display_mut(&mut self) -> &mut DisplayOptions {&mut self.display}

    pub fn exercise(&self) -> &Exercise {&self.exercise}

    pub fn base_frequency_hz(&self) -> f64 {self.base_frequency_hz}

    pub fn cursor(&self) -> usize {self.cursor}

    pub fn pattern(&self) -> Option<&Pattern> {
        match &self.exercise {
            Exercise::Melodic(pattern) => Some(pattern),
            _ => None,
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        match &self.exercise {
            Exercise::Intervals(intervals) => intervals.as_slice(),
            _ => &[],
        }
    }

    /// The current exercise is kept; degrees beyond a shorter scale simply
    /// stop showing in the scale view.
    /// The current exercise is kept. Degrees past a shorter scale's end sound
    /// at its top degree until a new pattern is generated.
    pub fn set_scale(&mut self, key: &str) -> anyhow::Result<()> {
        if SCALE_TABLE.get(key).is_none() {
            bail!("Unknown scale: {key}");
        }
        self.scale_key = key.to_owned();
        Ok(())
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    pub fn set_source(&mut self, source: PatternSource) {
        self.source = source;
    }

    pub fn set_practice_mode(&mut self, practice_mode: PracticeMode) {
        self.practice_mode = practice_mode;
        self.cursor = 0;
    }

    pub fn generate(&mut self) -> &Exercise {
        self.generate_with(&mut thread_rng())
    }

    /// Custom sources keep whatever pattern was entered.
    pub fn generate_with<R: Rng>(&mut self, rng: &mut R) -> &Exercise {
        if self.source != PatternSource::Custom {
            let pattern = self.patterns.generate_with(rng, self.source.mode(), self.difficulty, self.scale().len());
            self.exercise = Exercise::Melodic(pattern);
        }
        self.cursor = 0;
        &self.exercise
    }

    pub fn generate_intervals(&mut self, interval_mode: IntervalMode, length: usize) -> &[Interval] {
        self.generate_intervals_with(&mut thread_rng(), interval_mode, length)
    }

    pub fn generate_intervals_with<R: Rng>(&mut self, rng: &mut R, interval_mode: IntervalMode, length: usize) -> &[Interval] {
        let intervals = self.intervals.generate_with(
            rng,
            self.source.mode(),
            interval_mode,
            self.difficulty,
            length,
            self.scale().len(),
        );
        self.exercise = Exercise::Intervals(intervals);
        self.cursor = 0;
        self.intervals()
    }

    pub fn use_custom_pattern(&mut self, degrees: &[ScaleDegree]) -> anyhow::Result<&Pattern> {
        let pattern = Pattern::custom(degrees, self.scale().len())?;
        self.source = PatternSource::Custom;
        self.exercise = Exercise::Melodic(pattern);
        self.cursor = 0;
        self.pattern().ok_or_else(|| anyhow::anyhow!("Custom pattern was not stored"))
    }

    /// Display for note `index` of a melodic exercise.
    pub fn highlight(&self, index: usize) -> Option<NoteHighlight> {
        let pattern = self.pattern()?;
        let degree = pattern.get(index)?;
        Some(NoteHighlight {
            index,
            degree,
            label: self.display.label(self.scale(), degree),
            interval_label: pattern.step_label(index),
        })
    }

    /// Label for interval `index`, with its end degree wrapped into the scale.
    pub fn interval_label(&self, index: usize) -> Option<String> {
        let interval = self.intervals().get(index)?;
        let scale = self.scale();
        let end = interval.display_end_degree(scale.len());
        Some(format!(
            "{interval}: {} → {}",
            self.display.label(scale, interval.start_degree()),
            self.display.label(scale, end)
        ))
    }

    pub fn scale_visual(&self) -> Vec<DegreeView> {
        let scale = self.scale();
        let active = match self.practice_mode {
            PracticeMode::SelfPaced => self.pattern().and_then(|p| p.get(self.cursor)),
            PracticeMode::Listen => None,
        };
        (1..=scale.len() as ScaleDegree)
            .map(|degree| DegreeView {
                degree,
                number: if self.display.show_numbers() {Some(degree.to_string())} else {None},
                syllable: if self.display.show_syllables() {
                    scale.syllable(self.display.system(), degree).map(|s| s.to_owned())
                } else {
                    None
                },
                in_pattern: self.in_exercise(degree),
                active: active == Some(degree),
            })
            .collect()
    }

    pub fn scale_info(&self) -> String {self.scale().info_line()}

    fn in_exercise(&self, degree: ScaleDegree) -> bool {
        match &self.exercise {
            Exercise::Empty => false,
            Exercise::Melodic(pattern) => pattern.contains(degree),
            Exercise::Intervals(intervals) => {
                let len = self.scale().len();
                intervals.iter().any(|i| i.start_degree() == degree || i.display_end_degree(len) == degree)
            }
        }
    }

    /// The tone to sound for the self-paced cursor, if any.
    pub fn check_current_note(&self) -> Option<Cue> {
        let degree = self.pattern()?.get(self.cursor)?;
        Some(Cue::single(self.scale().degree_frequency(self.base_frequency_hz, degree)))
    }

    /// Moves the cursor on. Returns `None` once the last note has been passed.
    pub fn move_to_next_note(&mut self) -> Option<NoteHighlight> {
        let len = self.exercise.len();
        if self.cursor + 1 >= len {
            self.cursor = len;
            return None;
        }
        self.cursor += 1;
        self.highlight(self.cursor)
    }

    pub fn restart_self_paced(&mut self) -> Option<NoteHighlight> {
        self.cursor = 0;
        self.highlight(0)
    }

    pub fn self_paced_complete(&self) -> bool {
        self.cursor >= self.exercise.len()
    }

    pub fn playback_cues(&self, style: IntervalStyle) -> Vec<Cue> {
        match &self.exercise {
            Exercise::Empty => vec![],
            Exercise::Melodic(pattern) => melodic_cues(pattern, self.scale(), self.base_frequency_hz),
            Exercise::Intervals(intervals) => interval_cues(intervals, style),
        }
    }
}
