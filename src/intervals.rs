use std::fmt::{Display, Formatter};
use bare_metal_modulo::{MNum, ModNum};
use enum_iterator::Sequence;
use float_cmp::{ApproxEq, F64Margin};
use ordered_float::OrderedFloat;
use crate::scales::ScaleDegree;

pub const NOTES_PER_OCTAVE: i32 = 12;
pub const MAX_INTERVAL_SEMITONES: u8 = 12;
pub const MIDDLE_C_HZ: f64 = 261.63;
pub const A4_HZ: f64 = 440.0;
pub const A4_MIDI: i32 = 69;

const MAJOR_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

const INTERVAL_NOTATION: [(&str, &str); 13] = [
    ("P1", "Perfect Unison"),
    ("m2", "Minor Second"),
    ("M2", "Major Second"),
    ("m3", "Minor Third"),
    ("M3", "Major Third"),
    ("P4", "Perfect Fourth"),
    ("TT", "Tritone"),
    ("P5", "Perfect Fifth"),
    ("m6", "Minor Sixth"),
    ("M6", "Major Sixth"),
    ("m7", "Minor Seventh"),
    ("M7", "Major Seventh"),
    ("P8", "Perfect Octave"),
];

const STEP_NAMES: [&str; 8] = ["Unison", "Second", "Third", "Fourth", "Fifth", "Sixth", "Seventh", "Octave"];

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(&self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn arrow(&self) -> char {
        match self {
            Direction::Up => '↑',
            Direction::Down => '↓',
        }
    }

    pub fn of_steps(steps: i32) -> Self {
        if steps < 0 {Direction::Down} else {Direction::Up}
    }
}

/// Size and direction of an interval before it is anchored to a scale degree.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Ord, PartialOrd)]
pub struct IntervalSpec {
    semitones: u8,
    direction: Direction,
}

impl IntervalSpec {
    pub fn new(semitones: u8, direction: Direction) -> Self {
        IntervalSpec {semitones: semitones.min(MAX_INTERVAL_SEMITONES), direction}
    }

    pub fn up(semitones: u8) -> Self {Self::new(semitones, Direction::Up)}

    pub fn down(semitones: u8) -> Self {Self::new(semitones, Direction::Down)}

    pub fn semitones(&self) -> u8 {self.semitones}

    pub fn direction(&self) -> Direction {self.direction}

    pub fn signed_semitones(&self) -> i32 {
        self.direction.sign() * self.semitones as i32
    }

    /// Scale steps used to place the end degree: half the semitones, rounded up.
    pub fn degree_span(&self) -> i32 {
        (self.semitones as i32 + 1) / 2
    }

    pub fn notation(&self) -> (&'static str, &'static str) {
        interval_notation(self.semitones)
    }
}

pub fn semitone_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / NOTES_PER_OCTAVE as f64)
}

pub fn frequency_from_semitones(base_frequency_hz: f64, semitones: i32) -> f64 {
    base_frequency_hz * semitone_ratio(semitones as f64)
}

/// Semitones above the tonic of a 1-based degree, using major-scale spacing
/// and extending by octaves past the seventh degree.
pub fn major_semitone_offset(degree: ScaleDegree) -> i32 {
    let i = degree.max(1) as i32 - 1;
    MAJOR_SEMITONES[(i % 7) as usize] + NOTES_PER_OCTAVE * (i / 7)
}

pub fn interval_notation(semitones: u8) -> (&'static str, &'static str) {
    INTERVAL_NOTATION[semitones.min(MAX_INTERVAL_SEMITONES) as usize]
}

/// Name of a melodic step counted in scale degrees.
pub fn step_name(steps: usize) -> String {
    match STEP_NAMES.get(steps) {
        Some(name) => name.to_string(),
        None => format!("{steps} steps"),
    }
}

/// Label for the motion from one melodic degree to the next, e.g. "↑ Third".
pub fn melodic_step_label(from: ScaleDegree, to: ScaleDegree) -> String {
    let steps = to as i32 - from as i32;
    format!("{} {}", Direction::of_steps(steps).arrow(), step_name(steps.unsigned_abs() as usize))
}

pub fn end_degree_for(start_degree: ScaleDegree, spec: IntervalSpec) -> i32 {
    start_degree as i32 + spec.direction().sign() * spec.degree_span()
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Interval {
    spec: IntervalSpec,
    start_degree: ScaleDegree,
    end_degree: i32,
    start_frequency: OrderedFloat<f64>,
    end_frequency: OrderedFloat<f64>,
}

impl ApproxEq for Interval {
    type Margin = F64Margin;

    fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
        let margin = margin.into();
        self.spec == other.spec
            && self.start_degree == other.start_degree
            && self.end_degree == other.end_degree
            && self.start_frequency.into_inner().approx_eq(other.start_frequency.into_inner(), margin)
            && self.end_frequency.into_inner().approx_eq(other.end_frequency.into_inner(), margin)
    }
}

impl Interval {
    /// Anchors `spec` at `start_degree`. The start frequency follows major-scale
    /// semitone spacing from `base_frequency_hz`; the end frequency is exactly
    /// equal-tempered relative to the start.
    pub fn resolve(spec: IntervalSpec, start_degree: ScaleDegree, base_frequency_hz: f64) -> Self {
        let start_degree = start_degree.max(1);
        let start = frequency_from_semitones(base_frequency_hz, major_semitone_offset(start_degree));
        let end = start * semitone_ratio(spec.signed_semitones() as f64);
        Interval {
            spec,
            start_degree,
            end_degree: end_degree_for(start_degree, spec),
            start_frequency: OrderedFloat(start),
            end_frequency: OrderedFloat(end),
        }
    }

    pub fn spec(&self) -> IntervalSpec {self.spec}

    pub fn semitones(&self) -> u8 {self.spec.semitones()}

    pub fn direction(&self) -> Direction {self.spec.direction()}

    pub fn signed_semitones(&self) -> i32 {self.spec.signed_semitones()}

    pub fn start_degree(&self) -> ScaleDegree {self.start_degree}

    /// May fall outside the scale; see `display_end_degree`.
    pub fn end_degree(&self) -> i32 {self.end_degree}

    pub fn start_frequency_hz(&self) -> f64 {self.start_frequency.into_inner()}

    pub fn end_frequency_hz(&self) -> f64 {self.end_frequency.into_inner()}

    pub fn notation_short(&self) -> &'static str {self.spec.notation().0}

    pub fn notation_long(&self) -> &'static str {self.spec.notation().1}

    pub fn cents(&self) -> f64 {
        1200.0 * (self.end_frequency_hz() / self.start_frequency_hz()).log2()
    }

    /// End degree wrapped into `[1, scale_len]` for labelling.
    pub fn display_end_degree(&self, scale_len: usize) -> ScaleDegree {
        if scale_len == 0 {
            return 1;
        }
        let mut wrapped = ModNum::new(0, scale_len);
        let offset = self.end_degree - 1;
        if offset >= 0 {
            wrapped += offset as usize;
        } else {
            wrapped -= offset.unsigned_abs() as usize;
        }
        (wrapped.a() + 1) as ScaleDegree
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.direction().arrow(), self.notation_long(), self.notation_short())
    }
}

pub fn note_from_pitch(frequency_hz: f64, a4_hz: f64) -> i32 {
    (NOTES_PER_OCTAVE as f64 * (frequency_hz / a4_hz).log2()).round() as i32 + A4_MIDI
}

pub fn frequency_from_note_number(note: i32, a4_hz: f64) -> f64 {
    a4_hz * semitone_ratio((note - A4_MIDI) as f64)
}

pub fn cents_off_from_pitch(frequency_hz: f64, note: i32, a4_hz: f64) -> i32 {
    (1200.0 * (frequency_hz / frequency_from_note_number(note, a4_hz)).log2()).floor() as i32
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct NoteName {
    letter: &'static str,
    octave: i32,
}

impl NoteName {
    pub fn from_midi(note: i32) -> Self {
        NoteName {
            letter: NOTE_NAMES[note.rem_euclid(NOTES_PER_OCTAVE) as usize],
            octave: note.div_euclid(NOTES_PER_OCTAVE) - 1,
        }
    }

    pub fn letter(&self) -> &'static str {self.letter}

    pub fn octave(&self) -> i32 {self.octave}
}

impl Display for NoteName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.letter, self.octave)
    }
}
