use anyhow::bail;
use enum_iterator::Sequence;
use rand::prelude::SliceRandom;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use crate::intervals::{Direction, Interval, IntervalSpec, MAX_INTERVAL_SEMITONES, MIDDLE_C_HZ};
use crate::patterns::{Difficulty, PatternMode, MAX_PATTERN_LENGTH};
use crate::scales::ScaleDegree;

const U: Direction = Direction::Up;
const D: Direction = Direction::Down;

const EASY_PROGRESSIONS: [&[(u8, Direction)]; 5] = [
    &[(2, U), (2, D)],
    &[(4, U), (4, D)],
    &[(2, U), (2, U), (4, D)],
    &[(7, U), (7, D)],
    &[(12, U), (12, D)],
];

const MEDIUM_PROGRESSIONS: [&[(u8, Direction)]; 5] = [
    &[(3, U), (4, U), (7, D)],
    &[(4, U), (3, U), (5, U), (12, D)],
    &[(5, U), (5, D), (7, U), (7, D)],
    &[(2, U), (1, U), (3, D)],
    &[(7, U), (2, D), (5, D)],
];

const HARD_PROGRESSIONS: [&[(u8, Direction)]; 6] = [
    &[(6, U), (6, D)],
    &[(8, U), (9, D), (10, U)],
    &[(11, U), (1, D), (12, D)],
    &[(1, U), (6, U), (11, D)],
    &[(10, U), (3, D), (8, D), (9, U)],
    &[(5, U), (6, U), (11, D), (1, D)],
];

const EASY_SINGLES: [u8; 4] = [2, 4, 7, 12];
const MEDIUM_SINGLES: [u8; 7] = [1, 2, 3, 4, 5, 7, 12];
const HARD_SINGLES: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalMode {
    Progression,
    Single,
}

impl IntervalMode {
    pub fn name(&self) -> &'static str {
        match self {
            IntervalMode::Progression => "Progression",
            IntervalMode::Single => "Single interval",
        }
    }
}

pub fn progressions(difficulty: Difficulty) -> &'static [&'static [(u8, Direction)]] {
    match difficulty {
        Difficulty::Easy => &EASY_PROGRESSIONS,
        Difficulty::Medium => &MEDIUM_PROGRESSIONS,
        Difficulty::Hard => &HARD_PROGRESSIONS,
    }
}

pub fn single_choices(difficulty: Difficulty) -> &'static [u8] {
    match difficulty {
        Difficulty::Easy => &EASY_SINGLES,
        Difficulty::Medium => &MEDIUM_SINGLES,
        Difficulty::Hard => &HARD_SINGLES,
    }
}

pub fn max_random_semitones(difficulty: Difficulty) -> u8 {
    match difficulty {
        Difficulty::Easy => 2,
        Difficulty::Medium => 5,
        Difficulty::Hard => MAX_INTERVAL_SEMITONES,
    }
}

#[derive(Copy, Clone, Debug)]
pub struct IntervalPatternGenerator {
    base_frequency_hz: f64,
}

impl Default for IntervalPatternGenerator {
    fn default() -> Self {
        IntervalPatternGenerator {base_frequency_hz: MIDDLE_C_HZ}
    }
}

impl IntervalPatternGenerator {
    pub fn new(base_frequency_hz: f64) -> anyhow::Result<Self> {
        if !base_frequency_hz.is_finite() || base_frequency_hz <= 0.0 {
            bail!("Base frequency must be positive, found {base_frequency_hz}");
        }
        Ok(IntervalPatternGenerator {base_frequency_hz})
    }

    pub fn base_frequency_hz(&self) -> f64 {self.base_frequency_hz}

    pub fn generate(&self, mode: PatternMode, interval_mode: IntervalMode, difficulty: Difficulty, length: usize, scale_len: usize) -> Vec<Interval> {
        self.generate_with(&mut thread_rng(), mode, interval_mode, difficulty, length, scale_len)
    }

    /// `length` is held to `[1, MAX_PATTERN_LENGTH]`. Random mode always
    /// produces `length` intervals; pedagogical single mode produces one.
    pub fn generate_with<R: Rng>(&self, rng: &mut R, mode: PatternMode, interval_mode: IntervalMode, difficulty: Difficulty, length: usize, scale_len: usize) -> Vec<Interval> {
        let length = length.clamp(1, MAX_PATTERN_LENGTH);
        let specs = match (mode, interval_mode) {
            (PatternMode::Pedagogical, IntervalMode::Progression) => progression_specs(rng, difficulty, length),
            (PatternMode::Pedagogical, IntervalMode::Single) => vec![single_spec(rng, difficulty)],
            (PatternMode::Random, _) => (0..length).map(|_| random_spec(rng, difficulty)).collect(),
        };
        let intervals: Vec<Interval> = specs
            .iter()
            .map(|spec| self.build_interval_from_template(rng, *spec, scale_len))
            .collect();
        log::debug!(
            "{} {} {difficulty}: {}",
            mode.name(),
            interval_mode.name(),
            intervals.iter().map(|i| i.notation_short()).collect::<Vec<_>>().join(" ")
        );
        intervals
    }

    /// Picks a start degree that keeps the labelled end degree inside the
    /// scale when the interval is small enough, then resolves the frequencies.
    pub fn build_interval_from_template<R: Rng>(&self, rng: &mut R, spec: IntervalSpec, scale_len: usize) -> Interval {
        let (lo, hi) = start_degree_range(spec, scale_len);
        let start = rng.gen_range(lo..=hi);
        Interval::resolve(spec, start, self.base_frequency_hz)
    }
}

pub fn start_degree_range(spec: IntervalSpec, scale_len: usize) -> (ScaleDegree, ScaleDegree) {
    let top = scale_len.clamp(1, ScaleDegree::MAX as usize) as i32;
    let span = spec.degree_span();
    let (lo, hi) = match spec.direction() {
        Direction::Up => (1, top - span),
        Direction::Down => (1 + span, top),
    };
    if lo <= hi {
        (lo as ScaleDegree, hi as ScaleDegree)
    } else {
        match spec.direction() {
            Direction::Up => (1, 1),
            Direction::Down => (top as ScaleDegree, top as ScaleDegree),
        }
    }
}

fn progression_specs<R: Rng>(rng: &mut R, difficulty: Difficulty, length: usize) -> Vec<IntervalSpec> {
    let template = progressions(difficulty).choose(rng).copied().unwrap_or(&[(2, Direction::Up)]);
    template
        .iter()
        .cycle()
        .take(length)
        .map(|(semitones, direction)| IntervalSpec::new(*semitones, *direction))
        .collect()
}

fn single_spec<R: Rng>(rng: &mut R, difficulty: Difficulty) -> IntervalSpec {
    let semitones = single_choices(difficulty).choose(rng).copied().unwrap_or(1);
    IntervalSpec::new(semitones, random_direction(rng))
}

fn random_spec<R: Rng>(rng: &mut R, difficulty: Difficulty) -> IntervalSpec {
    let semitones = rng.gen_range(1..=max_random_semitones(difficulty));
    IntervalSpec::new(semitones, random_direction(rng))
}

fn random_direction<R: Rng>(rng: &mut R) -> Direction {
    if rng.gen_bool(0.5) {Direction::Up} else {Direction::Down}
}
