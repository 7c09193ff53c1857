use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;
use anyhow::bail;
use enum_iterator::Sequence;
use rand::prelude::SliceRandom;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use crate::intervals::melodic_step_label;
use crate::scales::ScaleDegree;

pub const MAX_PATTERN_LENGTH: usize = 12;
const RETRY_LIMIT: usize = 50;
const START_DEGREES: [ScaleDegree; 5] = [1, 1, 1, 3, 5];
const LEAP_SIZE: i32 = 4;
const LEAP_RECOVERY_WIDE_CHANCE: f64 = 0.2;
const RESOLVE_TO_TONIC_CHANCE: f64 = 0.7;
const PREFERRED_SIZE_CHANCE: f64 = 0.7;
const REVERSE_DIRECTION_CHANCE: f64 = 0.4;

const EASY_TEMPLATES: [&[ScaleDegree]; 8] = [
    &[1, 2, 3],
    &[1, 2, 3, 2, 1],
    &[3, 2, 1],
    &[1, 2, 1],
    &[1, 3, 1],
    &[1, 2, 3, 4],
    &[5, 4, 3, 2, 1],
    &[1, 2, 3, 4, 3, 2, 1],
];

const MEDIUM_TEMPLATES: [&[ScaleDegree]; 8] = [
    &[1, 3, 5, 3, 1],
    &[1, 2, 3, 4, 5],
    &[1, 3, 2, 4, 3],
    &[1, 4, 3, 2, 1],
    &[5, 3, 1],
    &[1, 2, 4, 3, 5],
    &[1, 5, 4, 3, 2, 1],
    &[1, 2, 3, 5, 4, 3, 2, 1],
];

const HARD_TEMPLATES: [&[ScaleDegree]; 9] = [
    &[1, 5, 1],
    &[1, 6, 1],
    &[1, 3, 5, 7],
    &[1, 4, 7, 5, 3, 1],
    &[1, 5, 2, 6, 3, 7],
    &[1, 6, 4, 2, 7, 5, 3, 1],
    &[1, 3, 5, 7, 5, 3, 1],
    &[1, 4, 2, 5, 3, 6, 4, 7],
    &[5, 1, 3, 7, 2, 6, 4, 1],
];

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn templates(&self) -> &'static [&'static [ScaleDegree]] {
        match self {
            Difficulty::Easy => &EASY_TEMPLATES,
            Difficulty::Medium => &MEDIUM_TEMPLATES,
            Difficulty::Hard => &HARD_TEMPLATES,
        }
    }

    /// Largest melodic step, in scale degrees, and the size preferred most of the time.
    pub fn step_limits(&self) -> (i32, i32) {
        match self {
            Difficulty::Easy => (2, 1),
            Difficulty::Medium => (4, 2),
            Difficulty::Hard => (6, 3),
        }
    }

    /// Shortest to longest template of this difficulty.
    pub fn length_range(&self) -> RangeInclusive<usize> {
        let lengths = self.templates().iter().map(|t| t.len());
        let lo = lengths.clone().min().unwrap_or(1);
        let hi = lengths.max().unwrap_or(lo);
        lo..=hi.min(MAX_PATTERN_LENGTH)
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Sequence, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    Pedagogical,
    Random,
}

impl PatternMode {
    pub fn name(&self) -> &'static str {
        match self {
            PatternMode::Pedagogical => "Pedagogical",
            PatternMode::Random => "Random",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    degrees: Vec<ScaleDegree>,
}

impl Pattern {
    /// A user-entered pattern. Every note must lie in `[1, scale_len]`.
    pub fn custom(degrees: &[ScaleDegree], scale_len: usize) -> anyhow::Result<Self> {
        if degrees.is_empty() {
            bail!("Please enter at least one note");
        }
        if degrees.len() > MAX_PATTERN_LENGTH {
            bail!("Patterns hold at most {MAX_PATTERN_LENGTH} notes, found {}", degrees.len());
        }
        if let Some(bad) = degrees.iter().find(|d| **d == 0 || **d as usize > scale_len) {
            bail!("All notes must be between 1 and {scale_len} (found {bad})");
        }
        Ok(Pattern {degrees: degrees.to_vec()})
    }

    /// Reads one degree per digit, ignoring anything else, so "1-3-5" and "135" agree.
    pub fn parse(text: &str, scale_len: usize) -> anyhow::Result<Self> {
        let degrees: Vec<ScaleDegree> = text
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| d as ScaleDegree)
            .collect();
        Self::custom(&degrees, scale_len)
    }

    pub fn degrees(&self) -> &[ScaleDegree] {&self.degrees}

    pub fn len(&self) -> usize {self.degrees.len()}

    pub fn get(&self, i: usize) -> Option<ScaleDegree> {self.degrees.get(i).copied()}

    pub fn iter(&self) -> impl Iterator<Item = ScaleDegree> + '_ {self.degrees.iter().copied()}

    pub fn contains(&self, degree: ScaleDegree) -> bool {self.degrees.contains(&degree)}

    /// Label for the move into note `i`, or `None` for the first note.
    pub fn step_label(&self, i: usize) -> Option<String> {
        if i == 0 {
            return None;
        }
        Some(melodic_step_label(self.get(i - 1)?, self.get(i)?))
    }

    fn from_generated(degrees: Vec<ScaleDegree>) -> Self {
        if degrees.is_empty() {Pattern {degrees: vec![1]}} else {Pattern {degrees}}
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text: Vec<String> = self.degrees.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", text.join(" "))
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct PatternGenerator;

impl PatternGenerator {
    pub fn generate(&self, mode: PatternMode, difficulty: Difficulty, scale_len: usize) -> Pattern {
        self.generate_with(&mut thread_rng(), mode, difficulty, scale_len)
    }

    pub fn generate_with<R: Rng>(&self, rng: &mut R, mode: PatternMode, difficulty: Difficulty, scale_len: usize) -> Pattern {
        let pattern = match mode {
            PatternMode::Pedagogical => Pattern::from_generated(pedagogical(rng, difficulty, scale_len)),
            PatternMode::Random => Pattern::from_generated(random_walk(rng, difficulty, scale_len)),
        };
        log::debug!("{} {difficulty} pattern for {scale_len} degrees: {pattern}", mode.name());
        pattern
    }
}

/// A template of the difficulty with out-of-range degrees dropped. Dropping
/// can bring equal degrees together, so repeats are merged.
fn pedagogical<R: Rng>(rng: &mut R, difficulty: Difficulty, scale_len: usize) -> Vec<ScaleDegree> {
    match difficulty.templates().choose(rng) {
        Some(template) => filtered_template(template, scale_len),
        None => vec![],
    }
}

fn filtered_template(template: &[ScaleDegree], scale_len: usize) -> Vec<ScaleDegree> {
    let mut degrees: Vec<ScaleDegree> = template.iter().copied().filter(|d| *d as usize <= scale_len).collect();
    degrees.dedup();
    degrees
}

fn random_walk<R: Rng>(rng: &mut R, difficulty: Difficulty, scale_len: usize) -> Vec<ScaleDegree> {
    if scale_len < 2 {
        return vec![1];
    }
    let top = scale_len.min(ScaleDegree::MAX as usize) as i32;
    let length = rng.gen_range(difficulty.length_range());
    let start = START_DEGREES.choose(rng).map_or(1, |d| *d as i32).min(top);
    let mut degrees = vec![start];
    let mut previous_step = 0;
    while degrees.len() < length {
        let current = degrees[degrees.len() - 1];
        let is_final = length > 2 && degrees.len() + 1 == length;
        let next = (0..RETRY_LIMIT)
            .map(|_| (current + choose_step(rng, difficulty, current, previous_step, is_final)).clamp(1, top))
            .find(|candidate| *candidate != current)
            .unwrap_or_else(|| forced_step(current));
        previous_step = next - current;
        degrees.push(next);
    }
    degrees.iter().map(|d| *d as ScaleDegree).collect()
}

fn choose_step<R: Rng>(rng: &mut R, difficulty: Difficulty, current: i32, previous_step: i32, is_final: bool) -> i32 {
    if previous_step.abs() >= LEAP_SIZE {
        let size = if rng.gen_bool(LEAP_RECOVERY_WIDE_CHANCE) {2} else {1};
        -previous_step.signum() * size
    } else if is_final {
        if rng.gen_bool(RESOLVE_TO_TONIC_CHANCE) {1 - current} else {-(current - 1).signum()}
    } else {
        let (max, preferred) = difficulty.step_limits();
        let limit = if rng.gen_bool(PREFERRED_SIZE_CHANCE) {preferred} else {max};
        let size = rng.gen_range(1..=limit);
        let direction = if previous_step != 0 && rng.gen_bool(REVERSE_DIRECTION_CHANCE) {
            -previous_step.signum()
        } else if rng.gen_bool(0.5) {
            1
        } else {
            -1
        };
        direction * size
    }
}

/// Stepwise move toward the tonic, or up from the tonic itself.
fn forced_step(current: i32) -> i32 {
    if current > 1 {current - 1} else {current + 1}
}

#[cfg(test)]
mod tests {
    use super::*;
    use enum_iterator::all;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NUM_RANDOM_TESTS: usize = 200;

    fn check_pattern(pattern: &Pattern, scale_len: usize) {
        assert!(pattern.len() >= 1 && pattern.len() <= MAX_PATTERN_LENGTH);
        for d in pattern.iter() {
            assert!(d >= 1 && d as usize <= scale_len, "{pattern} out of range for {scale_len}");
        }
        if scale_len >= 2 {
            for w in pattern.degrees().windows(2) {
                assert_ne!(w[0], w[1], "{pattern}");
            }
        }
    }

    #[test]
    fn test_length_ranges() {
        assert_eq!(Difficulty::Easy.length_range(), 3..=7);
        assert_eq!(Difficulty::Medium.length_range(), 3..=8);
        assert_eq!(Difficulty::Hard.length_range(), 3..=8);
        assert_eq!(Difficulty::Easy.templates().len(), 8);
        assert_eq!(Difficulty::Medium.templates().len(), 8);
        assert_eq!(Difficulty::Hard.templates().len(), 9);
    }

    #[test]
    fn test_random_invariants() {
        let mut rng = StdRng::seed_from_u64(7);
        let generator = PatternGenerator;
        for difficulty in all::<Difficulty>() {
            for scale_len in [2, 5, 7] {
                for _ in 0..NUM_RANDOM_TESTS {
                    let pattern = generator.generate_with(&mut rng, PatternMode::Random, difficulty, scale_len);
                    check_pattern(&pattern, scale_len);
                    assert!(difficulty.length_range().contains(&pattern.len()));
                }
            }
        }
    }

    #[test]
    fn test_pedagogical_easy() {
        let mut rng = StdRng::seed_from_u64(11);
        let generator = PatternGenerator;
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..NUM_RANDOM_TESTS {
            let pattern = generator.generate_with(&mut rng, PatternMode::Pedagogical, Difficulty::Easy, 7);
            assert!(EASY_TEMPLATES.iter().any(|t| *t == pattern.degrees()), "{pattern}");
            seen.insert(pattern.degrees().to_vec());
        }
        assert!(seen.contains(&vec![1, 2, 3, 2, 1]));
        assert_eq!(seen.len(), EASY_TEMPLATES.len());
    }

    #[test]
    fn test_pedagogical_filters() {
        let mut rng = StdRng::seed_from_u64(3);
        let generator = PatternGenerator;
        for _ in 0..NUM_RANDOM_TESTS {
            let pattern = generator.generate_with(&mut rng, PatternMode::Pedagogical, Difficulty::Hard, 5);
            check_pattern(&pattern, 5);
            let template = HARD_TEMPLATES
                .iter()
                .map(|t| filtered_template(t, 5))
                .find(|t| t.as_slice() == pattern.degrees());
            assert!(template.is_some(), "{pattern}");
        }
        for difficulty in all::<Difficulty>() {
            for scale_len in 2..=7 {
                for _ in 0..NUM_RANDOM_TESTS {
                    let pattern = generator.generate_with(&mut rng, PatternMode::Pedagogical, difficulty, scale_len);
                    check_pattern(&pattern, scale_len);
                }
            }
        }
        assert_eq!(filtered_template(&[1, 3, 5, 6, 5, 3, 1], 5), vec![1, 3, 5, 3, 1]);
        assert_eq!(filtered_template(&[1, 8, 1], 7), vec![1]);
        let single = generator.generate_with(&mut rng, PatternMode::Pedagogical, Difficulty::Medium, 0);
        assert_eq!(single.degrees(), &[1]);
    }

    #[test]
    fn test_leap_recovery() {
        let mut rng = StdRng::seed_from_u64(42);
        let generator = PatternGenerator;
        let mut leaps = 0;
        for _ in 0..NUM_RANDOM_TESTS * 5 {
            let pattern = generator.generate_with(&mut rng, PatternMode::Random, Difficulty::Hard, 7);
            let steps: Vec<i32> = pattern.degrees().windows(2).map(|w| w[1] as i32 - w[0] as i32).collect();
            for pair in steps.windows(2) {
                if pair[0].abs() >= LEAP_SIZE {
                    leaps += 1;
                    assert!(pair[1].abs() <= 2, "{pattern}");
                    assert_eq!(pair[1].signum(), -pair[0].signum(), "{pattern}");
                }
            }
        }
        assert!(leaps > 0);
    }

    #[test]
    fn test_final_note_heads_home() {
        let mut rng = StdRng::seed_from_u64(99);
        let generator = PatternGenerator;
        let (mut counted, mut resolved) = (0, 0);
        for _ in 0..NUM_RANDOM_TESTS * 10 {
            let pattern = generator.generate_with(&mut rng, PatternMode::Random, Difficulty::Medium, 7);
            let d = pattern.degrees();
            let n = d.len();
            let (before, previous, last) = (d[n - 3] as i32, d[n - 2] as i32, d[n - 1] as i32);
            if (previous - before).abs() >= LEAP_SIZE || previous == 1 {
                continue;
            }
            assert!(last == 1 || last == previous - 1, "{pattern}");
            if previous > 2 {
                counted += 1;
                if last == 1 {
                    resolved += 1;
                }
            }
        }
        assert!(counted > 200);
        let rate = resolved as f64 / counted as f64;
        assert!(rate > 0.6 && rate < 0.8, "resolved {resolved} of {counted}");
    }

    #[test]
    fn test_tiny_scales() {
        let mut rng = StdRng::seed_from_u64(1);
        let generator = PatternGenerator;
        assert_eq!(generator.generate_with(&mut rng, PatternMode::Random, Difficulty::Hard, 1).degrees(), &[1]);
        for _ in 0..NUM_RANDOM_TESTS {
            let pattern = generator.generate_with(&mut rng, PatternMode::Random, Difficulty::Easy, 2);
            check_pattern(&pattern, 2);
        }
    }

    #[test]
    fn test_forced_step() {
        assert_eq!(forced_step(1), 2);
        assert_eq!(forced_step(4), 3);
    }

    #[test]
    fn test_custom() {
        let pattern = Pattern::custom(&[1, 3, 5, 3, 1], 7).unwrap();
        assert_eq!(pattern.len(), 5);
        assert_eq!(format!("{pattern}"), "1 3 5 3 1");
        assert_eq!(pattern.step_label(1).unwrap(), "↑ Third");
        assert_eq!(pattern.step_label(0), None);
        assert!(Pattern::custom(&[], 7).is_err());
        assert!(Pattern::custom(&[1, 6], 5).is_err());
        assert!(Pattern::custom(&[0], 5).is_err());
        assert!(Pattern::custom(&[1; 13], 7).is_err());
        assert_eq!(Pattern::parse("1-3 5", 7).unwrap().degrees(), &[1, 3, 5]);
        assert!(Pattern::parse("abc", 7).is_err());
    }
}
