use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use read_input::prelude::*;
use serde::Deserialize;
use crate::intervals::{A4_HZ, MIDDLE_C_HZ};
use crate::patterns::Difficulty;
use crate::pitch::DEFAULT_RMS_FLOOR;
use crate::playback::{PlaybackSettings, Timbre, DEFAULT_NOTE_DURATION_MS};
use crate::practice_log::DEFAULT_HISTORY_LIMIT;
use crate::scales::{DEFAULT_SCALE_KEY, SCALE_TABLE};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const NOTE_DURATION_RANGE_MS: RangeInclusive<u64> = 200..=2000;
pub const GAP_RANGE_MS: RangeInclusive<u64> = 0..=1000;
pub const SPEED_RANGE: RangeInclusive<f64> = 0.5..=2.0;
pub const LOOP_RANGE: RangeInclusive<usize> = 1..=10;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    tuning: TuningConfig,
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    practice: PracticeConfig,
}

#[derive(Deserialize, Default)]
struct TuningConfig {
    base_frequency_hz: Option<f64>,
    a4_hz: Option<f64>,
    rms_floor: Option<f64>,
}

#[derive(Deserialize, Default)]
struct PlaybackConfig {
    note_duration_ms: Option<u64>,
    gap_ms: Option<u64>,
    speed: Option<f64>,
    loop_count: Option<usize>,
    timbre: Option<Timbre>,
}

#[derive(Deserialize, Default)]
struct PracticeConfig {
    scale: Option<String>,
    difficulty: Option<Difficulty>,
    history_limit: Option<usize>,
    database: Option<PathBuf>,
}

pub struct TrainerConfig {
    tuning: TuningConfig,
    playback: PlaybackConfig,
    practice: PracticeConfig,
}

impl TrainerConfig {
    /// Embedded defaults overlaid with the user's file, if it parses.
    pub fn load() -> anyhow::Result<Self> {
        let user = match user_config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => Some(contents),
                Err(e) => {
                    log::warn!(target: "config", "could not read config {}: {}", path.display(), e);
                    None
                }
            },
            _ => None,
        };
        Self::from_sources(DEFAULT_CONFIG, user.as_deref())
    }

    pub fn from_sources(defaults: &str, user: Option<&str>) -> anyhow::Result<Self> {
        let mut base: ConfigFile = toml::from_str(defaults)?;
        if let Some(contents) = user {
            match toml::from_str::<ConfigFile>(contents) {
                Ok(user) => merge(&mut base, user),
                Err(e) => log::warn!(target: "config", "ignoring malformed user config: {}", e),
            }
        }
        Ok(TrainerConfig {tuning: base.tuning, playback: base.playback, practice: base.practice})
    }

    pub fn base_frequency_hz(&self) -> f64 {
        positive_or(self.tuning.base_frequency_hz, MIDDLE_C_HZ)
    }

    pub fn a4_hz(&self) -> f64 {
        positive_or(self.tuning.a4_hz, A4_HZ)
    }

    pub fn rms_floor(&self) -> f64 {
        self.tuning.rms_floor.filter(|f| f.is_finite() && *f >= 0.0).unwrap_or(DEFAULT_RMS_FLOOR)
    }

    pub fn note_duration_ms(&self) -> u64 {
        clamp_into(self.playback.note_duration_ms.unwrap_or(DEFAULT_NOTE_DURATION_MS), &NOTE_DURATION_RANGE_MS)
    }

    pub fn gap_ms(&self) -> u64 {
        clamp_into(self.playback.gap_ms.unwrap_or(0), &GAP_RANGE_MS)
    }

    pub fn speed(&self) -> f64 {
        let speed = self.playback.speed.filter(|s| s.is_finite()).unwrap_or(1.0);
        clamp_into(speed, &SPEED_RANGE)
    }

    pub fn loop_count(&self) -> usize {
        clamp_into(self.playback.loop_count.unwrap_or(1), &LOOP_RANGE)
    }

    pub fn timbre(&self) -> Timbre {
        self.playback.timbre.unwrap_or_default()
    }

    /// Unknown scale keys fall back to the default scale.
    pub fn scale_key(&self) -> &str {
        match self.practice.scale.as_deref() {
            Some(key) if SCALE_TABLE.get(key).is_some() => key,
            Some(key) => {
                log::warn!(target: "config", "unknown scale {key}; using {DEFAULT_SCALE_KEY}");
                DEFAULT_SCALE_KEY
            }
            None => DEFAULT_SCALE_KEY,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.practice.difficulty.unwrap_or(Difficulty::Easy)
    }

    pub fn history_limit(&self) -> usize {
        self.practice.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1)
    }

    pub fn database_path(&self) -> PathBuf {
        self.practice.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("eartrainer").join("practice.db"))
                .unwrap_or_else(|| PathBuf::from("practice.db"))
        })
    }

    pub fn sliders(&self) -> PlaybackSliders {
        PlaybackSliders {
            note_duration_ms: SliderValue::from_range(self.note_duration_ms(), NOTE_DURATION_RANGE_MS),
            gap_ms: SliderValue::from_range(self.gap_ms(), GAP_RANGE_MS),
            speed: SliderValue::from_range(self.speed(), SPEED_RANGE),
            loop_count: SliderValue::from_range(self.loop_count(), LOOP_RANGE),
        }
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        self.sliders().settings(self.timbre())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("eartrainer").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    let (t, p, r) = (&mut base.tuning, &mut base.playback, &mut base.practice);
    if user.tuning.base_frequency_hz.is_some() {
        t.base_frequency_hz = user.tuning.base_frequency_hz;
    }
    if user.tuning.a4_hz.is_some() {
        t.a4_hz = user.tuning.a4_hz;
    }
    if user.tuning.rms_floor.is_some() {
        t.rms_floor = user.tuning.rms_floor;
    }
    if user.playback.note_duration_ms.is_some() {
        p.note_duration_ms = user.playback.note_duration_ms;
    }
    if user.playback.gap_ms.is_some() {
        p.gap_ms = user.playback.gap_ms;
    }
    if user.playback.speed.is_some() {
        p.speed = user.playback.speed;
    }
    if user.playback.loop_count.is_some() {
        p.loop_count = user.playback.loop_count;
    }
    if user.playback.timbre.is_some() {
        p.timbre = user.playback.timbre;
    }
    if user.practice.scale.is_some() {
        r.scale = user.practice.scale;
    }
    if user.practice.difficulty.is_some() {
        r.difficulty = user.practice.difficulty;
    }
    if user.practice.history_limit.is_some() {
        r.history_limit = user.practice.history_limit;
    }
    if user.practice.database.is_some() {
        r.database = user.practice.database;
    }
}

fn positive_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(fallback)
}

fn clamp_into<T: PartialOrd + Copy>(value: T, range: &RangeInclusive<T>) -> T {
    if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        value
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SliderValue<T: Copy + Clone> {
    current: T,
    lo: T,
    hi: T
}

impl <T: Copy + Clone + std::str::FromStr + PartialOrd + 'static> SliderValue<T> {
    pub fn new(current: T, min: T, max: T) -> Self {
        SliderValue {current: clamp_into(current, &(min..=max)), lo: min, hi: max}
    }

    pub fn from_range(current: T, range: RangeInclusive<T>) -> Self {
        Self::new(current, *range.start(), *range.end())
    }

    pub fn make_range(&self) -> RangeInclusive<T> {
        self.lo..=self.hi
    }

    pub fn set_current(&mut self, new_current: T) {
        self.current = clamp_into(new_current, &self.make_range());
    }

    pub fn get_current(&self) -> T {
        self.current
    }

    pub fn console_pick(&mut self, prompt: &str) {
        self.current = input().msg(prompt).inside(self.make_range()).get();
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaybackSliders {
    pub note_duration_ms: SliderValue<u64>,
    pub gap_ms: SliderValue<u64>,
    pub speed: SliderValue<f64>,
    pub loop_count: SliderValue<usize>,
}

impl PlaybackSliders {
    pub fn console_pick_all(&mut self) {
        self.note_duration_ms.console_pick("Note duration (200-2000 ms): ");
        self.gap_ms.console_pick("Gap between notes (0-1000 ms): ");
        self.speed.console_pick("Speed (0.5-2.0): ");
        self.loop_count.console_pick("Loops (1-10): ");
    }

    pub fn settings(&self, timbre: Timbre) -> PlaybackSettings {
        PlaybackSettings::new(
            Duration::from_millis(self.note_duration_ms.get_current()),
            Duration::from_millis(self.gap_ms.get_current()),
            self.speed.get_current(),
            self.loop_count.get_current(),
            timbre,
        )
    }
}

pub fn user_pick_element<T: Clone, S: Fn(&T) -> String>(choices: impl Iterator<Item=T>, show: S) -> T {
    let choices = choices.collect::<Vec<_>>();
    for (i, item) in choices.iter().enumerate() {
        println!("{}) {}", i+1, show(item));
    }
    let choice: usize = input()
        .msg("Enter choice: ")
        .inside(1..=choices.len())
        .get();
    choices[choice - 1].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = TrainerConfig::from_sources(DEFAULT_CONFIG, None).unwrap();
        assert_eq!(config.base_frequency_hz(), MIDDLE_C_HZ);
        assert_eq!(config.a4_hz(), A4_HZ);
        assert_eq!(config.rms_floor(), DEFAULT_RMS_FLOOR);
        assert_eq!(config.playback_settings(), PlaybackSettings::default());
        assert_eq!(config.scale_key(), "major");
        assert_eq!(config.difficulty(), Difficulty::Easy);
        assert_eq!(config.history_limit(), DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn test_user_overrides_merge() {
        let user = "[playback]\nspeed = 1.5\ntimbre = \"bansuri\"\n[practice]\nscale = \"yaman\"\ndifficulty = \"hard\"\n";
        let config = TrainerConfig::from_sources(DEFAULT_CONFIG, Some(user)).unwrap();
        assert_eq!(config.speed(), 1.5);
        assert_eq!(config.timbre(), Timbre::Bansuri);
        assert_eq!(config.scale_key(), "yaman");
        assert_eq!(config.difficulty(), Difficulty::Hard);
        assert_eq!(config.note_duration_ms(), 500);
        assert_eq!(config.base_frequency_hz(), MIDDLE_C_HZ);
    }

    #[test]
    fn test_malformed_user_file_is_ignored() {
        let config = TrainerConfig::from_sources(DEFAULT_CONFIG, Some("[playback\nspeed = ")).unwrap();
        assert_eq!(config.speed(), 1.0);
        let config = TrainerConfig::from_sources(DEFAULT_CONFIG, Some("[playback]\ntimbre = \"kazoo\"")).unwrap();
        assert_eq!(config.timbre(), Timbre::Harmonium);
    }

    #[test]
    fn test_values_clamp_into_slider_ranges() {
        let user = "[tuning]\na4_hz = -3.0\n[playback]\nnote_duration_ms = 50\ngap_ms = 5000\nspeed = 9.0\nloop_count = 0\n[practice]\nscale = \"nope\"\n";
        let config = TrainerConfig::from_sources(DEFAULT_CONFIG, Some(user)).unwrap();
        assert_eq!(config.note_duration_ms(), 200);
        assert_eq!(config.gap_ms(), 1000);
        assert_eq!(config.speed(), 2.0);
        assert_eq!(config.loop_count(), 1);
        assert_eq!(config.a4_hz(), A4_HZ);
        assert_eq!(config.scale_key(), DEFAULT_SCALE_KEY);
        let delay = config.playback_settings().step_delay().as_secs_f64();
        assert!((delay - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_slider_clamps() {
        let mut slider = SliderValue::new(30, 1, 10);
        assert_eq!(slider.get_current(), 10);
        slider.set_current(0);
        assert_eq!(slider.get_current(), 1);
        assert_eq!(slider.make_range(), 1..=10);
    }
}
