use std::f64::consts::TAU;
use crate::intervals::{cents_off_from_pitch, note_from_pitch, NoteName, A4_HZ};
use crate::scales::{ScaleDegree, SolfegeSystem, DEFAULT_SCALE_KEY, SCALE_TABLE};

pub const DEFAULT_RMS_FLOOR: f64 = 0.01;
pub const DEFAULT_BUFFER_SIZE: usize = 2048;
const EDGE_THRESHOLD: f32 = 0.2;
const MIN_SLICE: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PitchEstimate {
    frequency: Option<f64>,
    confidence_rms: f64,
}

impl PitchEstimate {
    pub fn no_signal(confidence_rms: f64) -> Self {
        PitchEstimate {frequency: None, confidence_rms}
    }

    /// `None` means no reliable period was found.
    pub fn frequency(&self) -> Option<f64> {self.frequency}

    pub fn confidence_rms(&self) -> f64 {self.confidence_rms}

    pub fn has_signal(&self) -> bool {self.frequency.is_some()}
}

/// Autocorrelation pitch estimator (ACF2+).
#[derive(Copy, Clone, Debug)]
pub struct PitchDetector {
    rms_floor: f64,
}

impl Default for PitchDetector {
    fn default() -> Self {
        PitchDetector {rms_floor: DEFAULT_RMS_FLOOR}
    }
}

impl PitchDetector {
    pub fn new(rms_floor: f64) -> Self {
        PitchDetector {rms_floor: rms_floor.max(0.0)}
    }

    pub fn rms_floor(&self) -> f64 {self.rms_floor}

    pub fn estimate(&self, buffer: &[f32], sample_rate_hz: f64) -> PitchEstimate {
        let rms = rms(buffer);
        if buffer.is_empty() || rms < self.rms_floor {
            return PitchEstimate::no_signal(rms);
        }
        let trimmed = trim_edges(buffer);
        if trimmed.len() < MIN_SLICE {
            return PitchEstimate::no_signal(rms);
        }
        let frequency = refined_period(&autocorrelate(trimmed))
            .map(|period| sample_rate_hz / period)
            .filter(|f| f.is_finite() && *f > 0.0);
        PitchEstimate {frequency, confidence_rms: rms}
    }

    pub fn read(&self, buffer: &[f32], sample_rate_hz: f64) -> Option<TunerReading> {
        self.read_with_reference(buffer, sample_rate_hz, A4_HZ)
    }

    pub fn read_with_reference(&self, buffer: &[f32], sample_rate_hz: f64, a4_hz: f64) -> Option<TunerReading> {
        self.estimate(buffer, sample_rate_hz)
            .frequency()
            .map(|f| TunerReading::from_frequency(f, a4_hz))
    }
}

fn rms(buffer: &[f32]) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum: f64 = buffer.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / buffer.len() as f64).sqrt()
}

/// Drops the loud edges: scans at most half the buffer from each side for
/// the first quiet sample. The end index itself is excluded.
fn trim_edges(buffer: &[f32]) -> &[f32] {
    let size = buffer.len();
    let half = size / 2;
    let start = (0..half).find(|i| buffer[*i].abs() < EDGE_THRESHOLD).unwrap_or(0);
    let end = (1..half)
        .map(|i| size - i)
        .find(|i| buffer[*i].abs() < EDGE_THRESHOLD)
        .unwrap_or(size - 1);
    if start < end {&buffer[start..end]} else {&buffer[0..0]}
}

fn autocorrelate(buffer: &[f32]) -> Vec<f64> {
    let size = buffer.len();
    (0..size)
        .map(|lag| {
            buffer[..size - lag]
                .iter()
                .zip(buffer[lag..].iter())
                .map(|(a, b)| *a as f64 * *b as f64)
                .sum::<f64>()
        })
        .collect()
}

/// Period in samples: skips the zero-lag descent, takes the strongest lag
/// after it and refines it with a parabola through its neighbors.
fn refined_period(correlation: &[f64]) -> Option<f64> {
    let mut d = 0;
    while d + 1 < correlation.len() && correlation[d] > correlation[d + 1] {
        d += 1;
    }
    if d + 1 >= correlation.len() {
        return None;
    }
    let mut peak = d;
    for i in d..correlation.len() {
        if correlation[i] > correlation[peak] {
            peak = i;
        }
    }
    if peak == 0 || peak + 1 >= correlation.len() {
        return None;
    }
    let (x1, x2, x3) = (correlation[peak - 1], correlation[peak], correlation[peak + 1]);
    let a = (x1 + x3 - 2.0 * x2) / 2.0;
    let b = (x3 - x1) / 2.0;
    let period = if a != 0.0 {peak as f64 - b / (2.0 * a)} else {peak as f64};
    if period.is_finite() && period > 0.0 {Some(period)} else {None}
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TunerReading {
    frequency_hz: f64,
    midi_note: i32,
    name: NoteName,
    cents: i32,
}

impl TunerReading {
    pub fn from_frequency(frequency_hz: f64, a4_hz: f64) -> Self {
        let midi_note = note_from_pitch(frequency_hz, a4_hz);
        TunerReading {
            frequency_hz,
            midi_note,
            name: NoteName::from_midi(midi_note),
            cents: cents_off_from_pitch(frequency_hz, midi_note, a4_hz),
        }
    }

    pub fn frequency_hz(&self) -> f64 {self.frequency_hz}

    pub fn midi_note(&self) -> i32 {self.midi_note}

    pub fn name(&self) -> NoteName {self.name}

    pub fn cents(&self) -> i32 {self.cents}

    /// Degree of C major the note letter falls on, ignoring sharps.
    pub fn major_degree(&self) -> Option<ScaleDegree> {
        let letter = self.name.letter().trim_end_matches('#');
        ["C", "D", "E", "F", "G", "A", "B"]
            .iter()
            .position(|l| *l == letter)
            .map(|i| i as ScaleDegree + 1)
    }

    pub fn syllable(&self, system: SolfegeSystem) -> Option<&'static str> {
        let degree = self.major_degree()?;
        SCALE_TABLE.get_or_default(DEFAULT_SCALE_KEY).syllable(system, degree)
    }
}

/// A continuously overwritten capture buffer, such as a microphone.
pub trait SampleSource {
    fn sample_rate_hz(&self) -> f64;

    /// Overwrites `buffer` with the most recent samples.
    fn fill(&mut self, buffer: &mut [f32]);
}

/// Steady sine, used as a reference tone and in tests.
#[derive(Copy, Clone, Debug)]
pub struct SineSource {
    frequency_hz: f64,
    amplitude: f64,
    sample_rate_hz: f64,
    phase: f64,
}

impl SineSource {
    pub fn new(frequency_hz: f64, amplitude: f64, sample_rate_hz: f64) -> Self {
        SineSource {frequency_hz, amplitude, sample_rate_hz, phase: 0.0}
    }
}

impl SampleSource for SineSource {
    fn sample_rate_hz(&self) -> f64 {self.sample_rate_hz}

    fn fill(&mut self, buffer: &mut [f32]) {
        let step = TAU * self.frequency_hz / self.sample_rate_hz;
        for sample in buffer.iter_mut() {
            *sample = (self.amplitude * self.phase.sin()) as f32;
            self.phase = (self.phase + step) % TAU;
        }
    }
}

/// One analysis per display frame. Owns its buffer, so it shares nothing
/// with playback.
pub struct TunerPoller<S: SampleSource> {
    source: S,
    buffer: Vec<f32>,
    detector: PitchDetector,
    a4_hz: f64,
}

impl<S: SampleSource> TunerPoller<S> {
    pub fn new(source: S, detector: PitchDetector, buffer_size: usize, a4_hz: f64) -> Self {
        TunerPoller {source, buffer: vec![0.0; buffer_size.max(MIN_SLICE)], detector, a4_hz}
    }

    pub fn poll(&mut self) -> PitchEstimate {
        self.source.fill(&mut self.buffer);
        self.detector.estimate(&self.buffer, self.source.sample_rate_hz())
    }

    pub fn poll_reading(&mut self) -> Option<TunerReading> {
        let a4_hz = self.a4_hz;
        self.poll().frequency().map(|f| TunerReading::from_frequency(f, a4_hz))
    }

    pub fn source_mut(&mut self) -> &mut S {&mut self.source}
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 44100.0;

    fn sine(frequency: f64, amplitude: f64, len: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; len];
        SineSource::new(frequency, amplitude, SAMPLE_RATE).fill(&mut buffer);
        buffer
    }

    #[test]
    fn test_sine_within_one_percent() {
        let detector = PitchDetector::default();
        for frequency in [196.0, 220.0, 261.63, 440.0, 659.25, 880.0] {
            let estimate = detector.estimate(&sine(frequency, 0.5, DEFAULT_BUFFER_SIZE), SAMPLE_RATE);
            let found = estimate.frequency().unwrap();
            println!("{frequency} -> {found}");
            assert!((found - frequency).abs() / frequency < 0.01);
            assert!(estimate.confidence_rms() >= DEFAULT_RMS_FLOOR);
        }
    }

    #[test]
    fn test_silence() {
        let detector = PitchDetector::default();
        let estimate = detector.estimate(&vec![0.0; DEFAULT_BUFFER_SIZE], SAMPLE_RATE);
        assert_eq!(estimate.frequency(), None);
        assert_eq!(estimate.confidence_rms(), 0.0);
        assert!(!detector.estimate(&sine(440.0, 0.005, DEFAULT_BUFFER_SIZE), SAMPLE_RATE).has_signal());
        assert!(!detector.estimate(&[], SAMPLE_RATE).has_signal());
    }

    #[test]
    fn test_short_and_flat_buffers() {
        let detector = PitchDetector::default();
        assert!(!detector.estimate(&[0.5, 0.5], SAMPLE_RATE).has_signal());
        assert!(!detector.estimate(&[0.9; 64], SAMPLE_RATE).has_signal());
        assert!(!detector.estimate(&[0.1, 0.1, 0.1, 0.1], SAMPLE_RATE).has_signal());
    }

    #[test]
    fn test_a4_reading() {
        let detector = PitchDetector::default();
        let reading = detector.read(&sine(440.0, 0.5, DEFAULT_BUFFER_SIZE), SAMPLE_RATE).unwrap();
        assert_eq!(reading.midi_note(), 69);
        assert_eq!(format!("{}", reading.name()), "A4");
        assert!(reading.cents().abs() <= 5, "{reading:?}");
        assert_eq!(reading.major_degree(), Some(6));
        assert_eq!(reading.syllable(SolfegeSystem::Western), Some("La"));
    }

    #[test]
    fn test_exact_reading() {
        let reading = TunerReading::from_frequency(440.0, A4_HZ);
        assert_eq!(reading.midi_note(), 69);
        assert_eq!(reading.cents(), 0);
        let sharp = TunerReading::from_frequency(277.18, A4_HZ);
        assert_eq!(format!("{}", sharp.name()), "C#4");
        assert_eq!(sharp.major_degree(), Some(1));
    }

    #[test]
    fn test_poller() {
        let mut poller = TunerPoller::new(SineSource::new(330.0, 0.4, SAMPLE_RATE), PitchDetector::default(), DEFAULT_BUFFER_SIZE, A4_HZ);
        for _ in 0..3 {
            let found = poller.poll().frequency().unwrap();
            assert!((found - 330.0).abs() / 330.0 < 0.01);
        }
        assert_eq!(format!("{}", poller.poll_reading().unwrap().name()), "E4");
    }
}
