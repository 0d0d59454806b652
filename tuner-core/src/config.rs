//! # Configuration Module
//!
//! All tunable parameters of the pipeline live in [`TunerConfig`]. Every
//! field has a default, and the deployments (a string-instrument tuner, a
//! wide-range tuner and a low-rate compact tuner) are presets rather than
//! separate code paths. The plain defaults pick the global correlation
//! maximum, which cannot read the low guitar strings in 2048-sample frames;
//! use [`TunerConfig::guitar`] for those.
//!
//! Configurations round-trip through JSON. Missing fields fall back to their
//! defaults, so a file only needs the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};
use crate::tuning::{OCTAVE_RANGE, ReferenceTable};

/// Unit of the published deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationUnit {
    /// Logarithmic distance, 100 cents per semitone.
    #[default]
    Cents,
    /// Linear difference from the reference frequency.
    Hz,
}

impl DeviationUnit {
    /// Short suffix for display purposes.
    pub fn suffix(&self) -> &'static str {
        match self {
            DeviationUnit::Cents => "ct",
            DeviationUnit::Hz => "Hz",
        }
    }
}

/// How the autocorrelation sums are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    /// Direct O(L × lags) summation with exact integer accumulation.
    #[default]
    Direct,
    /// Wiener–Khinchin: inverse FFT of the power spectrum of the zero-padded
    /// frame. Same values up to floating-point error.
    Fft,
}

/// How the period is chosen from the correlation sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagSelection {
    /// The lag with the largest unnormalized sum. Short frames favour short
    /// lags, so tones with few periods per frame read sharp or alias upward.
    #[default]
    GlobalMaximum,
    /// Sums divided by their overlap length; the first local peak reaching
    /// 90% of the tallest peak wins. Tracks low strings in short frames.
    FirstPeak,
}

/// Complete tuner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Number of samples per analysis frame.
    pub frame_length: usize,
    /// Frames observed to establish the noise floor. Zero skips calibration
    /// (floor 0).
    pub calibration_frames: usize,
    /// A frame passes the gate when `rms >= floor * noise_multiplier`.
    pub noise_multiplier: f32,
    /// Coarse gate: frames whose peak |sample| is below this are rejected.
    /// Zero disables the check.
    pub min_peak_amplitude: u16,
    /// Consecutive gated frames before the silence snapshot is published.
    pub silence_frames: u32,
    /// Clear the stability history when the silence snapshot is published.
    pub reset_history_on_silence: bool,
    /// Lowest accepted fundamental in Hz.
    pub min_freq: f32,
    /// Highest accepted fundamental in Hz.
    pub max_freq: f32,
    /// Capacity of the frequency history used for locking.
    pub history_size: usize,
    /// Hold off locking until the history is full. Off by default: a single
    /// estimate has zero spread and locks.
    pub require_full_history: bool,
    /// Maximum spread (Hz) of the history for the estimate to be stable.
    pub stability_threshold_hz: f32,
    /// How long the last locked note stays displayed once stability is lost.
    pub hold_time_ms: u64,
    /// EMA factor for the deviation. `None` publishes the raw deviation.
    pub smoothing_alpha: Option<f32>,
    /// Unit of the published deviation.
    pub deviation_unit: DeviationUnit,
    /// Frequency of A4 in Hz.
    pub reference_pitch_hz: f32,
    /// Lowest octave of the reference table.
    pub min_octave: i32,
    /// Highest octave of the reference table (inclusive).
    pub max_octave: i32,
    /// Autocorrelation strategy.
    pub correlation: CorrelationMethod,
    /// Period selection rule.
    pub lag_selection: LagSelection,
    /// Refine the best lag with a parabola through its neighbours.
    pub parabolic_interpolation: bool,
    /// Note text published when no note is locked.
    pub placeholder: String,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_length: 2048,
            calibration_frames: 20,
            noise_multiplier: 2.5,
            min_peak_amplitude: 0,
            silence_frames: 1,
            reset_history_on_silence: false,
            min_freq: 50.0,
            max_freq: 1000.0,
            history_size: 5,
            require_full_history: false,
            stability_threshold_hz: 1.0,
            hold_time_ms: 700,
            smoothing_alpha: Some(0.25),
            deviation_unit: DeviationUnit::Cents,
            reference_pitch_hz: 440.0,
            min_octave: 1,
            max_octave: 6,
            correlation: CorrelationMethod::Direct,
            lag_selection: LagSelection::GlobalMaximum,
            parabolic_interpolation: false,
            placeholder: "--".into(),
        }
    }
}

impl TunerConfig {
    /// String-instrument tuner: the default range and rates, with first-peak
    /// period selection so the low strings lock in 2048-sample frames.
    pub fn guitar() -> Self {
        Self {
            lag_selection: LagSelection::FirstPeak,
            ..Self::default()
        }
    }

    /// Wide-range tuner: 30–2000 Hz, 4096-sample frames, a peak-amplitude
    /// gate and unsmoothed deviation.
    pub fn wide() -> Self {
        Self {
            frame_length: 4096,
            min_peak_amplitude: 500,
            min_freq: 30.0,
            max_freq: 2000.0,
            smoothing_alpha: None,
            ..Self::default()
        }
    }

    /// Low-rate tuner: 22.05 kHz with 1024-sample frames.
    pub fn compact() -> Self {
        Self {
            sample_rate: 22_050,
            frame_length: 1024,
            ..Self::default()
        }
    }

    /// Looks up a preset by name (`guitar`, `wide`, `compact`).
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Some(Self::default()),
            "guitar" => Some(Self::guitar()),
            "wide" => Some(Self::wide()),
            "compact" => Some(Self::compact()),
            _ => None,
        }
    }

    /// Smallest lag searched by the pitch detector.
    pub fn min_lag(&self) -> usize {
        ((self.sample_rate as f32 / self.max_freq) as usize).max(1)
    }

    /// Largest lag searched by the pitch detector.
    pub fn max_lag(&self) -> usize {
        ((self.sample_rate as f32 / self.min_freq) as usize).min(self.frame_length.saturating_sub(1))
    }

    /// Checks every field for a usable value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TunerError::InvalidConfig(msg));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".into());
        }
        if self.frame_length < 2 {
            return invalid(format!("frame_length must be at least 2, got {}", self.frame_length));
        }
        if !(self.noise_multiplier.is_finite() && self.noise_multiplier >= 0.0) {
            return invalid(format!("noise_multiplier must be >= 0, got {}", self.noise_multiplier));
        }
        if !(self.min_freq.is_finite() && self.min_freq > 0.0) {
            return invalid(format!("min_freq must be positive, got {}", self.min_freq));
        }
        if !(self.max_freq.is_finite() && self.max_freq > self.min_freq) {
            return invalid(format!(
                "max_freq ({}) must be greater than min_freq ({})",
                self.max_freq, self.min_freq
            ));
        }
        if self.max_freq * 2.0 > self.sample_rate as f32 {
            return invalid(format!(
                "max_freq ({}) must not exceed the Nyquist frequency ({})",
                self.max_freq,
                self.sample_rate / 2
            ));
        }
        if self.min_lag() > self.max_lag() {
            return invalid(format!(
                "frame_length {} is too short for min_freq {} at {} Hz",
                self.frame_length, self.min_freq, self.sample_rate
            ));
        }
        if self.history_size == 0 {
            return invalid("history_size must be at least 1".into());
        }
        if !(self.stability_threshold_hz.is_finite() && self.stability_threshold_hz >= 0.0) {
            return invalid(format!(
                "stability_threshold_hz must be >= 0, got {}",
                self.stability_threshold_hz
            ));
        }
        if let Some(alpha) = self.smoothing_alpha {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return invalid(format!("smoothing_alpha must be in (0, 1], got {alpha}"));
            }
        }
        if !(self.reference_pitch_hz.is_finite() && self.reference_pitch_hz > 0.0) {
            return invalid(format!(
                "reference_pitch_hz must be positive, got {}",
                self.reference_pitch_hz
            ));
        }
        if self.min_octave > self.max_octave {
            return invalid(format!(
                "min_octave ({}) must not exceed max_octave ({})",
                self.min_octave, self.max_octave
            ));
        }
        if !(OCTAVE_RANGE.contains(&self.min_octave) && OCTAVE_RANGE.contains(&self.max_octave)) {
            return invalid(format!(
                "octaves must lie within {}..={}, got {}..={}",
                OCTAVE_RANGE.start(),
                OCTAVE_RANGE.end(),
                self.min_octave,
                self.max_octave
            ));
        }
        let table = ReferenceTable::new(self.min_octave, self.max_octave, self.reference_pitch_hz);
        if !table.is_strictly_increasing() {
            return invalid(format!(
                "reference_pitch_hz {} gives unusable note frequencies over octaves {}..={}",
                self.reference_pitch_hz, self.min_octave, self.max_octave
            ));
        }
        if self.silence_frames == 0 {
            return invalid("silence_frames must be at least 1".into());
        }
        Ok(())
    }

    /// Loads a configuration from a JSON file and validates it.
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
