// tuner-core/src/lib.rs

//! The core logic for the string tuner.
//! This crate is responsible for noise-floor calibration, gating,
//! autocorrelation pitch detection and note tracking. It is completely
//! headless and contains no UI code: callers feed frames of 16-bit PCM in
//! and read [`TunerState`] snapshots out.

pub mod calibration;
pub mod config;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod pitch;
pub mod publisher;
pub mod smoothing;
pub mod source;
pub mod stability;
pub mod tuning;
pub mod worker;

#[cfg(feature = "capture")]
pub mod audio;

use serde::{Deserialize, Serialize};

pub use config::{CorrelationMethod, DeviationUnit, LagSelection, TunerConfig};
pub use error::TunerError;
pub use pipeline::{FrameOutcome, TunerPipeline};
pub use publisher::{StatePublisher, StateSubscription};
pub use source::{AudioInput, FrameFeed, FrameSender, InputProvider, SourceError};
pub use tuning::TuningAccuracy;
pub use worker::{Tuner, TunerStatus};

/// One captured block of mono 16-bit PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude, `sqrt(mean(sample²))`. Zero for an empty
    /// frame.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> u16 {
        self.samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
    }
}

/// The published tuner reading.
///
/// Snapshots are immutable: every update replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerState {
    /// Latest accepted frequency estimate in Hz, 0 when silent.
    pub frequency_hz: f32,
    /// Locked (or held) note name, or the placeholder.
    pub note: String,
    /// Deviation from `reference_hz`, clamped to ±50 in `unit`.
    pub deviation: f32,
    /// Frequency of the nearest reference note, 0 when silent.
    pub reference_hz: f32,
    /// Whether the estimate was stable on this frame.
    pub locked: bool,
    /// Unit of `deviation`.
    pub unit: DeviationUnit,
}

impl TunerState {
    /// The snapshot shown while nothing is being played.
    pub fn silence(placeholder: &str, unit: DeviationUnit) -> Self {
        Self {
            frequency_hz: 0.0,
            note: placeholder.to_string(),
            deviation: 0.0,
            reference_hz: 0.0,
            locked: false,
            unit,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.frequency_hz == 0.0
    }

    /// In-tune verdict for what the meter shows: the published deviation
    /// when it is in cents, otherwise the cents between frequency and
    /// reference. `None` when silent.
    pub fn accuracy(&self) -> Option<TuningAccuracy> {
        if self.is_silent() || self.reference_hz <= 0.0 {
            return None;
        }
        let cents = match self.unit {
            DeviationUnit::Cents => self.deviation,
            DeviationUnit::Hz => tuning::cents_between(self.frequency_hz, self.reference_hz),
        };
        Some(TuningAccuracy::from_cents(cents))
    }
}

impl Default for TunerState {
    fn default() -> Self {
        let config = TunerConfig::default();
        Self::silence(&config.placeholder, config.deviation_unit)
    }
}
