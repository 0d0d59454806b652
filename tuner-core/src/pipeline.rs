//! # Frame Pipeline
//!
//! Runs one frame through calibration, the gate, the pitch search, note
//! mapping, the stability filter and the smoother. The pipeline owns all of
//! the per-run state and is driven by a single thread; it never blocks and
//! never fails on a frame.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::calibration::NoiseCalibrator;
use crate::config::TunerConfig;
use crate::error::Result;
use crate::gate::{GateVerdict, NoiseGate};
use crate::pitch::{AutocorrelationDetector, PitchEstimate, PitchRejection};
use crate::smoothing::DeviationSmoother;
use crate::stability::{NoteDisplay, StabilityFilter};
use crate::tuning::ReferenceTable;
use crate::{AudioFrame, TunerState};

/// What happened to a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The frame was empty and ignored.
    Skipped,
    /// The frame was consumed by noise calibration.
    Calibrating { frames_seen: usize, target: usize },
    /// The frame completed calibration.
    Calibrated { floor: f64 },
    /// The gate rejected the frame; silence is not published yet.
    Gated(GateVerdict),
    /// Enough consecutive frames were gated; publish this snapshot.
    Silent(TunerState),
    /// The pitch search produced nothing usable.
    Discarded(PitchRejection),
    /// The estimate had no reference note to map onto. Only an empty table
    /// does this.
    Unmapped { frequency: f32 },
    /// A valid estimate; publish this snapshot.
    Tracked(TunerState),
}

impl FrameOutcome {
    /// The snapshot to publish, if this frame produced one.
    pub fn state(&self) -> Option<&TunerState> {
        match self {
            FrameOutcome::Silent(state) | FrameOutcome::Tracked(state) => Some(state),
            _ => None,
        }
    }
}

/// Per-run tuner state machine.
pub struct TunerPipeline {
    config: TunerConfig,
    table: ReferenceTable,
    calibrator: NoiseCalibrator,
    gate: NoiseGate,
    detector: AutocorrelationDetector,
    stability: StabilityFilter,
    smoother: DeviationSmoother,
    gated_run: u32,
}

impl TunerPipeline {
    /// Builds a pipeline for a validated copy of `config`.
    pub fn new(config: TunerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table: ReferenceTable::new(
                config.min_octave,
                config.max_octave,
                config.reference_pitch_hz,
            ),
            calibrator: NoiseCalibrator::new(config.calibration_frames),
            gate: NoiseGate::new(config.noise_multiplier, config.min_peak_amplitude),
            detector: AutocorrelationDetector::new(&config),
            stability: StabilityFilter::new(
                config.history_size,
                config.stability_threshold_hz,
                Duration::from_millis(config.hold_time_ms),
            )
            .requiring_full_history(config.require_full_history),
            smoother: DeviationSmoother::new(config.smoothing_alpha),
            gated_run: 0,
            config,
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    pub fn calibrator(&self) -> &NoiseCalibrator {
        &self.calibrator
    }

    /// The snapshot for "nothing is playing".
    pub fn silence(&self) -> TunerState {
        TunerState::silence(&self.config.placeholder, self.config.deviation_unit)
    }

    /// Processes one frame. `now` drives the hold timer.
    pub fn process_frame(&mut self, frame: &AudioFrame, now: Instant) -> FrameOutcome {
        if frame.is_empty() {
            trace!("empty frame skipped");
            return FrameOutcome::Skipped;
        }

        let rms = frame.rms();

        let Some(floor) = self.calibrator.floor() else {
            if self.calibrator.observe(rms) {
                return FrameOutcome::Calibrated {
                    floor: self.calibrator.profile().floor,
                };
            }
            return FrameOutcome::Calibrating {
                frames_seen: self.calibrator.profile().frames_seen,
                target: self.config.calibration_frames,
            };
        };

        let verdict = self.gate.check(rms, frame.peak(), floor);
        if !verdict.is_open() {
            return self.on_gated(verdict);
        }
        self.gated_run = 0;

        match self.detector.detect(frame.samples()) {
            Ok(estimate) => self.track(estimate, now),
            Err(rejection) => {
                trace!("pitch rejected: {rejection:?}");
                FrameOutcome::Discarded(rejection)
            }
        }
    }

    fn on_gated(&mut self, verdict: GateVerdict) -> FrameOutcome {
        self.gated_run = self.gated_run.saturating_add(1);
        trace!("frame gated ({verdict:?}), run of {}", self.gated_run);
        if self.gated_run < self.config.silence_frames {
            return FrameOutcome::Gated(verdict);
        }
        if self.config.reset_history_on_silence {
            self.stability.clear_history();
        }
        FrameOutcome::Silent(self.silence())
    }

    fn track(&mut self, estimate: PitchEstimate, now: Instant) -> FrameOutcome {
        let Some(mapped) = self.table.map(estimate.frequency, self.config.deviation_unit) else {
            return FrameOutcome::Unmapped {
                frequency: estimate.frequency,
            };
        };

        let deviation = self.smoother.apply(mapped.deviation);
        let display = self.stability.update(estimate.frequency, &mapped.name, now);
        let (note, locked) = match display {
            NoteDisplay::Locked => (mapped.name.clone(), true),
            NoteDisplay::Held(held) => (held, false),
            NoteDisplay::Placeholder => (self.config.placeholder.clone(), false),
        };

        debug!(
            "{:.2} Hz (lag {}) -> {} {:+.2}{} [{}]",
            estimate.frequency,
            estimate.lag,
            mapped.name,
            deviation,
            self.config.deviation_unit.suffix(),
            if locked { "locked" } else { "unlocked" },
        );

        FrameOutcome::Tracked(TunerState {
            frequency_hz: estimate.frequency,
            note,
            deviation,
            reference_hz: mapped.reference,
            locked,
            unit: self.config.deviation_unit,
        })
    }

    /// Returns to the freshly constructed state: calibration restarts and
    /// history, hold state and smoothing are cleared.
    pub fn reset(&mut self) {
        self.calibrator.reset();
        self.stability.reset();
        self.smoother.reset();
        self.gated_run = 0;
    }
}
