//! # Noise Floor Calibration
//!
//! Establishes the ambient RMS level from the first frames after start-up.
//! The gate in [`crate::gate`] measures every later frame against it.

use log::info;

/// Calibration progress and result.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    /// Sum of the RMS values seen while calibrating.
    pub accumulated_rms: f64,
    /// Number of frames that contributed to the sum.
    pub frames_seen: usize,
    /// Calibrated noise floor. Zero until calibration completes.
    pub floor: f64,
    /// Whether the floor has been fixed.
    pub calibrated: bool,
}

/// Two-state machine: calibrating until `target_frames` frames have been
/// observed, then calibrated with a fixed floor until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct NoiseCalibrator {
    target_frames: usize,
    profile: NoiseProfile,
}

impl NoiseCalibrator {
    /// A calibrator that averages `target_frames` frames. Zero frames means
    /// the floor is 0 and calibration is already complete.
    pub fn new(target_frames: usize) -> Self {
        let mut calibrator = Self {
            target_frames,
            profile: NoiseProfile {
                accumulated_rms: 0.0,
                frames_seen: 0,
                floor: 0.0,
                calibrated: false,
            },
        };
        calibrator.reset();
        calibrator
    }

    /// Feeds one frame's RMS. Returns `true` if this frame completed the
    /// calibration. Ignored once calibrated.
    pub fn observe(&mut self, rms: f64) -> bool {
        if self.profile.calibrated {
            return false;
        }
        self.profile.accumulated_rms += rms;
        self.profile.frames_seen += 1;
        if self.profile.frames_seen >= self.target_frames {
            self.profile.floor = self.profile.accumulated_rms / self.profile.frames_seen as f64;
            self.profile.calibrated = true;
            info!(
                "[CALIBRATION] Noise floor {:.2} RMS from {} frames",
                self.profile.floor, self.profile.frames_seen
            );
            return true;
        }
        false
    }

    /// Forgets the floor and starts calibrating again.
    pub fn reset(&mut self) {
        self.profile = NoiseProfile {
            accumulated_rms: 0.0,
            frames_seen: 0,
            floor: 0.0,
            calibrated: self.target_frames == 0,
        };
    }

    pub fn is_calibrated(&self) -> bool {
        self.profile.calibrated
    }

    /// The calibrated floor, if calibration has completed.
    pub fn floor(&self) -> Option<f64> {
        self.profile.calibrated.then_some(self.profile.floor)
    }

    pub fn profile(&self) -> &NoiseProfile {
        &self.profile
    }
}
