//! # Noise Gate
//!
//! Decides whether a frame is loud enough to be worth a pitch search.

/// Why the gate turned a frame away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateVerdict {
    /// The frame is loud enough.
    Open,
    /// RMS below `floor * multiplier`.
    BelowFloor { rms: f64, threshold: f64 },
    /// Peak amplitude below the absolute threshold.
    BelowPeak { peak: u16, threshold: u16 },
}

impl GateVerdict {
    pub fn is_open(&self) -> bool {
        matches!(self, GateVerdict::Open)
    }
}

/// Relative RMS gate with an optional absolute peak check.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    multiplier: f64,
    min_peak: u16,
}

impl NoiseGate {
    pub fn new(multiplier: f32, min_peak: u16) -> Self {
        Self {
            multiplier: multiplier as f64,
            min_peak,
        }
    }

    /// Threshold RMS for a given floor.
    pub fn threshold(&self, floor: f64) -> f64 {
        floor * self.multiplier
    }

    /// Rejects when `rms < floor * multiplier`; a frame exactly at the
    /// threshold passes. A zero `min_peak` disables the peak check.
    pub fn check(&self, rms: f64, peak: u16, floor: f64) -> GateVerdict {
        if self.min_peak > 0 && peak < self.min_peak {
            return GateVerdict::BelowPeak {
                peak,
                threshold: self.min_peak,
            };
        }
        let threshold = self.threshold(floor);
        if rms < threshold {
            return GateVerdict::BelowFloor { rms, threshold };
        }
        GateVerdict::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_rejected() {
        let gate = NoiseGate::new(2.5, 0);
        assert!(!gate.check(249.9, 1000, 100.0).is_open());
        assert!(matches!(
            gate.check(10.0, 1000, 100.0),
            GateVerdict::BelowFloor { threshold, .. } if threshold == 250.0
        ));
    }

    #[test]
    fn threshold_is_inclusive() {
        let gate = NoiseGate::new(2.5, 0);
        assert!(gate.check(250.0, 1000, 100.0).is_open());
        assert!(gate.check(250.1, 1000, 100.0).is_open());
    }

    #[test]
    fn zero_floor_opens_everything() {
        let gate = NoiseGate::new(2.5, 0);
        assert!(gate.check(0.0, 0, 0.0).is_open());
    }

    #[test]
    fn peak_check() {
        let gate = NoiseGate::new(2.5, 500);
        assert_eq!(
            gate.check(1000.0, 499, 1.0),
            GateVerdict::BelowPeak { peak: 499, threshold: 500 }
        );
        assert!(gate.check(1000.0, 500, 1.0).is_open());
    }
}
