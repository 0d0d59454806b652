//! # Deviation Smoothing
//!
//! Exponential moving average over the published deviation, trading a
//! little latency for a steadier needle.

/// `smoothed = smoothed * (1 - alpha) + raw * alpha`, starting from zero.
#[derive(Debug, Clone)]
pub struct DeviationSmoother {
    alpha: Option<f32>,
    value: f32,
}

impl DeviationSmoother {
    /// `None` disables smoothing: [`apply`](Self::apply) returns its input.
    pub fn new(alpha: Option<f32>) -> Self {
        Self { alpha, value: 0.0 }
    }

    pub fn apply(&mut self, raw: f32) -> f32 {
        self.value = match self.alpha {
            Some(alpha) => self.value * (1.0 - alpha) + raw * alpha,
            None => raw,
        };
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_input_converges_monotonically_without_overshoot() {
        for target in [30.0_f32, -12.5, 50.0] {
            let mut smoother = DeviationSmoother::new(Some(0.25));
            let mut previous = 0.0_f32;
            for _ in 0..200 {
                let value = smoother.apply(target);
                assert!((value - target).abs() <= (previous - target).abs() + 1e-6);
                assert!(value.abs() <= target.abs() + 1e-4, "overshoot: {value} past {target}");
                assert_eq!(value.signum(), target.signum());
                previous = value;
            }
            assert!((previous - target).abs() < 1e-3);
        }
    }

    #[test]
    fn first_step_is_alpha_weighted() {
        let mut smoother = DeviationSmoother::new(Some(0.25));
        assert_eq!(smoother.apply(40.0), 10.0);
        assert_eq!(smoother.apply(40.0), 17.5);
    }

    #[test]
    fn disabled_passes_through() {
        let mut smoother = DeviationSmoother::new(None);
        assert_eq!(smoother.apply(-7.0), -7.0);
        assert_eq!(smoother.apply(3.0), 3.0);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut smoother = DeviationSmoother::new(Some(0.5));
        smoother.apply(20.0);
        smoother.reset();
        assert_eq!(smoother.value(), 0.0);
        assert_eq!(smoother.apply(20.0), 10.0);
    }
}
