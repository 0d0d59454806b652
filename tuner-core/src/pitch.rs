//! # Pitch Detection Module
//!
//! Autocorrelation pitch estimation for monophonic string signals.
//!
//! For every lag in `[min_lag, max_lag]` the unnormalized autocorrelation
//! `Σ s[i]·s[i+lag]` is evaluated and the lag with the largest positive sum
//! is taken as the period. The estimate is `sample_rate / lag`.
//!
//! ## Features
//! - Exact integer summation (default) or FFT-accelerated correlation
//! - Global-maximum (default) or first-peak period selection
//! - Optional parabolic interpolation for sub-sample period accuracy
//! - Rejection of degenerate and out-of-range results

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::config::{CorrelationMethod, LagSelection, TunerConfig};

/// Fraction of the tallest peak the first-peak rule accepts.
const FIRST_PEAK_RATIO: f64 = 0.9;

/// A validated pitch estimate for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz.
    pub frequency: f32,
    /// Lag (in samples) with the largest correlation.
    pub lag: usize,
    /// Correlation value at `lag`.
    pub correlation: f64,
}

/// Why a frame produced no estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchRejection {
    /// The frame is shorter than the smallest lag searched.
    FrameTooShort,
    /// No lag had a positive correlation.
    NoCorrelation,
    /// The estimate was NaN, infinite or non-positive.
    Degenerate,
    /// The estimate fell outside the instrument range.
    OutOfRange(f32),
}

/// Autocorrelation detector bound to one sample rate and instrument range.
pub struct AutocorrelationDetector {
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
    min_lag: usize,
    max_lag: usize,
    method: CorrelationMethod,
    selection: LagSelection,
    interpolate: bool,
    plans: Option<FftPlans>,
    correlations: Vec<f64>,
}

/// Forward and inverse transforms for one padded size.
struct FftPlans {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftPlans {
    fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }
}

impl AutocorrelationDetector {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            min_freq: config.min_freq,
            max_freq: config.max_freq,
            min_lag: config.min_lag(),
            max_lag: ((config.sample_rate as f32 / config.min_freq) as usize).max(1),
            method: config.correlation,
            selection: config.lag_selection,
            interpolate: config.parabolic_interpolation,
            plans: None,
            correlations: Vec::new(),
        }
    }

    /// Searched lag range for a frame of `len` samples.
    pub fn lag_range(&self, len: usize) -> Option<(usize, usize)> {
        let max_lag = self.max_lag.min(len.saturating_sub(1));
        (self.min_lag <= max_lag).then_some((self.min_lag, max_lag))
    }

    /// Runs the search on `samples` and validates the result.
    pub fn detect(&mut self, samples: &[i16]) -> Result<PitchEstimate, PitchRejection> {
        let (min_lag, max_lag) = self
            .lag_range(samples.len())
            .ok_or(PitchRejection::FrameTooShort)?;

        self.correlations.clear();
        self.correlations.resize(max_lag + 2, 0.0);
        match self.method {
            CorrelationMethod::Direct => {
                direct_autocorrelation(samples, min_lag, max_lag, &mut self.correlations)
            }
            CorrelationMethod::Fft => {
                let size = (samples.len() * 2).next_power_of_two();
                if self.plans.as_ref().is_none_or(|plans| plans.size != size) {
                    self.plans = Some(FftPlans::new(size));
                }
                if let Some(plans) = &self.plans {
                    fft_autocorrelation(plans, samples, max_lag, &mut self.correlations)
                }
            }
        }

        let best_lag = match self.selection {
            LagSelection::GlobalMaximum => global_maximum(&self.correlations, min_lag, max_lag),
            LagSelection::FirstPeak => {
                normalize_by_overlap(&mut self.correlations, samples.len());
                first_peak(&self.correlations, min_lag, max_lag)
            }
        };
        if best_lag == 0 {
            return Err(PitchRejection::NoCorrelation);
        }
        let best_corr = self.correlations[best_lag];

        let period = if self.interpolate {
            self.refine_period(best_lag, min_lag, max_lag)
        } else {
            best_lag as f64
        };
        let frequency = (self.sample_rate as f64 / period) as f32;

        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(PitchRejection::Degenerate);
        }
        if frequency < self.min_freq || frequency > self.max_freq {
            return Err(PitchRejection::OutOfRange(frequency));
        }

        Ok(PitchEstimate {
            frequency,
            lag: best_lag,
            correlation: best_corr,
        })
    }

    /// Vertex of the parabola through the best lag and its neighbours.
    fn refine_period(&self, lag: usize, min_lag: usize, max_lag: usize) -> f64 {
        if lag <= min_lag || lag >= max_lag {
            return lag as f64;
        }
        let y1 = self.correlations[lag - 1];
        let y2 = self.correlations[lag];
        let y3 = self.correlations[lag + 1];
        let denominator = y1 - 2.0 * y2 + y3;
        if denominator.abs() < f64::EPSILON {
            return lag as f64;
        }
        let shift = 0.5 * (y1 - y3) / denominator;
        if shift.abs() > 1.0 {
            return lag as f64;
        }
        lag as f64 + shift
    }
}

/// Lag of the largest positive sum; the smallest such lag on ties. Zero when
/// nothing is positive.
fn global_maximum(correlations: &[f64], min_lag: usize, max_lag: usize) -> usize {
    let mut best_lag = 0;
    let mut best_corr = 0.0;
    for (lag, &corr) in correlations.iter().enumerate().take(max_lag + 1).skip(min_lag) {
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }
    best_lag
}

/// First positive local maximum reaching [`FIRST_PEAK_RATIO`] of the tallest
/// one. Zero when there is no positive peak.
fn first_peak(correlations: &[f64], min_lag: usize, max_lag: usize) -> usize {
    let is_peak = |lag: usize| {
        let corr = correlations[lag];
        lag >= 1 && corr > 0.0 && corr > correlations[lag - 1] && corr >= correlations[lag + 1]
    };
    let peaks: Vec<usize> = (min_lag..=max_lag).filter(|&lag| is_peak(lag)).collect();
    let tallest = peaks
        .iter()
        .map(|&lag| correlations[lag])
        .fold(0.0_f64, f64::max);
    peaks
        .into_iter()
        .find(|&lag| correlations[lag] >= FIRST_PEAK_RATIO * tallest)
        .unwrap_or(0)
}

/// Divides each sum by the number of products it contains.
fn normalize_by_overlap(correlations: &mut [f64], len: usize) {
    for (lag, corr) in correlations.iter_mut().enumerate() {
        if lag < len {
            *corr /= (len - lag) as f64;
        }
    }
}

/// Exact sums; i16 products accumulate in i64 without overflow for any
/// realistic frame length.
fn direct_autocorrelation(samples: &[i16], min_lag: usize, max_lag: usize, out: &mut [f64]) {
    let first = min_lag.saturating_sub(1).max(1);
    let last = (max_lag + 1).min(samples.len().saturating_sub(1));
    for lag in first..=last {
        let sum: i64 = samples[..samples.len() - lag]
            .iter()
            .zip(&samples[lag..])
            .map(|(&a, &b)| a as i64 * b as i64)
            .sum();
        out[lag] = sum as f64;
    }
}

/// Wiener–Khinchin: zero-pad to at least twice the frame length so the
/// circular correlation equals the linear one, then IFFT(|FFT(x)|²).
fn fft_autocorrelation(plans: &FftPlans, samples: &[i16], max_lag: usize, out: &mut [f64]) {
    let size = plans.size;

    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .map(|&s| Complex { re: s as f64, im: 0.0 })
        .chain(std::iter::repeat(Complex { re: 0.0, im: 0.0 }))
        .take(size)
        .collect();

    plans.forward.process(&mut buffer);
    for value in buffer.iter_mut() {
        *value = Complex {
            re: value.norm_sqr(),
            im: 0.0,
        };
    }
    plans.inverse.process(&mut buffer);

    // rustfft does not normalize the inverse transform.
    let scale = 1.0 / size as f64;
    let last = (max_lag + 1).min(out.len() - 1).min(samples.len().saturating_sub(1));
    for lag in 1..=last {
        out[lag] = buffer[lag].re * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: u32, len: usize, amplitude: f64, offset: usize) -> Vec<i16> {
        (offset..offset + len)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin()) as i16)
            .collect()
    }

    fn quantization_step(freq: f64, sample_rate: u32) -> f64 {
        let period = sample_rate as f64 / freq;
        sample_rate as f64 / period.floor() - sample_rate as f64 / period.ceil()
    }

    #[test]
    fn pure_tones_within_one_quantization_step() {
        let config = TunerConfig::default();
        let mut detector = AutocorrelationDetector::new(&config);
        for freq in [196.0, 220.0, 246.94, 293.66, 329.63, 440.0, 523.25, 660.0, 880.0] {
            let signal = sine(freq, config.sample_rate, config.frame_length, 8000.0, 0);
            let estimate = detector.detect(&signal).expect("tone detected");
            assert!(
                (estimate.frequency as f64 - freq).abs() <= quantization_step(freq, config.sample_rate) + 1e-3,
                "{freq} Hz estimated as {} Hz (lag {})",
                estimate.frequency,
                estimate.lag
            );
        }
    }

    #[test]
    fn a440_at_cd_rate() {
        let mut detector = AutocorrelationDetector::new(&TunerConfig::default());
        let estimate = detector.detect(&sine(440.0, 44_100, 2048, 10_000.0, 0)).expect("detected");
        assert_eq!(estimate.lag, 100);
        assert_eq!(estimate.frequency, 441.0);
        assert!(estimate.correlation > 0.0);
    }

    #[test]
    fn low_e_aliases_under_global_maximum() {
        // Four periods per frame: the shortest lag outweighs the true period
        // and the result lands just above the range.
        let mut detector = AutocorrelationDetector::new(&TunerConfig::default());
        let result = detector.detect(&sine(82.41, 44_100, 2048, 10_000.0, 0));
        assert!(matches!(result, Err(PitchRejection::OutOfRange(f)) if f > 1000.0));
    }

    #[test]
    fn first_peak_tracks_open_strings() {
        let config = TunerConfig::guitar();
        let mut detector = AutocorrelationDetector::new(&config);
        for freq in [82.41, 110.0, 146.83, 196.0, 246.94, 329.63] {
            for offset in [0, 777] {
                let signal = sine(freq, config.sample_rate, config.frame_length, 8000.0, offset);
                let estimate = detector.detect(&signal).expect("string detected");
                let error = (estimate.frequency as f64 - freq).abs() / freq;
                assert!(error < 0.01, "{freq} Hz estimated as {} Hz", estimate.frequency);
            }
        }
    }

    #[test]
    fn fft_method_matches_direct() {
        let fft_config = TunerConfig {
            correlation: CorrelationMethod::Fft,
            ..TunerConfig::default()
        };
        let mut direct = AutocorrelationDetector::new(&TunerConfig::default());
        let mut fft = AutocorrelationDetector::new(&fft_config);
        for freq in [196.0, 293.66, 440.0, 660.0] {
            let signal = sine(freq, 44_100, 2048, 12_000.0, 0);
            let a = direct.detect(&signal).expect("direct");
            let b = fft.detect(&signal).expect("fft");
            assert_eq!(a.lag, b.lag, "{freq} Hz");
            assert!((a.correlation - b.correlation).abs() / a.correlation < 1e-6);
        }
    }

    #[test]
    fn interpolation_tightens_estimate() {
        let config = TunerConfig {
            parabolic_interpolation: true,
            ..TunerConfig::default()
        };
        let mut detector = AutocorrelationDetector::new(&config);
        let estimate = detector.detect(&sine(440.0, 44_100, 2048, 10_000.0, 0)).expect("detected");
        assert_eq!(estimate.lag, 100);
        assert!((estimate.frequency - 440.0).abs() < 0.5, "{}", estimate.frequency);
    }

    #[test]
    fn silence_has_no_correlation() {
        let mut detector = AutocorrelationDetector::new(&TunerConfig::default());
        assert_eq!(detector.detect(&[0; 2048]), Err(PitchRejection::NoCorrelation));

        let mut first_peak = AutocorrelationDetector::new(&TunerConfig::guitar());
        assert_eq!(first_peak.detect(&[0; 2048]), Err(PitchRejection::NoCorrelation));
    }

    #[test]
    fn tone_below_range_is_rejected() {
        let mut detector = AutocorrelationDetector::new(&TunerConfig::default());
        let result = detector.detect(&sine(40.0, 44_100, 2048, 10_000.0, 0));
        assert!(matches!(result, Err(PitchRejection::OutOfRange(_))));
    }

    #[test]
    fn short_frame_is_rejected() {
        let mut detector = AutocorrelationDetector::new(&TunerConfig::default());
        assert_eq!(detector.detect(&[100; 10]), Err(PitchRejection::FrameTooShort));
    }

    #[test]
    fn compact_rate_tracks_a3() {
        let config = TunerConfig::compact();
        let mut detector = AutocorrelationDetector::new(&config);
        let estimate = detector
            .detect(&sine(220.0, config.sample_rate, config.frame_length, 9000.0, 0))
            .expect("detected");
        assert!(
            (estimate.frequency as f64 - 220.0).abs() <= quantization_step(220.0, config.sample_rate) + 1e-3,
            "{}",
            estimate.frequency
        );
    }
}
