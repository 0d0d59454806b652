//! Frame producers for the offline inputs.
//!
//! Both run on their own thread and push into a [`FrameSender`], pacing
//! themselves to real time so hold times and `--duration` behave as they
//! would with a microphone.

use std::f64::consts::PI;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader};
use log::{debug, info};
use tuner_core::FrameSender;

/// Sine generator with optional white noise. Phase carries over between
/// frames.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    frequency: f64,
    amplitude: f64,
    noise: f64,
    sample_rate: u32,
    position: u64,
    rng: u64,
}

impl ToneGenerator {
    pub fn new(frequency: f64, amplitude: f64, noise: f64, sample_rate: u32) -> Self {
        Self {
            frequency,
            amplitude,
            noise,
            sample_rate,
            position: 0,
            rng: 0x2545_F491_4F6C_DD1D,
        }
    }

    pub fn next_frame(&mut self, len: usize) -> Vec<i16> {
        let step = 2.0 * PI * self.frequency / self.sample_rate as f64;
        (0..len)
            .map(|_| {
                let tone = self.amplitude * (step * self.position as f64).sin();
                self.position += 1;
                let noise = if self.noise > 0.0 { self.noise * self.white() } else { 0.0 };
                (tone + noise).clamp(i16::MIN as f64, i16::MAX as f64) as i16
            })
            .collect()
    }

    /// Uniform in [-1, 1) from a xorshift64* state.
    fn white(&mut self) -> f64 {
        self.rng ^= self.rng >> 12;
        self.rng ^= self.rng << 25;
        self.rng ^= self.rng >> 27;
        let bits = self.rng.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 52) as f64 - 1.0
    }
}

/// Feeds generated frames until the tuner stops reading or `limit` frames
/// have been sent.
pub fn spawn_tone(
    mut generator: ToneGenerator,
    frame_length: usize,
    limit: Option<usize>,
    sender: FrameSender,
) -> Result<JoinHandle<()>> {
    let pace = frame_period(frame_length, generator.sample_rate);
    thread::Builder::new()
        .name("tone-feed".into())
        .spawn(move || {
            info!("[CLI] Generating {:.2} Hz", generator.frequency);
            let mut sent = 0usize;
            while limit.is_none_or(|limit| sent < limit) {
                if sender.send(generator.next_frame(frame_length)).is_err() {
                    debug!("[CLI] Tuner gone, tone feed exiting");
                    break;
                }
                sent += 1;
                thread::sleep(pace);
            }
        })
        .context("failed to spawn tone feed")
}

/// Mono 16-bit samples from a WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl WavClip {
    /// Reads the first channel of `path`, converting to 16-bit.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader =
            WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;
        debug!(
            "[CLI] {}: {} Hz, {} channel(s), {}-bit {:?}",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            spec.sample_format
        );

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .step_by(channels)
                .collect::<Result<_, _>>()?,
            (SampleFormat::Int, bits) if bits <= 32 => {
                let shift = bits as i32 - 16;
                reader
                    .samples::<i32>()
                    .step_by(channels)
                    .map(|s| s.map(|s| rescale(s, shift)))
                    .collect::<Result<_, _>>()?
            }
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .step_by(channels)
                .map(|s| s.map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()?,
            (format, bits) => bail!("unsupported WAV format: {bits}-bit {format:?}"),
        };

        Ok(Self {
            sample_rate: spec.sample_rate,
            samples,
        })
    }

    /// Whole frames of `frame_length` samples; a trailing partial frame is
    /// dropped.
    pub fn frames(&self, frame_length: usize) -> impl Iterator<Item = Vec<i16>> + '_ {
        self.samples.chunks_exact(frame_length).map(<[i16]>::to_vec)
    }
}

fn rescale(sample: i32, shift: i32) -> i16 {
    let scaled = if shift >= 0 {
        sample >> shift
    } else {
        sample << -shift
    };
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Feeds the clip once and closes the feed, which ends the tuner's run.
pub fn spawn_wav(clip: WavClip, frame_length: usize, sender: FrameSender) -> Result<JoinHandle<()>> {
    let pace = frame_period(frame_length, clip.sample_rate);
    thread::Builder::new()
        .name("wav-feed".into())
        .spawn(move || {
            let mut sent = 0usize;
            for frame in clip.frames(frame_length) {
                if sender.send(frame).is_err() {
                    break;
                }
                sent += 1;
                thread::sleep(pace);
            }
            info!("[CLI] WAV finished after {sent} frames");
        })
        .context("failed to spawn WAV feed")
}

fn frame_period(frame_length: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frame_length as f64 / sample_rate.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::tempdir;

    #[test]
    fn tone_phase_is_continuous() {
        let mut generator = ToneGenerator::new(441.0, 10_000.0, 0.0, 44_100);
        let first = generator.next_frame(100);
        let second = generator.next_frame(100);
        // 441 Hz at 44.1 kHz repeats every 100 samples.
        for (a, b) in first.iter().zip(&second) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
        assert_eq!(first[0], 0);
        assert!(first.iter().all(|s| s.unsigned_abs() <= 10_000));
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut generator = ToneGenerator::new(220.0, 0.0, 500.0, 44_100);
        let frame = generator.next_frame(4096);
        assert!(frame.iter().all(|s| s.unsigned_abs() <= 500));
        assert!(frame.iter().any(|&s| s != 0));
    }

    #[test]
    fn reads_first_channel_of_stereo_wav() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("create");
        for i in 0..10i16 {
            writer.write_sample(i * 100).expect("left");
            writer.write_sample(-1i16).expect("right");
        }
        writer.finalize().expect("finalize");

        let clip = WavClip::open(&path).expect("open");
        assert_eq!(clip.sample_rate, 22_050);
        assert_eq!(clip.samples, (0..10).map(|i| i * 100).collect::<Vec<i16>>());
        let frames: Vec<_> = clip.frames(4).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], vec![400, 500, 600, 700]);
    }

    #[test]
    fn converts_float_and_24_bit_wav() {
        let dir = tempdir().expect("tempdir");

        let float_path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&float_path, spec).expect("create");
        for s in [0.0f32, 1.0, -2.0] {
            writer.write_sample(s).expect("sample");
        }
        writer.finalize().expect("finalize");
        let clip = WavClip::open(&float_path).expect("open");
        assert_eq!(clip.samples, vec![0, i16::MAX, -i16::MAX]);

        let int_path = dir.path().join("24.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&int_path, spec).expect("create");
        for s in [256i32, -512, 8_388_607] {
            writer.write_sample(s).expect("sample");
        }
        writer.finalize().expect("finalize");
        let clip = WavClip::open(&int_path).expect("open");
        assert_eq!(clip.samples, vec![1, -2, 32_767]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        assert!(WavClip::open(&dir.path().join("absent.wav")).is_err());
    }
}
