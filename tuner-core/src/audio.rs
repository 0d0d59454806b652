//! # Audio Capture Module
//!
//! Microphone input through CPAL (Cross-Platform Audio Library), available
//! with the `capture` feature.
//!
//! The stream is opened on the tuner's worker thread and lives inside the
//! returned [`AudioInput`]; dropping the input stops capture. The CPAL
//! callback downmixes to the first channel, converts to 16-bit and cuts the
//! stream into frames of `frame_length` samples. Frames the worker has not
//! picked up yet are dropped rather than queued without bound.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};

use crate::config::TunerConfig;
use crate::error::TunerError;
use crate::source::{AudioInput, FrameResult, InputProvider, SourceError};

/// Frames buffered between the capture callback and the worker.
const FRAME_QUEUE: usize = 4;

/// Captures from an input device.
#[derive(Debug, Clone, Default)]
pub struct Microphone {
    device_name: Option<String>,
}

impl Microphone {
    /// The host's default input device.
    pub fn new() -> Self {
        Self::default()
    }

    /// The first input device whose name contains `name`.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    /// Names of the available input devices.
    pub fn list_devices() -> Result<Vec<String>, TunerError> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(unavailable)?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    fn select_device(&self) -> Result<cpal::Device, TunerError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| TunerError::InputUnavailable("no input device available".into())),
            Some(wanted) => host
                .input_devices()
                .map_err(unavailable)?
                .find(|device| device.name().is_ok_and(|name| name.contains(wanted.as_str())))
                .ok_or_else(|| TunerError::InputUnavailable(format!("no input device matching {wanted:?}"))),
        }
    }
}

impl InputProvider for Microphone {
    fn open(&self, config: &TunerConfig) -> Result<AudioInput, TunerError> {
        let device = self.select_device()?;
        info!(
            "[AUDIO] Using audio input device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let configs = device
            .supported_input_configs()
            .map_err(unavailable)?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
            TunerError::InputUnavailable(format!(
                "no i16 or f32 input format at {} Hz",
                config.sample_rate
            ))
        })?;

        let channels = supported.channels() as usize;
        let format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        info!(
            "[AUDIO] Capturing {format:?}, {channels} channel(s) at {} Hz",
            config.sample_rate
        );

        let (tx, rx) = crossbeam_channel::bounded(FRAME_QUEUE);
        let stream = match format {
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, channels, config.frame_length, tx, |s| s),
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, channels, config.frame_length, tx, f32_to_i16),
            other => {
                return Err(TunerError::InputUnavailable(format!("unsupported sample format {other:?}")));
            }
        }?;
        stream.play().map_err(unavailable)?;

        Ok(AudioInput::new(rx, config.sample_rate).with_guard(CaptureStream(stream)))
    }
}

/// Pauses the stream before dropping it.
struct CaptureStream(cpal::Stream);

impl Drop for CaptureStream {
    fn drop(&mut self) {
        debug!("[AUDIO] Stopping stream");
        if let Err(e) = self.0.pause() {
            warn!("[AUDIO] Error pausing stream: {e}");
        }
    }
}

fn build_stream<T: SizedSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    frame_length: usize,
    tx: Sender<FrameResult>,
    convert: fn(T) -> i16,
) -> Result<cpal::Stream, TunerError> {
    let err_tx = tx.clone();
    let mut framer = Framer::new(frame_length);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = data.chunks(channels.max(1)).map(|chunk| convert(chunk[0]));
                framer.extend(mono, |frame| match tx.try_send(Ok(frame)) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                    Err(TrySendError::Full(_)) => debug!("[AUDIO] Worker behind, frame dropped"),
                });
            },
            move |err| {
                warn!("[AUDIO] An error occurred on the audio stream: {err}");
                let _ = err_tx.try_send(Err(SourceError::Stream(err.to_string())));
            },
            None,
        )
        .map_err(unavailable)
}

/// Cuts a sample stream into fixed-length frames.
#[derive(Debug)]
struct Framer {
    frame_length: usize,
    buffer: Vec<i16>,
}

impl Framer {
    fn new(frame_length: usize) -> Self {
        Self {
            frame_length,
            buffer: Vec::with_capacity(frame_length * 2),
        }
    }

    fn extend(&mut self, samples: impl Iterator<Item = i16>, mut emit: impl FnMut(Vec<i16>)) {
        self.buffer.extend(samples);
        while self.buffer.len() >= self.frame_length {
            let frame: Vec<i16> = self.buffer.drain(..self.frame_length).collect();
            emit(frame);
        }
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Prefers mono, then i16, among configurations that support `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.channels() != 1, c.sample_format() != SampleFormat::I16))
}

fn unavailable(err: impl std::fmt::Display) -> TunerError {
    TunerError::InputUnavailable(err.to_string())
}
