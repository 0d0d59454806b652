//! # Frame Sources
//!
//! An [`InputProvider`] is asked for an [`AudioInput`] each time the tuner
//! starts. The input is a channel of 16-bit mono frames plus whatever has
//! to stay alive for frames to keep arriving (a capture stream, a reader
//! thread). Dropping the input releases it.
//!
//! [`FrameFeed`] is the provider for callers that produce samples
//! themselves: push frames through a [`FrameSender`] and the tuner picks
//! them up.

use std::any::Any;
use std::fmt;

use crossbeam_channel::{Receiver, SendError, Sender, TrySendError};
use thiserror::Error;

use crate::config::TunerConfig;
use crate::error::TunerError;

/// A failed read on an otherwise working input. The worker logs it and
/// waits for the next frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("input overrun, {0} samples lost")]
    Overrun(usize),

    #[error("input stream error: {0}")]
    Stream(String),
}

/// One delivery on the frame channel.
pub type FrameResult = Result<Vec<i16>, SourceError>;

/// An opened input: frames arrive on `frames` until the producer closes
/// the channel or the input is dropped.
pub struct AudioInput {
    frames: Receiver<FrameResult>,
    sample_rate: u32,
    _guard: Option<Box<dyn Any>>,
}

impl AudioInput {
    pub fn new(frames: Receiver<FrameResult>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
            _guard: None,
        }
    }

    /// Keeps `guard` alive for as long as the input is.
    pub fn with_guard<G: Any>(mut self, guard: G) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    pub fn frames(&self) -> &Receiver<FrameResult> {
        &self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioInput")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.frames.len())
            .field("guarded", &self._guard.is_some())
            .finish()
    }
}

/// Acquires an audio input for a run of the tuner.
///
/// `open` is called on the worker thread, so inputs that must live on the
/// thread that reads them (capture streams on some hosts) can be created
/// here.
pub trait InputProvider: Send + Sync {
    fn open(&self, config: &TunerConfig) -> Result<AudioInput, TunerError>;
}

/// Channel-fed provider.
///
/// Every `open` hands out the same receiving end, so frames pushed between
/// runs are picked up by the next one.
#[derive(Debug, Clone)]
pub struct FrameFeed {
    rx: Receiver<FrameResult>,
    sample_rate: u32,
}

impl FrameFeed {
    /// A feed with room for `capacity` pending frames, or unbounded for
    /// `None`.
    pub fn new(sample_rate: u32, capacity: Option<usize>) -> (Self, FrameSender) {
        let (tx, rx) = match capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };
        (Self { rx, sample_rate }, FrameSender { tx })
    }
}

impl InputProvider for FrameFeed {
    fn open(&self, config: &TunerConfig) -> Result<AudioInput, TunerError> {
        if self.sample_rate != config.sample_rate {
            return Err(TunerError::InputUnavailable(format!(
                "feed runs at {} Hz, tuner expects {} Hz",
                self.sample_rate, config.sample_rate
            )));
        }
        Ok(AudioInput::new(self.rx.clone(), self.sample_rate))
    }
}

/// Producer half of a [`FrameFeed`]. Dropping every sender closes the feed.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: Sender<FrameResult>,
}

impl FrameSender {
    /// Blocks while the feed is full.
    pub fn send(&self, samples: Vec<i16>) -> Result<(), SendError<FrameResult>> {
        self.tx.send(Ok(samples))
    }

    /// Drops the frame instead of blocking when the feed is full.
    pub fn try_send(&self, samples: Vec<i16>) -> Result<(), TrySendError<FrameResult>> {
        self.tx.try_send(Ok(samples))
    }

    /// Reports a failed read to the tuner.
    pub fn send_error(&self, error: SourceError) -> Result<(), SendError<FrameResult>> {
        self.tx.send(Err(error))
    }
}
