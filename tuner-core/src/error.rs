//! # Error Module
//!
//! The error type returned across the `tuner-core` boundary. Per-frame
//! problems (short reads, degenerate pitch results, out-of-range notes) are
//! never errors: the pipeline skips the frame and carries on. Only
//! configuration problems and failing to acquire an input surface here.

use thiserror::Error;

/// Errors reported by the tuner's public API.
#[derive(Debug, Error)]
pub enum TunerError {
    /// A configuration value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The audio input could not be acquired (no device, permission denied,
    /// unsupported format...). The worker was not started.
    #[error("audio input unavailable: {0}")]
    InputUnavailable(String),

    /// The worker thread could not be spawned.
    #[error("failed to spawn tuner worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker exited before reporting whether the input opened.
    #[error("tuner worker exited during start-up")]
    WorkerLost,

    /// Reading or writing a configuration file failed.
    #[error("configuration file I/O: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// A configuration file could not be parsed or serialized.
    #[error("configuration file format: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TunerError>;
