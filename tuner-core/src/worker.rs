//! # Tuner Worker
//!
//! [`Tuner`] owns one background thread per run. The thread opens the
//! input, tells `start()` whether that worked, then loops: wait for a frame
//! or a shutdown signal, run the frame through the pipeline, publish.
//!
//! Lifecycle: `Idle -> Running -> Stopping -> Idle`. A run also ends on its
//! own when the input closes, which puts the tuner back in `Idle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::pipeline::{FrameOutcome, TunerPipeline};
use crate::publisher::{StatePublisher, StateSubscription};
use crate::source::{AudioInput, InputProvider};
use crate::{AudioFrame, TunerState};

/// Where the tuner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerStatus {
    Idle,
    Running,
    Stopping,
}

/// Handles for a running worker.
struct AudioWorker {
    shutdown_tx: Sender<()>,
    stop_flag: Arc<AtomicBool>,
    thread_handle: JoinHandle<TunerPipeline>,
}

struct Control {
    worker: Option<AudioWorker>,
    pipeline: Option<TunerPipeline>,
}

/// Start/stop controller around the frame pipeline.
pub struct Tuner {
    config: TunerConfig,
    provider: Arc<dyn InputProvider>,
    publisher: StatePublisher,
    status: Arc<Mutex<TunerStatus>>,
    control: Mutex<Control>,
}

impl Tuner {
    /// A stopped tuner. Fails if `config` does not validate.
    pub fn new(config: TunerConfig, provider: Arc<dyn InputProvider>) -> Result<Self> {
        let pipeline = TunerPipeline::new(config.clone())?;
        let publisher = StatePublisher::new(pipeline.silence());
        Ok(Self {
            config,
            provider,
            publisher,
            status: Arc::new(Mutex::new(TunerStatus::Idle)),
            control: Mutex::new(Control {
                worker: None,
                pipeline: Some(pipeline),
            }),
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn status(&self) -> TunerStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.status() == TunerStatus::Running
    }

    /// The latest published snapshot.
    pub fn state(&self) -> Arc<TunerState> {
        self.publisher.latest()
    }

    pub fn subscribe(&self) -> StateSubscription {
        self.publisher.subscribe()
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    /// Opens the input on a new worker thread and starts processing.
    ///
    /// Returns once the worker has reported whether the input opened. On
    /// failure the tuner stays `Idle`. Does nothing if already running.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control.lock();
        if self.is_running() {
            debug!("[WORKER] start() while running ignored");
            return Ok(());
        }
        // A previous run may have ended on its own; collect it first.
        self.reap(&mut control);

        let mut pipeline = match control.pipeline.take() {
            Some(pipeline) => pipeline,
            None => TunerPipeline::new(self.config.clone())?,
        };
        pipeline.reset();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let context = WorkerContext {
            config: self.config.clone(),
            provider: Arc::clone(&self.provider),
            publisher: self.publisher.clone(),
            status: Arc::clone(&self.status),
            stop_flag: Arc::clone(&stop_flag),
            shutdown_rx,
        };

        info!("[WORKER] Starting tuner worker...");
        let thread_handle = thread::Builder::new()
            .name("tuner-worker".into())
            .spawn(move || context.run(pipeline, ready_tx))
            .map_err(TunerError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                control.worker = Some(AudioWorker {
                    shutdown_tx,
                    stop_flag,
                    thread_handle,
                });
                info!("[WORKER] Tuner running");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("[WORKER] Failed to open input: {e}");
                control.pipeline = thread_handle.join().ok();
                Err(e)
            }
            Err(_) => {
                error!("[WORKER] Worker exited before reporting readiness");
                control.pipeline = thread_handle.join().ok();
                Err(TunerError::WorkerLost)
            }
        }
    }

    /// Stops the worker and waits for it to release the input. The pipeline
    /// is reset and the silence snapshot published before this returns.
    /// Does nothing if the tuner is idle.
    pub fn stop(&self) {
        let mut control = self.control.lock();
        {
            let mut status = self.status.lock();
            if *status == TunerStatus::Running {
                *status = TunerStatus::Stopping;
            }
        }

        let Some(worker) = control.worker.take() else {
            return;
        };

        info!("[WORKER] Shutting down tuner worker...");
        worker.stop_flag.store(true, Ordering::Release);
        // The worker may already be gone if its input closed.
        let _ = worker.shutdown_tx.try_send(());
        control.pipeline = Self::join(worker.thread_handle);

        *self.status.lock() = TunerStatus::Idle;
        info!("[WORKER] Tuner stopped");
    }

    /// Joins a worker whose run already ended.
    fn reap(&self, control: &mut Control) {
        if let Some(worker) = control.worker.take() {
            debug!("[WORKER] Collecting finished worker");
            control.pipeline = Self::join(worker.thread_handle);
        }
    }

    fn join(handle: JoinHandle<TunerPipeline>) -> Option<TunerPipeline> {
        match handle.join() {
            Ok(pipeline) => Some(pipeline),
            Err(_) => {
                error!("[WORKER] Worker thread panicked");
                None
            }
        }
    }
}

impl Drop for Tuner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread needs, moved onto it at spawn.
struct WorkerContext {
    config: TunerConfig,
    provider: Arc<dyn InputProvider>,
    publisher: StatePublisher,
    status: Arc<Mutex<TunerStatus>>,
    stop_flag: Arc<AtomicBool>,
    shutdown_rx: Receiver<()>,
}

impl WorkerContext {
    fn run(self, mut pipeline: TunerPipeline, ready_tx: Sender<Result<()>>) -> TunerPipeline {
        debug!("[WORKER] Opening input...");
        let input = match self.open_input() {
            Ok(input) => input,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return pipeline;
            }
        };
        // Set before reporting ready so an input that closes at once still
        // leaves the tuner Idle.
        *self.status.lock() = TunerStatus::Running;
        if ready_tx.send(Ok(())).is_err() {
            *self.status.lock() = TunerStatus::Idle;
            return pipeline;
        }
        drop(ready_tx);

        info!("[WORKER] Entering processing loop ({} Hz)", input.sample_rate());
        let closed = self.process(&input, &mut pipeline);

        // Release the input before anyone is told the run is over.
        drop(input);
        pipeline.reset();
        self.publisher.publish(pipeline.silence());

        if closed {
            let mut status = self.status.lock();
            if *status == TunerStatus::Running {
                *status = TunerStatus::Idle;
            }
        }
        info!("[WORKER] Worker finished");
        pipeline
    }

    fn open_input(&self) -> Result<AudioInput> {
        let input = self.provider.open(&self.config)?;
        if input.sample_rate() != self.config.sample_rate {
            return Err(TunerError::InputUnavailable(format!(
                "input runs at {} Hz, expected {} Hz",
                input.sample_rate(),
                self.config.sample_rate
            )));
        }
        Ok(input)
    }

    /// Runs until shutdown or until the input closes. Returns `true` in the
    /// latter case.
    fn process(&self, input: &AudioInput, pipeline: &mut TunerPipeline) -> bool {
        let frames = input.frames();
        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                debug!("[WORKER] Stop flag set");
                return false;
            }
            crossbeam_channel::select! {
                recv(frames) -> msg => match msg {
                    Ok(Ok(samples)) => {
                        let frame = AudioFrame::new(samples, input.sample_rate());
                        let outcome = pipeline.process_frame(&frame, Instant::now());
                        if outcome == FrameOutcome::Skipped {
                            debug!("[WORKER] Empty read skipped");
                        }
                        if let Some(state) = outcome.state() {
                            self.publisher.publish(state.clone());
                        }
                    }
                    Ok(Err(e)) => warn!("[WORKER] Read failed, skipping: {e}"),
                    Err(_) => {
                        info!("[WORKER] Input closed");
                        return true;
                    }
                },
                recv(self.shutdown_rx) -> _ => {
                    info!("[WORKER] Received shutdown signal");
                    return false;
                },
            }
        }
    }
}
