use std::f64::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tuner_core::pipeline::FrameOutcome;
use tuner_core::{
    AudioFrame, AudioInput, FrameFeed, FrameSender, InputProvider, SourceError, Tuner, TunerConfig,
    TunerError, TunerPipeline, TunerState, TunerStatus,
};

const RATE: u32 = 44_100;
const FRAME: usize = 2048;
const WAIT: Duration = Duration::from_secs(10);

fn sine(freq: f64, amplitude: f64) -> Vec<i16> {
    (0..FRAME)
        .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / RATE as f64).sin()) as i16)
        .collect()
}

fn room_noise() -> Vec<i16> {
    vec![100; FRAME]
}

fn calibrate(sender: &FrameSender, frames: usize) {
    for _ in 0..frames {
        sender.send(room_noise()).expect("feed open");
    }
}

fn channel_tuner(config: TunerConfig) -> (Tuner, FrameSender) {
    let (feed, sender) = FrameFeed::new(config.sample_rate, None);
    let tuner = Tuner::new(config, Arc::new(feed)).expect("valid config");
    (tuner, sender)
}

/// Waits for a published snapshot matching `pred`.
fn wait_for(tuner: &Tuner, pred: impl Fn(&TunerState) -> bool) -> Arc<TunerState> {
    let subscription = tuner.subscribe();
    let deadline = Instant::now() + WAIT;
    loop {
        let latest = tuner.state();
        if pred(&latest) {
            return latest;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(!remaining.is_zero(), "timed out, last state {latest:?}");
        subscription.recv_timeout(remaining.min(Duration::from_millis(50)));
    }
}

fn wait_until_stopped(tuner: &Tuner) {
    let deadline = Instant::now() + WAIT;
    while tuner.is_running() {
        assert!(Instant::now() < deadline, "tuner never stopped");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn a440_locks_after_calibration() {
    let (tuner, sender) = channel_tuner(TunerConfig::default());
    tuner.start().expect("start");
    assert_eq!(tuner.status(), TunerStatus::Running);

    calibrate(&sender, 20);
    for _ in 0..30 {
        sender.send(sine(440.0, 8000.0)).expect("feed open");
    }

    let state = wait_for(&tuner, |s| s.locked);
    assert_eq!(state.note, "A4");
    assert!((state.frequency_hz - 440.0).abs() <= 1.0);
    assert_eq!(state.reference_hz, 440.0);
    assert!(state.deviation.abs() < 5.0);

    tuner.stop();
}

#[test]
fn silence_after_calibration_publishes_placeholder() {
    let (tuner, sender) = channel_tuner(TunerConfig::default());
    tuner.start().expect("start");

    calibrate(&sender, 20);
    for _ in 0..10 {
        sender.send(sine(440.0, 8000.0)).expect("feed open");
    }
    wait_for(&tuner, |s| s.locked);

    sender.send(vec![0; FRAME]).expect("feed open");
    let state = wait_for(&tuner, |s| s.is_silent());
    assert_eq!(state.note, "--");
    assert_eq!(state.deviation, 0.0);
    assert!(!state.locked);
}

#[test]
fn constant_noise_sets_exact_floor() {
    let mut pipeline = TunerPipeline::new(TunerConfig::default()).expect("valid");
    let now = Instant::now();
    let frame = AudioFrame::new(room_noise(), RATE);
    for _ in 0..19 {
        assert!(matches!(
            pipeline.process_frame(&frame, now),
            FrameOutcome::Calibrating { .. }
        ));
    }
    assert_eq!(
        pipeline.process_frame(&frame, now),
        FrameOutcome::Calibrated { floor: 100.0 }
    );
    assert_eq!(pipeline.calibrator().floor(), Some(100.0));
}

#[test]
fn one_a440_frame_after_calibration_names_a4() {
    let mut pipeline = TunerPipeline::new(TunerConfig::default()).expect("valid");
    let now = Instant::now();
    let noise = AudioFrame::new(room_noise(), RATE);
    for _ in 0..20 {
        pipeline.process_frame(&noise, now);
    }

    let state = pipeline
        .process_frame(&AudioFrame::new(sine(440.0, 8000.0), RATE), now)
        .state()
        .cloned()
        .expect("tracked");
    assert_eq!(state.note, "A4");
    assert!(state.locked);
    assert!((state.frequency_hz - 440.0).abs() <= 1.0);
}

#[test]
fn held_note_survives_a_short_change_then_drops() {
    let mut pipeline = TunerPipeline::new(TunerConfig::default()).expect("valid");
    let start = Instant::now();
    let noise = AudioFrame::new(room_noise(), RATE);
    for _ in 0..20 {
        pipeline.process_frame(&noise, start);
    }

    let a4 = AudioFrame::new(sine(440.0, 8000.0), RATE);
    let mut last = None;
    for _ in 0..5 {
        last = pipeline.process_frame(&a4, start).state().cloned();
    }
    assert_eq!(last.map(|s| s.note), Some("A4".to_string()));

    let c5 = AudioFrame::new(sine(523.25, 8000.0), RATE);
    let held = pipeline
        .process_frame(&c5, start + Duration::from_millis(300))
        .state()
        .cloned()
        .expect("tracked");
    assert_eq!(held.note, "A4");
    assert!(!held.locked);
    assert!((held.frequency_hz - 523.25).abs() < 5.0);

    let dropped = pipeline
        .process_frame(&c5, start + Duration::from_millis(800))
        .state()
        .cloned()
        .expect("tracked");
    assert_eq!(dropped.note, "--");
    assert!(!dropped.locked);
}

#[test]
fn stop_releases_input_and_publishes_silence() {
    let (tuner, sender) = channel_tuner(TunerConfig {
        calibration_frames: 0,
        require_full_history: true,
        ..TunerConfig::default()
    });
    tuner.start().expect("start");
    for _ in 0..5 {
        sender.send(sine(440.0, 8000.0)).expect("feed open");
    }
    wait_for(&tuner, |s| s.locked);

    tuner.stop();
    assert_eq!(tuner.status(), TunerStatus::Idle);
    assert!(tuner.state().is_silent());

    // The feed outlives the run and is picked up by the next one.
    sender.send(sine(440.0, 8000.0)).expect("feed open");
    tuner.start().expect("restart");
    let state = wait_for(&tuner, |s| !s.is_silent());
    assert!(!state.locked, "history must start empty after a restart");
    tuner.stop();
}

#[test]
fn start_and_stop_are_idempotent() {
    let (tuner, _sender) = channel_tuner(TunerConfig::default());
    tuner.stop();
    assert_eq!(tuner.status(), TunerStatus::Idle);

    tuner.start().expect("start");
    tuner.start().expect("second start is a no-op");
    assert!(tuner.is_running());

    tuner.stop();
    tuner.stop();
    assert!(!tuner.is_running());
}

struct BrokenDevice;

impl InputProvider for BrokenDevice {
    fn open(&self, _config: &TunerConfig) -> Result<AudioInput, TunerError> {
        Err(TunerError::InputUnavailable("permission denied".into()))
    }
}

#[test]
fn unavailable_input_fails_start() {
    let tuner = Tuner::new(TunerConfig::default(), Arc::new(BrokenDevice)).expect("valid");
    let err = tuner.start().unwrap_err();
    assert!(matches!(err, TunerError::InputUnavailable(_)));
    assert_eq!(tuner.status(), TunerStatus::Idle);

    // Still usable afterwards.
    assert!(tuner.start().is_err());
    tuner.stop();
}

#[test]
fn sample_rate_mismatch_fails_start() {
    let (feed, _sender) = FrameFeed::new(22_050, None);
    let tuner = Tuner::new(TunerConfig::default(), Arc::new(feed)).expect("valid");
    assert!(matches!(tuner.start(), Err(TunerError::InputUnavailable(_))));
    assert!(!tuner.is_running());
}

#[test]
fn closed_source_ends_the_run() {
    let (tuner, sender) = channel_tuner(TunerConfig::default());
    tuner.start().expect("start");
    drop(sender);
    wait_until_stopped(&tuner);
    assert_eq!(tuner.status(), TunerStatus::Idle);
    assert!(tuner.state().is_silent());
    tuner.stop();
}

#[test]
fn read_errors_and_empty_reads_are_skipped() {
    let (tuner, sender) = channel_tuner(TunerConfig {
        calibration_frames: 0,
        ..TunerConfig::default()
    });
    tuner.start().expect("start");

    sender.send_error(SourceError::Overrun(512)).expect("feed open");
    sender.send(Vec::new()).expect("feed open");
    sender.send_error(SourceError::Stream("device hiccup".into())).expect("feed open");
    for _ in 0..5 {
        sender.send(sine(440.0, 8000.0)).expect("feed open");
    }

    let state = wait_for(&tuner, |s| s.locked);
    assert_eq!(state.note, "A4");
    assert!(tuner.is_running());
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let (feed, _sender) = FrameFeed::new(RATE, None);
    let config = TunerConfig {
        history_size: 0,
        ..TunerConfig::default()
    };
    assert!(matches!(
        Tuner::new(config, Arc::new(feed)),
        Err(TunerError::InvalidConfig(_))
    ));
}

#[test]
fn dropping_a_running_tuner_stops_it() {
    let (tuner, sender) = channel_tuner(TunerConfig::default());
    tuner.start().expect("start");
    drop(tuner);
    // Both the feed and the worker's input are gone.
    assert!(sender.send(room_noise()).is_err());
}
