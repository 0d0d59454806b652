// tuner-cli/src/main.rs

mod cli;
mod display;
mod input;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use log::{debug, info};
use tuner_core::{DeviationUnit, FrameFeed, InputProvider, Tuner, TunerConfig};

use crate::input::{ToneGenerator, WavClip};

/// How often the display loop checks whether the run has ended.
const POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let matches = cli::build().get_matches();

    // Initialize logging - respect RUST_LOG env var, fallback to verbose flag
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    } else {
        let log_level = if matches.get_flag("verbose") {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .init();
    }

    let config = build_config(&matches)?;

    if let Some(path) = matches.get_one::<PathBuf>("save-config") {
        config.save_to(path)?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    let duration = matches.get_one::<Duration>("duration").copied();

    let (provider, feeder) = open_input(&matches, &config, duration)?;
    let tuner = Tuner::new(config, provider).context("invalid configuration")?;
    tuner.start().context("failed to start the tuner")?;
    info!("[CLI] Tuner started");

    run_display(&tuner, duration, matches.get_flag("json"))?;

    tuner.stop();
    // Closes the feed so a blocked producer notices.
    drop(tuner);
    if let Some(handle) = feeder {
        let _ = handle.join();
    }
    info!("[CLI] Done");
    Ok(())
}

/// A preset (`guitar` unless named) or a config file, then individual
/// flags. `--preset` and `--config` are mutually exclusive.
fn build_config(matches: &ArgMatches) -> Result<TunerConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => TunerConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let preset = matches
                .get_one::<String>("preset")
                .map(String::as_str)
                .unwrap_or("guitar");
            TunerConfig::preset(preset).with_context(|| format!("unknown preset {preset:?}"))?
        }
    };

    if let Some(&reference) = matches.get_one::<f32>("reference") {
        config.reference_pitch_hz = reference;
    }
    if let Some(unit) = matches.get_one::<String>("unit") {
        config.deviation_unit = match unit.as_str() {
            "hz" => DeviationUnit::Hz,
            _ => DeviationUnit::Cents,
        };
    }

    config.validate()?;
    debug!("[CLI] Effective configuration: {config:?}");
    Ok(config)
}

type Feeder = Option<JoinHandle<()>>;

fn open_input(
    matches: &ArgMatches,
    config: &TunerConfig,
    duration: Option<Duration>,
) -> Result<(Arc<dyn InputProvider>, Feeder)> {
    if let Some(&freq) = matches.get_one::<f64>("tone") {
        let amplitude = matches.get_one::<f64>("amplitude").copied().unwrap_or(8000.0);
        let noise = matches.get_one::<f64>("noise").copied().unwrap_or(0.0);
        let (feed, sender) = FrameFeed::new(config.sample_rate, Some(4));
        let limit = duration.map(|d| {
            (d.as_secs_f64() * config.sample_rate as f64 / config.frame_length as f64).ceil() as usize
        });
        let generator = ToneGenerator::new(freq, amplitude, noise, config.sample_rate);
        let handle = input::spawn_tone(generator, config.frame_length, limit, sender)?;
        return Ok((Arc::new(feed), Some(handle)));
    }

    if let Some(path) = matches.get_one::<PathBuf>("wav") {
        let clip = WavClip::open(path)?;
        if clip.sample_rate != config.sample_rate {
            bail!(
                "{} is {} Hz but the tuner is configured for {} Hz (try --preset compact or a config file)",
                path.display(),
                clip.sample_rate,
                config.sample_rate
            );
        }
        let (feed, sender) = FrameFeed::new(config.sample_rate, Some(4));
        let handle = input::spawn_wav(clip, config.frame_length, sender)?;
        return Ok((Arc::new(feed), Some(handle)));
    }

    if matches.get_flag("mic") {
        return open_microphone();
    }

    bail!("no input given: use --tone, --wav or --mic")
}

#[cfg(feature = "mic")]
fn open_microphone() -> Result<(Arc<dyn InputProvider>, Feeder)> {
    Ok((Arc::new(tuner_core::audio::Microphone::new()), None))
}

#[cfg(not(feature = "mic"))]
fn open_microphone() -> Result<(Arc<dyn InputProvider>, Feeder)> {
    bail!("microphone input needs the `mic` feature")
}

/// Prints every published snapshot until the duration elapses or the input
/// ends.
fn run_display(tuner: &Tuner, duration: Option<Duration>, json: bool) -> Result<()> {
    let subscription = tuner.subscribe();
    let deadline = duration.and_then(|d| Instant::now().checked_add(d));
    let stdout = std::io::stdout();

    while tuner.is_running() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        let Some(state) = subscription.recv_timeout(POLL) else {
            continue;
        };
        let line = if json {
            display::json_line(&state)?
        } else {
            display::render(&state)
        };
        let mut out = stdout.lock();
        writeln!(out, "{line}")?;
        out.flush()?;
    }
    Ok(())
}
