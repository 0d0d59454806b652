use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, ArgGroup, Command, arg, command, value_parser};

#[must_use]
pub fn build() -> Command {
    command!()
        .about("Autocorrelation string tuner")
        .long_about(
            "Runs the tuner on a synthetic tone, a WAV file or the microphone and prints \
             the detected note, frequency and deviation for every published reading.",
        )
        .arg(
            arg!(--tone <hz> "Tune a generated sine wave of this frequency")
                .required(false)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--amplitude <amp> "Peak amplitude of the generated tone [default: 8000]")
                .required(false)
                .value_parser(value_parser!(f64))
                .requires("tone"),
        )
        .arg(
            arg!(--noise <amp> "Peak amplitude of white noise mixed into the tone [default: 0]")
                .required(false)
                .value_parser(value_parser!(f64))
                .requires("tone"),
        )
        .arg(
            arg!(--wav <path> "Tune the first channel of a WAV file")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(--mic "Tune the default input device")
                .action(ArgAction::SetTrue),
        )
        .group(
            ArgGroup::new("input")
                .args(["tone", "wav", "mic"])
                .multiple(false),
        )
        .arg(
            arg!(-c --config <path> "Load settings from a JSON file")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-p --preset <name> "Start from a preset [default: guitar]")
                .required(false)
                .value_parser(["default", "guitar", "wide", "compact"])
                .conflicts_with("config"),
        )
        .arg(
            arg!(--reference <hz> "Frequency of A4")
                .required(false)
                .value_parser(value_parser!(f32)),
        )
        .arg(
            arg!(--unit <unit> "Unit of the deviation")
                .required(false)
                .value_parser(["cents", "hz"]),
        )
        .arg(
            arg!(--"save-config" <path> "Write the effective settings to a JSON file and exit")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(--json "Print one JSON snapshot per line")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(-d --duration <secs> "Stop after this many seconds")
                .required(false)
                .value_parser(parse_duration),
        )
        .arg(
            arg!(-v --verbose "Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{value} seconds: {e}"))
}
