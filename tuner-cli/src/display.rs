//! Terminal rendering of tuner snapshots.

use anyhow::Result;
use tuner_core::tuning::MAX_DEVIATION;
use tuner_core::{TunerState, TuningAccuracy};

/// Cells on each side of the centre mark.
const HALF_WIDTH: usize = 20;

/// A `[----|----]` bar with the needle placed by `deviation` (±50).
pub fn meter(deviation: f32) -> String {
    let clamped = deviation.clamp(-MAX_DEVIATION, MAX_DEVIATION);
    let offset = (clamped / MAX_DEVIATION * HALF_WIDTH as f32).round() as isize;
    let needle = (HALF_WIDTH as isize + offset) as usize;

    let mut bar = String::with_capacity(HALF_WIDTH * 2 + 3);
    bar.push('[');
    for cell in 0..=HALF_WIDTH * 2 {
        bar.push(if cell == needle {
            '^'
        } else if cell == HALF_WIDTH {
            '|'
        } else {
            '-'
        });
    }
    bar.push(']');
    bar
}

/// One human-readable line per snapshot.
pub fn render(state: &TunerState) -> String {
    if state.is_silent() {
        return format!("{:<4} {:>9}  {}", state.note, "-", meter(0.0));
    }
    let verdict = match state.accuracy() {
        Some(TuningAccuracy::InTune) => "in tune",
        Some(TuningAccuracy::Close) => "close",
        Some(TuningAccuracy::Off) if state.deviation < 0.0 => "flat",
        Some(TuningAccuracy::Off) => "sharp",
        None => "",
    };
    format!(
        "{:<4} {:>7.2}Hz  {}  {:+6.1}{} (ref {:.2}Hz) {}{}",
        state.note,
        state.frequency_hz,
        meter(state.deviation),
        state.deviation,
        state.unit.suffix(),
        state.reference_hz,
        verdict,
        if state.locked { " *" } else { "" },
    )
}

/// The snapshot as a single JSON line.
pub fn json_line(state: &TunerState) -> Result<String> {
    Ok(serde_json::to_string(state)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_core::DeviationUnit;

    fn state(deviation: f32, locked: bool) -> TunerState {
        TunerState {
            frequency_hz: 441.0,
            note: "A4".into(),
            deviation,
            reference_hz: 440.0,
            locked,
            unit: DeviationUnit::Cents,
        }
    }

    #[test]
    fn needle_positions() {
        let centred = meter(0.0);
        assert_eq!(centred.len(), 43);
        assert_eq!(centred.chars().nth(21), Some('^'));
        assert_eq!(meter(-50.0).chars().nth(1), Some('^'));
        assert_eq!(meter(50.0).chars().nth(41), Some('^'));
        assert_eq!(meter(120.0), meter(50.0));
        assert_eq!(meter(25.0).chars().nth(31), Some('^'));
        assert_eq!(meter(25.0).chars().nth(21), Some('|'));
    }

    #[test]
    fn locked_reading_is_marked() {
        let line = render(&state(3.9, true));
        assert!(line.starts_with("A4"));
        assert!(line.contains("441.00Hz"));
        assert!(line.contains("in tune"));
        assert!(line.ends_with('*'));
        assert!(!render(&state(3.9, false)).ends_with('*'));
    }

    #[test]
    fn silence_shows_placeholder() {
        let line = render(&TunerState::silence("--", DeviationUnit::Cents));
        assert!(line.starts_with("--"));
        assert!(!line.contains("Hz"));
    }

    #[test]
    fn json_round_trips() {
        let original = state(-12.5, false);
        let line = json_line(&original).expect("serialize");
        assert!(!line.contains('\n'));
        assert!(line.contains("\"unit\":\"cents\""));
        let parsed: TunerState = serde_json::from_str(&line).expect("parse");
        assert_eq!(parsed, original);
    }
}
