//! # Musical Tuning Module
//!
//! Equal-temperament reference tables and nearest-note mapping.
//!
//! ## Features
//! - Reference table for any octave range and any A4 pitch
//! - Nearest note by cents distance (binary search over the sorted table)
//! - Deviation in cents or Hz, clamped to ±50
//! - Note name ↔ frequency conversions (sharps and flats)
//! - In-tune classification for meters

use std::ops::RangeInclusive;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::DeviationUnit;

/// Chromatic note names, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// MIDI number of A4.
const A4_MIDI: i32 = 69;

/// Octaves a reference table may span.
pub const OCTAVE_RANGE: RangeInclusive<i32> = -1..=10;

/// Published deviations never exceed this magnitude.
pub const MAX_DEVIATION: f32 = 50.0;

/// Standard 440 Hz table covering octaves 0 to 8, used by the name lookup
/// helpers.
static STANDARD_TABLE: Lazy<ReferenceTable> = Lazy::new(|| ReferenceTable::new(0, 8, 440.0));

/// A single note of the reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Note name (e.g. "A4", "C#3").
    pub name: String,
    /// Frequency in Hz.
    pub frequency: f32,
}

/// Immutable, strictly increasing set of reference notes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    entries: Vec<ReferenceEntry>,
}

/// Result of mapping a frequency onto the reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteMatch {
    /// Name of the nearest note.
    pub name: String,
    /// Frequency of the nearest note in Hz.
    pub reference: f32,
    /// Clamped deviation in the requested unit.
    pub deviation: f32,
    /// Unclamped deviation in cents.
    pub cents: f32,
}

impl ReferenceTable {
    /// Builds the 12-TET table for octaves `min_octave..=max_octave`.
    ///
    /// `midi = (octave + 1) * 12 + chromatic_index` and
    /// `f = a4 * 2^((midi - 69) / 12)`.
    pub fn new(min_octave: i32, max_octave: i32, a4: f32) -> Self {
        let mut entries = Vec::new();
        for octave in min_octave..=max_octave {
            for (index, name) in NOTE_NAMES.iter().enumerate() {
                let midi = (octave + 1) * 12 + index as i32;
                entries.push(ReferenceEntry {
                    name: format!("{name}{octave}"),
                    frequency: midi_to_frequency(midi, a4),
                });
            }
        }
        Self { entries }
    }

    /// The 440 Hz table spanning octaves 0 to 8.
    pub fn standard() -> &'static ReferenceTable {
        &STANDARD_TABLE
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every frequency is finite and positive, and each is above the one
    /// before it.
    pub fn is_strictly_increasing(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.frequency.is_finite() && entry.frequency > 0.0)
            && self
                .entries
                .windows(2)
                .all(|pair| pair[0].frequency < pair[1].frequency)
    }

    /// Entry by exact name.
    pub fn get(&self, name: &str) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Finds the entry closest to `freq` in cents.
    ///
    /// Because cents distance is monotonic in frequency, only the two
    /// neighbours of the insertion point can be nearest. On an exact tie the
    /// lower note wins.
    pub fn nearest(&self, freq: f32) -> Option<&ReferenceEntry> {
        if self.entries.is_empty() || !(freq.is_finite() && freq > 0.0) {
            return None;
        }
        let upper = self.entries.partition_point(|entry| entry.frequency < freq);
        if upper == 0 {
            return self.entries.first();
        }
        if upper == self.entries.len() {
            return self.entries.last();
        }
        let below = &self.entries[upper - 1];
        let above = &self.entries[upper];
        if cents_between(freq, below.frequency).abs() <= cents_between(freq, above.frequency).abs() {
            Some(below)
        } else {
            Some(above)
        }
    }

    /// Maps `freq` to its nearest note and computes the deviation.
    pub fn map(&self, freq: f32, unit: DeviationUnit) -> Option<NoteMatch> {
        let entry = self.nearest(freq)?;
        let cents = cents_between(freq, entry.frequency);
        let raw = match unit {
            DeviationUnit::Cents => cents,
            DeviationUnit::Hz => freq - entry.frequency,
        };
        Some(NoteMatch {
            name: entry.name.clone(),
            reference: entry.frequency,
            deviation: raw.clamp(-MAX_DEVIATION, MAX_DEVIATION),
            cents,
        })
    }
}

/// Frequency of a MIDI note number for the given A4.
pub fn midi_to_frequency(midi: i32, a4: f32) -> f32 {
    (a4 as f64 * 2.0_f64.powf((midi - A4_MIDI) as f64 / 12.0)) as f32
}

/// Signed distance from `target` to `freq` in cents (positive = sharp).
pub fn cents_between(freq: f32, target: f32) -> f32 {
    1200.0 * (freq / target).log2()
}

/// Parses a note name such as "A4", "C#3", "Bb2" or "E-1" into a MIDI
/// number.
pub fn parse_note_name(name: &str) -> Option<i32> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };
    let octave: i32 = octave.parse().ok()?;
    Some((octave + 1) * 12 + base + accidental)
}

/// Frequency of a named note for the given A4.
pub fn note_frequency(name: &str, a4: f32) -> Option<f32> {
    parse_note_name(name).map(|midi| midi_to_frequency(midi, a4))
}

/// Coarse tuning verdict for meters and indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuningAccuracy {
    /// Within 5 cents.
    InTune,
    /// Within 10 cents.
    Close,
    /// Further than 10 cents.
    Off,
}

impl TuningAccuracy {
    pub fn from_cents(cents: f32) -> Self {
        let cents = cents.abs();
        if cents <= 5.0 {
            TuningAccuracy::InTune
        } else if cents <= 10.0 {
            TuningAccuracy::Close
        } else {
            TuningAccuracy::Off
        }
    }
}
