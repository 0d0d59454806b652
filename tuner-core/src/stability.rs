//! # Stability and Hold Filter
//!
//! Decides when an estimate is steady enough to name a note, and keeps the
//! last named note on screen through short attack transients and bends.
//!
//! Time is passed in by the caller so the filter is deterministic under
//! test.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bounded FIFO of recent frequency estimates.
#[derive(Debug, Clone)]
pub struct FrequencyHistory {
    capacity: usize,
    values: VecDeque<f32>,
}

impl FrequencyHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `freq`, evicting the oldest value beyond capacity.
    pub fn push(&mut self, freq: f32) {
        self.values.push_back(freq);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `max - min` of the stored values, `None` when empty.
    pub fn spread(&self) -> Option<f32> {
        let first = *self.values.front()?;
        let (min, max) = self
            .values
            .iter()
            .fold((first, first), |(min, max), &v| (min.min(v), max.max(v)));
        Some(max - min)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// What the display should show for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteDisplay {
    /// The estimate is stable; show the freshly mapped note.
    Locked,
    /// Unstable, but still inside the hold window; keep showing this note.
    Held(String),
    /// No note to show.
    Placeholder,
}

/// Sliding-window lock with hold-time hysteresis.
#[derive(Debug, Clone)]
pub struct StabilityFilter {
    history: FrequencyHistory,
    threshold_hz: f32,
    hold_time: Duration,
    require_full: bool,
    last_stable: Option<Instant>,
    last_note: Option<String>,
}

impl StabilityFilter {
    pub fn new(capacity: usize, threshold_hz: f32, hold_time: Duration) -> Self {
        Self {
            history: FrequencyHistory::new(capacity),
            threshold_hz,
            hold_time,
            require_full: false,
            last_stable: None,
            last_note: None,
        }
    }

    /// Only lock once the window holds `capacity` estimates.
    pub fn requiring_full_history(mut self, require_full: bool) -> Self {
        self.require_full = require_full;
        self
    }

    /// Stable when the spread of the window is within the threshold. A
    /// single estimate has zero spread.
    pub fn is_stable(&self) -> bool {
        if self.require_full && !self.history.is_full() {
            return false;
        }
        self.history
            .spread()
            .is_some_and(|spread| spread <= self.threshold_hz)
    }

    /// Records an estimate and its mapped note, and decides what to show.
    pub fn update(&mut self, freq: f32, note: &str, now: Instant) -> NoteDisplay {
        self.history.push(freq);

        if self.is_stable() {
            self.last_stable = Some(now);
            self.last_note = Some(note.to_string());
            return NoteDisplay::Locked;
        }

        match (&self.last_stable, &self.last_note) {
            (Some(since), Some(note)) if now.saturating_duration_since(*since) <= self.hold_time => {
                NoteDisplay::Held(note.clone())
            }
            _ => NoteDisplay::Placeholder,
        }
    }

    /// Drops the frequency history but keeps the hold state.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Forgets everything.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_stable = None;
        self.last_note = None;
    }

    pub fn history(&self) -> &FrequencyHistory {
        &self.history
    }
}
