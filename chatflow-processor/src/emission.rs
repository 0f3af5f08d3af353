//! Chunk emission strategies.
//!
//! A strategy decides when accumulated text is flushed to subscribers.
//! The processor consults it on every text content event; `true` flushes
//! the current segment. Pending text is always flushed at segment and
//! stream boundaries regardless of the strategy.

use std::time::{Duration, Instant};

/// Policy deciding when accumulated text is emitted.
pub trait EmitStrategy: Send {
    /// Called with the newly applied increment and the full accumulated
    /// segment; returns whether to flush now.
    fn should_emit(&mut self, delta: &str, accumulated: &str) -> bool;

    /// Reset internal pacing state at stream start.
    fn reset(&mut self) {}
}

/// Flush on every increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl EmitStrategy for Immediate {
    fn should_emit(&mut self, _delta: &str, _accumulated: &str) -> bool {
        true
    }
}

/// Flush at sentence boundaries, or after a bounded number of characters
/// so long clauses cannot starve the UI.
#[derive(Debug, Clone)]
pub struct SentenceBoundary {
    max_interval_chars: usize,
    since_last_emit: usize,
}

impl SentenceBoundary {
    /// Create a strategy that force-flushes after `max_interval_chars`
    /// characters without a boundary.
    #[must_use]
    pub fn new(max_interval_chars: usize) -> Self {
        Self {
            max_interval_chars,
            since_last_emit: 0,
        }
    }
}

impl Default for SentenceBoundary {
    fn default() -> Self {
        Self::new(80)
    }
}

impl EmitStrategy for SentenceBoundary {
    fn should_emit(&mut self, delta: &str, accumulated: &str) -> bool {
        self.since_last_emit += delta.chars().count();
        if ends_at_sentence_boundary(accumulated) || self.since_last_emit >= self.max_interval_chars
        {
            self.since_last_emit = 0;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.since_last_emit = 0;
    }
}

fn ends_at_sentence_boundary(accumulated: &str) -> bool {
    let mut chars = accumulated.chars().rev();
    let Some(last) = chars.next() else {
        return false;
    };
    if !last.is_whitespace() {
        return false;
    }
    chars
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| matches!(c, '.' | '!' | '?'))
}

/// Flush at most once per interval.
#[derive(Debug, Clone)]
pub struct Debounced {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl Debounced {
    /// Create a strategy with the given minimum interval between flushes.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }
}

impl EmitStrategy for Debounced {
    fn should_emit(&mut self, _delta: &str, _accumulated: &str) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    fn reset(&mut self) {
        self.last_emit = None;
    }
}
