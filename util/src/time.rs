//! General time utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A resettable stopwatch measuring elapsed seconds.
///
/// The stopwatch accumulates time only while running, `elapsed_s` can be
/// read at any point.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    /// Instant the current run started, `None` while stopped
    run_start: Option<Instant>,

    /// Time accumulated by previous runs
    accumulated: Duration,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Stopwatch {
    /// Create a new stopped stopwatch reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or resume) the stopwatch. Has no effect if already running.
    pub fn start(&mut self) {
        if self.run_start.is_none() {
            self.run_start = Some(Instant::now());
        }
    }

    /// Stop the stopwatch, keeping the elapsed time.
    pub fn stop(&mut self) {
        if let Some(t0) = self.run_start.take() {
            self.accumulated += t0.elapsed();
        }
    }

    /// Stop the stopwatch and set it back to zero.
    pub fn reset(&mut self) {
        self.run_start = None;
        self.accumulated = Duration::default();
    }

    pub fn is_running(&self) -> bool {
        self.run_start.is_some()
    }

    /// Get the number of seconds the stopwatch has been running for.
    pub fn elapsed_s(&self) -> f64 {
        let current = match self.run_start {
            Some(t0) => t0.elapsed(),
            None => Duration::default(),
        };

        (self.accumulated + current).as_secs_f64()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a period in milliseconds into a `Duration`.
pub fn millis(period_ms: f64) -> Duration {
    Duration::from_secs_f64(period_ms.max(0.0) / 1000.0)
}
