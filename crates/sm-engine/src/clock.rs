//! Elapsed-time tracking for a single source.

use std::time::Duration;

/// Playback clock advanced by the controller tick, never by the audio thread.
///
/// Elapsed time only moves while the clock is running. Pausing freezes it,
/// resetting zeroes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackClock {
    running: bool,
    elapsed: Duration,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start, or resume from the frozen value.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop without losing the elapsed time.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Stop and zero.
    pub fn reset(&mut self) {
        self.running = false;
        self.elapsed = Duration::ZERO;
    }

    /// Zero and keep running.
    pub fn restart(&mut self) {
        self.elapsed = Duration::ZERO;
        self.running = true;
    }

    pub fn advance(&mut self, dt: Duration) {
        if self.running {
            self.elapsed = self.elapsed.saturating_add(dt);
        }
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
