//! Build timing utilities.

use std::time::{Duration, Instant};

/// A simple timer for measuring build phase durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time elapsed since [`Timer::start`].
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Format a duration the way the build summary shows it: `2m 5s` once past
/// a minute, otherwise seconds with one decimal.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let whole = elapsed.as_secs();
    if whole >= 60 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{:.1}s", secs)
    }
}
