//! Audible metronome click, one per counted compression.

use std::io::Write;
use std::time::Duration;
use tracing::trace;

/// Tone parameters for the click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickSettings {
    pub frequency_hz: f32,
    pub duration: Duration,
    pub gain: f32,
}

impl Default for ClickSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 800.0,
            duration: Duration::from_millis(100),
            gain: 0.3,
        }
    }
}

/// Plays the click. `count` is the compression just counted (the cycle's last
/// one is reported as `compressions_per_cycle`).
pub trait ClickSink: Send {
    fn click(&mut self, count: u32);
}

/// No click at all.
#[derive(Debug, Default)]
pub struct SilentClick;

impl ClickSink for SilentClick {
    fn click(&mut self, count: u32) {
        trace!(count, "click");
    }
}

/// Prints the running count on one terminal line.
#[derive(Debug, Default)]
pub struct PrintClick;

impl ClickSink for PrintClick {
    fn click(&mut self, count: u32) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r💓 {count:>2}  ");
        let _ = out.flush();
    }
}
