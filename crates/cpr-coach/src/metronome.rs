//! Fixed-cadence metronome that drives compression counting.

use crate::clock::{ClockSource, TimerCallback, TimerSlot};
use crate::error::{CoachError, CoachResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default cadence, compressions per minute.
pub const DEFAULT_CADENCE_PER_MINUTE: u32 = 120;

/// Fastest cadence that still gives a whole-millisecond interval.
pub const MAX_CADENCE_PER_MINUTE: u32 = 60_000;

/// Interval between ticks for a cadence in events per minute.
pub fn interval_for_cadence(per_minute: u32) -> CoachResult<Duration> {
    if per_minute == 0 {
        return Err(CoachError::Config("metronome cadence must be at least 1 per minute".to_string()));
    }
    if per_minute > MAX_CADENCE_PER_MINUTE {
        return Err(CoachError::Config(format!(
            "metronome cadence {} exceeds {} per minute",
            per_minute, MAX_CADENCE_PER_MINUTE
        )));
    }
    Ok(Duration::from_millis(60_000 / u64::from(per_minute)))
}

/// Repeating tick source. Holds at most one live timer.
///
/// Every run is tagged with an epoch passed to the tick callback; after `stop`
/// or a restart, [`Metronome::is_current`] is false for ticks of the old run,
/// so a tick that was already queued can be dropped by the receiver.
pub struct Metronome {
    clock: Arc<dyn ClockSource>,
    interval: Duration,
    slot: TimerSlot,
}

impl Metronome {
    pub fn new(clock: Arc<dyn ClockSource>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            slot: TimerSlot::new(),
        }
    }

    pub fn with_cadence(clock: Arc<dyn ClockSource>, per_minute: u32) -> CoachResult<Self> {
        Ok(Self::new(clock, interval_for_cadence(per_minute)?))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking, replacing any run in progress. Returns the run's epoch.
    pub fn start<F>(&mut self, mut on_tick: F) -> CoachResult<u64>
    where
        F: FnMut(u64) + Send + 'static,
    {
        if self.slot.is_armed() {
            debug!(epoch = self.slot.epoch(), "metronome restarted while running");
        }
        let epoch = self
            .slot
            .arm_repeating(self.clock.as_ref(), self.interval, |epoch| -> TimerCallback {
                Box::new(move || on_tick(epoch))
            })?;
        info!(epoch, interval_ms = self.interval.as_millis() as u64, "🥁 Metronome started");
        Ok(epoch)
    }

    /// Stop ticking. Returns whether it was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.slot.cancel();
        if was_running {
            info!(epoch = self.slot.epoch(), "🥁 Metronome stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_armed()
    }

    /// True if a tick tagged `epoch` belongs to the run in progress.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.slot.is_current(epoch)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.slot.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl FnMut(u64) + Send + 'static) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        (ticks, move |epoch| sink.lock().unwrap().push(epoch))
    }

    #[test]
    fn default_cadence_is_500ms() {
        assert_eq!(interval_for_cadence(DEFAULT_CADENCE_PER_MINUTE).unwrap(), Duration::from_millis(500));
        assert!(interval_for_cadence(0).is_err());
    }

    #[test]
    fn cadence_too_fast_for_a_millisecond_is_rejected() {
        assert_eq!(interval_for_cadence(MAX_CADENCE_PER_MINUTE).unwrap(), Duration::from_millis(1));
        assert!(interval_for_cadence(MAX_CADENCE_PER_MINUTE + 1).is_err());
        assert!(interval_for_cadence(100_000).is_err());
    }

    #[test]
    fn ticks_at_cadence_until_stopped() {
        let clock = ManualClock::new();
        let mut metronome = Metronome::with_cadence(Arc::new(clock.clone()), 120).unwrap();
        let (ticks, on_tick) = recorder();
        let epoch = metronome.start(on_tick).unwrap();

        clock.advance(Duration::from_millis(2_000));
        assert_eq!(ticks.lock().unwrap().len(), 4);
        assert!(metronome.stop());
        assert!(!metronome.is_current(epoch));

        clock.advance(Duration::from_secs(5));
        assert_eq!(ticks.lock().unwrap().len(), 4);
        assert!(!metronome.stop());
    }

    #[test]
    fn restart_replaces_previous_run() {
        let clock = ManualClock::new();
        let mut metronome = Metronome::with_cadence(Arc::new(clock.clone()), 120).unwrap();
        let (ticks, first) = recorder();
        let sink = Arc::clone(&ticks);
        let old = metronome.start(first).unwrap();
        let new = metronome.start(move |epoch| sink.lock().unwrap().push(epoch)).unwrap();

        clock.advance(Duration::from_millis(1_000));
        assert_eq!(clock.pending(), 1);
        assert_eq!(*ticks.lock().unwrap(), vec![new, new]);
        assert!(!metronome.is_current(old));
        assert!(metronome.is_current(new));
    }
}
