//! Timed callbacks: the one primitive every other component depends on.
//!
//! [`TokioClock`] drives real sessions. [`ManualClock`] is a logical clock for
//! deterministic tests: nothing fires until the test advances it.

use crate::error::{CoachError, CoachResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Source of cancellable one-shot and repeating timers.
pub trait ClockSource: Send + Sync {
    /// Run `callback` every `period`, first after one full period.
    fn repeat(&self, period: Duration, callback: TimerCallback) -> CoachResult<TimerHandle>;

    /// Run `callback` once after `delay`.
    fn once(&self, delay: Duration, callback: TimerCallback) -> CoachResult<TimerHandle>;
}

/// Cancellable handle to a scheduled timer. Dropping the handle cancels it.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TimerHandle {
    fn new(id: u64, cancelled: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self { id, cancelled, task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the timer. A callback already running is not interrupted, but no
    /// new one starts after this returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Holds at most one timer of a kind and stamps each arming with an epoch.
///
/// Arming cancels whatever was there before. Events carry the epoch they were
/// armed with, so a late event from a cancelled timer can be recognized.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<TimerHandle>,
    epoch: u64,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer. `make` receives the new epoch.
    pub fn arm_once<F>(&mut self, clock: &dyn ClockSource, delay: Duration, make: F) -> CoachResult<u64>
    where
        F: FnOnce(u64) -> TimerCallback,
    {
        let epoch = self.next_epoch();
        let handle = clock.once(delay, make(epoch))?;
        debug!(timer = handle.id(), epoch, ?delay, "one-shot armed");
        self.handle = Some(handle);
        Ok(epoch)
    }

    /// Arm a repeating timer. `make` receives the new epoch.
    pub fn arm_repeating<F>(&mut self, clock: &dyn ClockSource, period: Duration, make: F) -> CoachResult<u64>
    where
        F: FnOnce(u64) -> TimerCallback,
    {
        let epoch = self.next_epoch();
        let handle = clock.repeat(period, make(epoch))?;
        debug!(timer = handle.id(), epoch, ?period, "repeating timer armed");
        self.handle = Some(handle);
        Ok(epoch)
    }

    /// Cancel the armed timer, if any. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True if `epoch` belongs to the timer armed right now.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.handle.is_some() && self.epoch == epoch
    }

    /// For one-shot timers: consume the slot if `epoch` is current.
    pub fn take_if_current(&mut self, epoch: u64) -> bool {
        if self.is_current(epoch) {
            self.handle = None;
            true
        } else {
            false
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.cancel();
        self.epoch += 1;
        self.epoch
    }
}

/// Clock backed by the tokio timer wheel.
#[derive(Debug, Clone)]
pub struct TokioClock {
    runtime: Handle,
    next_id: Arc<AtomicU64>,
}

impl TokioClock {
    /// Bind to the runtime this is called from.
    pub fn from_current() -> CoachResult<Self> {
        let runtime = Handle::try_current().map_err(|e| CoachError::Timer(e.to_string()))?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl ClockSource for TokioClock {
    fn repeat(&self, period: Duration, mut callback: TimerCallback) -> CoachResult<TimerHandle> {
        if period.is_zero() {
            return Err(CoachError::Timer("repeat period must be non-zero".to_string()));
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                callback();
            }
        });
        Ok(TimerHandle::new(self.next_id(), cancelled, Some(task.abort_handle())))
    }

    fn once(&self, delay: Duration, mut callback: TimerCallback) -> CoachResult<TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::Acquire) {
                callback();
            }
        });
        Ok(TimerHandle::new(self.next_id(), cancelled, Some(task.abort_handle())))
    }
}

struct ManualTimer {
    id: u64,
    deadline: Duration,
    period: Option<Duration>,
    cancelled: Arc<AtomicBool>,
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct ManualInner {
    now: Duration,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

/// Logical clock for tests. Time only moves when [`ManualClock::advance`] or
/// [`ManualClock::advance_with`] is called; due timers fire in deadline order.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualInner>>,
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of live (not cancelled) timers.
    pub fn pending(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Move time forward, firing every timer that falls due.
    pub fn advance(&self, by: Duration) {
        self.advance_with(by, || {});
    }

    /// Move time forward, calling `after_fire` after each timer callback so the
    /// caller can process whatever the callback queued before the next one fires.
    pub fn advance_with<F: FnMut()>(&self, by: Duration, mut after_fire: F) {
        let target = self.now() + by;
        while self.fire_next_due(target) {
            after_fire();
        }
        let mut inner = self.lock();
        if inner.now < target {
            inner.now = target;
        }
    }

    /// Fire the earliest live timer due at or before `until`. Returns false when none is due.
    pub fn fire_next_due(&self, until: Duration) -> bool {
        let (id, mut callback, cancelled) = {
            let mut inner = self.lock();
            inner.timers.retain(|t| !t.cancelled.load(Ordering::Acquire));
            let Some(index) = inner
                .timers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.deadline <= until)
                .min_by_key(|(_, t)| (t.deadline, t.id))
                .map(|(i, _)| i)
            else {
                return false;
            };
            let deadline = inner.timers[index].deadline;
            inner.now = deadline;
            let (id, callback, cancelled) = match inner.timers[index].period {
                Some(period) => {
                    let timer = &mut inner.timers[index];
                    timer.deadline = deadline + period;
                    (timer.id, timer.callback.take(), Arc::clone(&timer.cancelled))
                }
                None => {
                    let mut timer = inner.timers.swap_remove(index);
                    (timer.id, timer.callback.take(), Arc::clone(&timer.cancelled))
                }
            };
            (id, callback, cancelled)
        };

        if let Some(cb) = callback.as_mut() {
            if !cancelled.load(Ordering::Acquire) {
                cb();
            }
        }

        // Repeating timers get their callback back unless they were removed meanwhile.
        let mut inner = self.lock();
        if let Some(timer) = inner.timers.iter_mut().find(|t| t.id == id) {
            timer.callback = callback;
        }
        true
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let deadline = inner.now + delay;
        inner.timers.push(ManualTimer {
            id,
            deadline,
            period,
            cancelled: Arc::clone(&cancelled),
            callback: Some(callback),
        });
        debug!(id, ?deadline, repeating = period.is_some(), "manual timer scheduled");
        TimerHandle::new(id, cancelled, None)
    }
}

impl ClockSource for ManualClock {
    fn repeat(&self, period: Duration, callback: TimerCallback) -> CoachResult<TimerHandle> {
        if period.is_zero() {
            return Err(CoachError::Timer("repeat period must be non-zero".to_string()));
        }
        Ok(self.schedule(period, Some(period), callback))
    }

    fn once(&self, delay: Duration, callback: TimerCallback) -> CoachResult<TimerHandle> {
        Ok(self.schedule(delay, None, callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let cb: TimerCallback = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, cb)
    }

    #[test]
    fn manual_repeat_fires_each_period() {
        let clock = ManualClock::new();
        let (count, cb) = counter();
        let _handle = clock.repeat(Duration::from_millis(500), cb).unwrap();

        clock.advance(Duration::from_millis(499));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        clock.advance(Duration::from_millis(2000));
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn manual_once_fires_once() {
        let clock = ManualClock::new();
        let (count, cb) = counter();
        let _handle = clock.once(Duration::from_secs(10), cb).unwrap();
        clock.advance(Duration::from_secs(30));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn cancelled_and_dropped_handles_never_fire() {
        let clock = ManualClock::new();
        let (count, cb) = counter();
        let handle = clock.repeat(Duration::from_millis(100), cb).unwrap();
        clock.advance(Duration::from_millis(250));
        handle.cancel();
        clock.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let (count, cb) = counter();
        drop(clock.once(Duration::from_millis(100), cb).unwrap());
        clock.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let clock = ManualClock::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&order);
        let b = Arc::clone(&order);
        let _late = clock.once(Duration::from_millis(300), Box::new(move || a.lock().unwrap().push("late"))).unwrap();
        let _early = clock.once(Duration::from_millis(100), Box::new(move || b.lock().unwrap().push("early"))).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn slot_rearming_cancels_previous() {
        let clock = ManualClock::new();
        let mut slot = TimerSlot::new();
        let (first, cb1) = counter();
        let (second, cb2) = counter();
        let e1 = slot.arm_once(&clock, Duration::from_millis(100), |_| cb1).unwrap();
        let e2 = slot.arm_once(&clock, Duration::from_millis(100), |_| cb2).unwrap();
        assert_ne!(e1, e2);
        assert!(!slot.is_current(e1));
        assert!(slot.is_current(e2));
        clock.advance(Duration::from_millis(100));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(slot.take_if_current(e2));
        assert!(!slot.is_armed());
    }

    #[test]
    fn handles_get_distinct_ids() {
        let clock = ManualClock::new();
        let (_, cb1) = counter();
        let (_, cb2) = counter();
        let a = clock.once(Duration::from_millis(10), cb1).unwrap();
        let b = clock.repeat(Duration::from_millis(10), cb2).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(!a.is_cancelled());
    }

    #[test]
    fn zero_period_is_rejected() {
        let clock = ManualClock::new();
        let (_, cb) = counter();
        assert!(clock.repeat(Duration::ZERO, cb).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_repeat_ticks_until_cancelled() {
        let clock = TokioClock::from_current().unwrap();
        let (count, cb) = counter();
        let handle = clock.repeat(Duration::from_millis(500), cb).unwrap();

        tokio::time::sleep(Duration::from_millis(1_250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_once_respects_cancel() {
        let clock = TokioClock::from_current().unwrap();
        let (fired, cb) = counter();
        let _kept = clock.once(Duration::from_secs(10), cb).unwrap();
        let (skipped, cb) = counter();
        let dropped = clock.once(Duration::from_secs(10), cb).unwrap();
        drop(dropped);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(skipped.load(Ordering::SeqCst), 0);
    }
}
