//! Screen wake lock held for the lifetime of a coaching session.
//!
//! Acquisition failures are not fatal; the caller logs them and coaches on.
//! The guard releases on [`WakeLockGuard::release`] or when dropped, so every
//! exit path gives the lock back.

use crate::error::{Capability, CoachError, CoachResult};
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// A held wake lock.
pub struct WakeLockGuard {
    label: &'static str,
    release: Option<ReleaseFn>,
}

impl std::fmt::Debug for WakeLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeLockGuard")
            .field("label", &self.label)
            .field("held", &self.is_held())
            .finish()
    }
}

impl WakeLockGuard {
    pub fn new<F>(label: &'static str, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label,
            release: Some(Box::new(release)),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_held(&self) -> bool {
        self.release.is_some()
    }

    /// Give the lock back now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            info!(provider = self.label, "🔓 Wake lock released");
        }
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Platform wake-lock capability.
pub trait WakeLockProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn acquire(&self) -> CoachResult<WakeLockGuard>;
}

/// Pretends to hold a lock. For platforms where the screen never sleeps.
#[derive(Debug, Default)]
pub struct NoopWakeLock;

impl WakeLockProvider for NoopWakeLock {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn acquire(&self) -> CoachResult<WakeLockGuard> {
        debug!("noop wake lock acquired");
        Ok(WakeLockGuard::new("noop", || {}))
    }
}

/// Always fails: the platform has no wake lock.
#[derive(Debug, Default)]
pub struct UnsupportedWakeLock;

impl WakeLockProvider for UnsupportedWakeLock {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn acquire(&self) -> CoachResult<WakeLockGuard> {
        Err(CoachError::Unavailable(Capability::WakeLock))
    }
}

/// Holds an idle inhibitor via `systemd-inhibit` for as long as the guard lives.
#[derive(Debug, Clone)]
pub struct InhibitWakeLock {
    program: String,
    why: String,
}

impl Default for InhibitWakeLock {
    fn default() -> Self {
        Self {
            program: "systemd-inhibit".to_string(),
            why: "CPR coaching session in progress".to_string(),
        }
    }
}

impl InhibitWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different inhibitor binary (same argument convention).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .arg("--what=idle:sleep")
            .arg("--who=cpr-coach")
            .arg(format!("--why={}", self.why))
            .arg("--mode=block")
            .args(["sleep", "infinity"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

impl WakeLockProvider for InhibitWakeLock {
    fn name(&self) -> &'static str {
        "systemd-inhibit"
    }

    fn acquire(&self) -> CoachResult<WakeLockGuard> {
        let mut child = self
            .spawn()
            .map_err(|e| CoachError::WakeLock(format!("{}: {}", self.program, e)))?;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(CoachError::WakeLock(format!("{} exited early: {}", self.program, status)));
        }
        info!(pid = child.id(), "🔒 Wake lock acquired (systemd-inhibit)");
        Ok(WakeLockGuard::new("systemd-inhibit", move || {
            if let Err(e) = child.kill() {
                warn!("wake lock inhibitor kill failed: {}", e);
            }
            let _ = child.wait();
        }))
    }
}
