//! **VoiceCommandSource**: keeps a recognition session alive while listening
//! and turns final transcripts into intents.
//!
//! Restart policy:
//! - session ends on its own → restart after `restart_delay`
//! - transient error or failed start → restart after `restart_delay`, counted
//! - a session that starts cleanly clears the count
//! - `max_consecutive_failures` counted failures in a row → give up, listening off
//! - explicit cancel (`Aborted`) → no restart, listening off
//! - no capability or permission refused → report unavailable once, never start
//!
//! Restarts are scheduled on the [`ClockSource`] and come back through the
//! orchestrator's event channel as [`CoachEvent::RecognitionRestart`], so the
//! source never loops on itself.

use crate::clock::{ClockSource, TimerCallback, TimerSlot};
use crate::events::CoachEvent;
use crate::intent::{normalize_transcript, VoiceIntent};
use crate::recognition::{FailureDisposition, RecognitionEvent, RecognitionSink, SpeechRecognizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Fixed-delay, bounded restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub restart_delay: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(1000),
            max_consecutive_failures: 5,
        }
    }
}

/// What the orchestrator needs to act on after the source handled something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceOutcome {
    Idle,
    Intent(VoiceIntent),
    /// Recognition cannot work here. Reported once per source.
    Unavailable,
    /// Too many failures in a row; listening was switched off.
    GaveUp { failures: u32 },
    /// The session was cancelled outside our control; listening was switched off.
    Cancelled,
}

/// Where the source stands right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    Off,
    Listening,
    Restarting,
    Unavailable,
    GaveUp,
}

pub struct VoiceCommandSource {
    recognizer: Box<dyn SpeechRecognizer>,
    events: mpsc::UnboundedSender<CoachEvent>,
    clock: Arc<dyn ClockSource>,
    policy: RetryPolicy,
    listening: bool,
    session: u64,
    session_active: bool,
    restart: TimerSlot,
    failures: u32,
    unavailable: bool,
    unavailable_reported: bool,
    status: VoiceStatus,
}

impl VoiceCommandSource {
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        events: mpsc::UnboundedSender<CoachEvent>,
        clock: Arc<dyn ClockSource>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            recognizer,
            events,
            clock,
            policy,
            listening: false,
            session: 0,
            session_active: false,
            restart: TimerSlot::new(),
            failures: 0,
            unavailable: false,
            unavailable_reported: false,
            status: VoiceStatus::Off,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn status(&self) -> VoiceStatus {
        self.status
    }

    /// Id of the most recent session (0 before the first one).
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Arm (`true`) or disarm (`false`) listening.
    pub fn set_listening(&mut self, listening: bool) -> VoiceOutcome {
        if !listening {
            self.shutdown();
            return VoiceOutcome::Idle;
        }
        if self.unavailable || !self.recognizer.is_available() {
            return self.mark_unavailable();
        }
        if self.listening && (self.session_active || self.restart.is_armed()) {
            return VoiceOutcome::Idle;
        }
        info!("🎙️ Voice commands armed");
        self.listening = true;
        self.failures = 0;
        self.start_session()
    }

    /// Stop the session and suppress restarts.
    pub fn shutdown(&mut self) {
        self.restart.cancel();
        if self.session_active {
            self.recognizer.stop();
            self.session_active = false;
        }
        if self.listening {
            info!("🎙️ Voice commands off");
        }
        self.listening = false;
        if self.status != VoiceStatus::Unavailable && self.status != VoiceStatus::GaveUp {
            self.status = VoiceStatus::Off;
        }
    }

    /// Handle an event from a recognizer session.
    pub fn handle_recognition(&mut self, session: u64, event: RecognitionEvent) -> VoiceOutcome {
        if session != self.session || !self.session_active {
            debug!(session, current = self.session, "recognition event from stale session");
            return VoiceOutcome::Idle;
        }
        match event {
            RecognitionEvent::Transcript { is_final: false, .. } => VoiceOutcome::Idle,
            RecognitionEvent::Transcript { text, is_final: true } => {
                self.failures = 0;
                let transcript = normalize_transcript(&text);
                let intent = VoiceIntent::from_transcript(&transcript);
                if intent.is_recognized() {
                    info!(transcript = %transcript, intent = intent.label(), "🗣️ Voice command");
                    VoiceOutcome::Intent(intent)
                } else {
                    debug!(transcript = %transcript, "unrecognized transcript discarded");
                    VoiceOutcome::Idle
                }
            }
            RecognitionEvent::Ended => {
                self.session_active = false;
                if self.listening {
                    debug!(session, "recognition session ended, restarting");
                    self.schedule_restart()
                } else {
                    VoiceOutcome::Idle
                }
            }
            RecognitionEvent::Error(failure) => {
                self.session_active = false;
                match failure.disposition() {
                    FailureDisposition::Cancelled => {
                        info!(session, "recognition cancelled");
                        self.shutdown();
                        VoiceOutcome::Cancelled
                    }
                    FailureDisposition::Unavailable => {
                        warn!(session, ?failure, "recognition refused");
                        self.mark_unavailable()
                    }
                    FailureDisposition::Transient => {
                        warn!(session, ?failure, "recognition error");
                        if self.listening {
                            self.record_failure()
                        } else {
                            VoiceOutcome::Idle
                        }
                    }
                }
            }
        }
    }

    /// Handle a restart timer firing.
    pub fn handle_restart(&mut self, epoch: u64) -> VoiceOutcome {
        if !self.restart.take_if_current(epoch) {
            debug!(epoch, "stale recognition restart");
            return VoiceOutcome::Idle;
        }
        if !self.listening || self.session_active {
            return VoiceOutcome::Idle;
        }
        self.start_session()
    }

    fn start_session(&mut self) -> VoiceOutcome {
        self.session += 1;
        let sink = RecognitionSink::new(self.session, self.events.clone());
        match self.recognizer.start(sink) {
            Ok(()) => {
                debug!(session = self.session, "recognition session started");
                self.session_active = true;
                self.failures = 0;
                self.status = VoiceStatus::Listening;
                VoiceOutcome::Idle
            }
            Err(e) => {
                warn!(session = self.session, "recognition start failed: {}", e);
                self.record_failure()
            }
        }
    }

    fn record_failure(&mut self) -> VoiceOutcome {
        self.failures += 1;
        if self.failures >= self.policy.max_consecutive_failures {
            let failures = self.failures;
            warn!(failures, "🎙️ Voice commands giving up after repeated failures");
            self.shutdown();
            self.status = VoiceStatus::GaveUp;
            return VoiceOutcome::GaveUp { failures };
        }
        self.schedule_restart()
    }

    fn schedule_restart(&mut self) -> VoiceOutcome {
        let tx = self.events.clone();
        let armed = self
            .restart
            .arm_once(self.clock.as_ref(), self.policy.restart_delay, |epoch| -> TimerCallback {
                Box::new(move || {
                    let _ = tx.send(CoachEvent::RecognitionRestart { epoch });
                })
            });
        match armed {
            Ok(_) => {
                self.status = VoiceStatus::Restarting;
                VoiceOutcome::Idle
            }
            Err(e) => {
                warn!("cannot schedule recognition restart: {}", e);
                let failures = self.failures;
                self.shutdown();
                self.status = VoiceStatus::GaveUp;
                VoiceOutcome::GaveUp { failures }
            }
        }
    }

    fn mark_unavailable(&mut self) -> VoiceOutcome {
        self.shutdown();
        self.unavailable = true;
        self.status = VoiceStatus::Unavailable;
        if self.unavailable_reported {
            VoiceOutcome::Idle
        } else {
            warn!("🎙️ Speech recognition unavailable; use manual controls");
            self.unavailable_reported = true;
            VoiceOutcome::Unavailable
        }
    }
}

impl Drop for VoiceCommandSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}
