//! Events into the orchestrator and notices out of it.

use crate::error::Capability;
use crate::instructions::{StepInstructions, BREATHE_HEADLINE, COMPRESS_HEADLINE};
use crate::intent::VoiceIntent;
use crate::procedure::{ProcedureState, Step};
use crate::recognition::RecognitionEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Explicit UI actions.
#[derive(Debug, Clone, PartialEq)]
pub enum CoachCommand {
    /// A button press mapped to the same intent a voice command would produce.
    Intent(VoiceIntent),
    SetListening(bool),
    SetAudio(bool),
    /// Close the session: cancel timers, stop listening, release the wake lock.
    Close,
}

/// Everything the orchestrator reacts to. All of it arrives on one channel and
/// is handled in order.
#[derive(Debug, Clone, PartialEq)]
pub enum CoachEvent {
    Command(CoachCommand),
    MetronomeTick { epoch: u64 },
    BreathingElapsed { epoch: u64 },
    Recognition { session: u64, event: RecognitionEvent },
    RecognitionRestart { epoch: u64 },
}

/// Read-only view of the procedure plus what the screen derives from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureSnapshot {
    #[serde(flatten)]
    pub state: ProcedureState,
    pub title: &'static str,
    pub headline: Option<&'static str>,
    /// e.g. "12/30"
    pub counter: String,
    /// One-based cycle number as displayed.
    pub display_cycle: u32,
    pub can_go_previous: bool,
    pub can_go_next: bool,
}

impl ProcedureSnapshot {
    pub fn new(state: &ProcedureState, compressions_per_cycle: u32) -> Self {
        let headline = state.is_active.then(|| {
            if state.current_step == Step::Compress {
                COMPRESS_HEADLINE
            } else {
                BREATHE_HEADLINE
            }
        });
        Self {
            state: state.clone(),
            title: StepInstructions::for_step(state.current_step).title,
            headline,
            counter: format!("{}/{}", state.compression_count, compressions_per_cycle),
            display_cycle: state.cycle_count + 1,
            can_go_previous: !state.current_step.is_first(),
            can_go_next: !state.current_step.is_last(),
        }
    }
}

/// Published by the orchestrator for whoever renders the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoachNotice {
    StateChanged {
        snapshot: ProcedureSnapshot,
        timestamp: DateTime<Utc>,
    },
    Spoke {
        text: String,
    },
    /// The platform should offer to dial this number.
    DialRequested {
        number: String,
    },
    CapabilityUnavailable {
        capability: Capability,
    },
    ListeningChanged {
        listening: bool,
    },
    /// Voice recognition kept failing and was switched off.
    RecognitionGaveUp {
        failures: u32,
    },
    Closed,
}
