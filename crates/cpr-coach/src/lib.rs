//! # CPR Coach - Guided CPR Coaching Engine
//!
//! Walks a rescuer through CPR: a metronome paces compressions, every 30th
//! compression opens a timed rescue-breath pause, instructions are spoken
//! aloud, and the session can be driven hands-free by voice commands.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Coach Orchestrator                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐    │
//! │  │  Recognizer  │→ │ Voice Source │→ │                  │    │
//! │  │    (port)    │  │ (retry/keys) │  │                  │    │
//! │  └──────────────┘  └──────────────┘  │  CoachEvent loop │    │
//! │  ┌──────────────┐  ┌──────────────┐  │  (one channel)   │    │
//! │  │ UI commands  │→ │ CoachHandle  │→ │                  │    │
//! │  └──────────────┘  └──────────────┘  └────────┬─────────┘    │
//! │  ┌──────────────┐                             ↓              │
//! │  │  Metronome   │── ticks ──→  ┌──────────────────────────┐   │
//! │  │ (500ms/tick) │              │ Procedure State Machine  │   │
//! │  └──────────────┘  ←─ start ── │  Compress ⇄ Breathe      │   │
//! │  ┌──────────────┐              └──────────────────────────┘   │
//! │  │ Speech Out   │←── latest instruction wins                  │
//! │  │ Click / Lock │                                             │
//! │  └──────────────┘                                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod click;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod instructions;
pub mod intent;
pub mod metronome;
pub mod orchestrator;
#[cfg(feature = "audio")]
pub mod playback;
pub mod procedure;
pub mod recognition;
pub mod speech;
pub mod voice_commands;
pub mod wake_lock;

pub use click::{ClickSettings, ClickSink, PrintClick, SilentClick};
pub use clock::{ClockSource, ManualClock, TimerCallback, TimerHandle, TimerSlot, TokioClock};
pub use config::CoachConfig;
pub use error::{Capability, CoachError, CoachResult};
pub use events::{CoachCommand, CoachEvent, CoachNotice, ProcedureSnapshot};
pub use instructions::StepInstructions;
pub use intent::VoiceIntent;
pub use metronome::Metronome;
pub use orchestrator::{CoachHandle, CoachOrchestrator, CoachPorts};
#[cfg(feature = "audio")]
pub use playback::{AudioOutput, HttpTts, PlaceholderTts, PlaybackSpeech, ToneClick, TtsBackend};
pub use procedure::{ProcedureState, ProcedureStateMachine, Step, Transition};
pub use recognition::{
    LineRecognizer, PlaceholderRecognizer, RecognitionEvent, RecognitionFailure, RecognitionSink, SpeechRecognizer,
};
pub use speech::{LogSpeech, PlaceholderSpeech, SpeakOutcome, SpeechBackend, SpeechOutput, Utterance, VoiceSettings};
pub use voice_commands::{RetryPolicy, VoiceCommandSource, VoiceOutcome, VoiceStatus};
pub use wake_lock::{InhibitWakeLock, NoopWakeLock, UnsupportedWakeLock, WakeLockGuard, WakeLockProvider};
