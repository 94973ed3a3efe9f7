//! Error types for the CPR coach

use serde::Serialize;
use thiserror::Error;

/// Result type alias for coaching operations
pub type CoachResult<T> = Result<T, CoachError>;

/// Platform capabilities the coach can run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Continuous speech recognition (voice commands).
    Recognition,
    /// Speech synthesis (spoken instructions).
    Synthesis,
    /// Screen wake lock.
    WakeLock,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Recognition => "speech recognition",
            Capability::Synthesis => "speech synthesis",
            Capability::WakeLock => "wake lock",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the coaching engine.
///
/// None of these end a session: the orchestrator logs them and carries on
/// without the failing feature.
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("{0} is not available on this platform")]
    Unavailable(Capability),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Wake lock error: {0}")]
    WakeLock(String),

    #[error("Timer error: {0}")]
    Timer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for CoachError {
    fn from(err: config::ConfigError) -> Self {
        CoachError::Config(err.to_string())
    }
}
