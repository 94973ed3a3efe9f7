//! Voice intents and the keyword table that maps transcripts onto them.

use serde::{Deserialize, Serialize};

/// A normalized command, from a recognized transcript or a UI action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceIntent {
    Start,
    Stop,
    Next,
    Previous,
    Repeat,
    CallEmergency,
    Help,
    Unrecognized,
}

/// Phrases per intent, checked in this order. The first intent with a phrase
/// contained in the transcript wins.
pub const KEYWORD_TABLE: &[(VoiceIntent, &[&str])] = &[
    (
        VoiceIntent::Start,
        &["start cpr", "initiate cpr", "begin cpr", "start compressions"],
    ),
    (VoiceIntent::Stop, &["stop", "pause"]),
    (VoiceIntent::Next, &["next step", "next", "continue"]),
    (VoiceIntent::Previous, &["go back", "previous", "back"]),
    (
        VoiceIntent::Repeat,
        &["repeat", "again", "repeat that", "repeat last step"],
    ),
    (VoiceIntent::CallEmergency, &["call 911", "call nine one one"]),
    (VoiceIntent::Help, &["help", "commands"]),
];

/// Lower-case and trim a raw transcript.
pub fn normalize_transcript(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl VoiceIntent {
    /// Map a transcript through [`KEYWORD_TABLE`]. Matching is case-insensitive.
    pub fn from_transcript(raw: &str) -> Self {
        let transcript = normalize_transcript(raw);
        if transcript.is_empty() {
            return VoiceIntent::Unrecognized;
        }
        KEYWORD_TABLE
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| transcript.contains(p)))
            .map(|(intent, _)| *intent)
            .unwrap_or(VoiceIntent::Unrecognized)
    }

    pub fn is_recognized(self) -> bool {
        self != VoiceIntent::Unrecognized
    }

    /// Short name for logs and help output.
    pub fn label(self) -> &'static str {
        match self {
            VoiceIntent::Start => "start",
            VoiceIntent::Stop => "stop",
            VoiceIntent::Next => "next",
            VoiceIntent::Previous => "previous",
            VoiceIntent::Repeat => "repeat",
            VoiceIntent::CallEmergency => "call_emergency",
            VoiceIntent::Help => "help",
            VoiceIntent::Unrecognized => "unrecognized",
        }
    }
}
