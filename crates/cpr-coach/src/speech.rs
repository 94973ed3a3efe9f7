//! **SpeechOutput**: spoken instructions with a latest-wins interruption policy.
//!
//! Instructions are time-critical, so a new utterance cancels the one in
//! progress instead of queueing behind it.

use crate::error::{Capability, CoachResult};
use tracing::{debug, info, warn};

/// Fixed presentation parameters for synthesized speech.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
            language: "en-US".to_string(),
        }
    }
}

/// One instruction to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub settings: VoiceSettings,
}

/// Backend that renders utterances as audio. Implement for the platform's
/// synthesizer, a TTS service, or a log.
pub trait SpeechBackend: Send {
    /// False when the platform has no synthesis at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Start rendering `utterance`. Must not block until playback finishes.
    fn speak(&mut self, utterance: &Utterance) -> CoachResult<()>;

    /// Silence the utterance in progress, if any.
    fn cancel(&mut self);
}

/// Backend that renders nothing. Use for headless runs and tests.
#[derive(Debug, Default)]
pub struct PlaceholderSpeech {
    available: bool,
}

impl PlaceholderSpeech {
    pub fn new() -> Self {
        Self { available: true }
    }

    /// A backend that reports synthesis as missing.
    pub fn unavailable() -> Self {
        Self { available: false }
    }
}

impl SpeechBackend for PlaceholderSpeech {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, _utterance: &Utterance) -> CoachResult<()> {
        Ok(())
    }

    fn cancel(&mut self) {}
}

/// Backend that logs each utterance and optionally echoes it to stdout.
#[derive(Debug, Default)]
pub struct LogSpeech {
    echo: bool,
}

impl LogSpeech {
    pub fn new() -> Self {
        Self { echo: false }
    }

    pub fn stdout() -> Self {
        Self { echo: true }
    }
}

impl SpeechBackend for LogSpeech {
    fn speak(&mut self, utterance: &Utterance) -> CoachResult<()> {
        info!(rate = utterance.settings.rate, "🔊 {}", utterance.text);
        if self.echo {
            println!("🔊 {}", utterance.text);
        }
        Ok(())
    }

    fn cancel(&mut self) {}
}

/// Result of a [`SpeechOutput::speak`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Audio is disabled; nothing rendered.
    Muted,
    Spoken,
    /// Synthesis is missing. `first` is true only the first time.
    Unavailable { first: bool },
    /// The backend failed; logged and dropped.
    Failed,
}

/// Speech front end: enable flag, voice settings and the interruption policy.
pub struct SpeechOutput {
    backend: Box<dyn SpeechBackend>,
    settings: VoiceSettings,
    enabled: bool,
    speaking: bool,
    unavailable_reported: bool,
}

impl SpeechOutput {
    pub fn new(backend: Box<dyn SpeechBackend>, settings: VoiceSettings, enabled: bool) -> Self {
        Self {
            backend,
            settings,
            enabled,
            speaking: false,
            unavailable_reported: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle audio. Disabling silences the utterance in progress.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled && !enabled {
            self.cancel();
        }
        self.enabled = enabled;
    }

    /// Say `text`, cancelling whatever is being said.
    pub fn speak(&mut self, text: &str) -> SpeakOutcome {
        if !self.enabled {
            debug!("speech muted: {}", text);
            return SpeakOutcome::Muted;
        }
        if !self.backend.is_available() {
            let first = !self.unavailable_reported;
            if first {
                warn!("🔇 {} unavailable; instructions will be shown only", Capability::Synthesis);
                self.unavailable_reported = true;
            }
            return SpeakOutcome::Unavailable { first };
        }
        if self.speaking {
            self.backend.cancel();
        }
        let utterance = Utterance {
            text: text.to_string(),
            settings: self.settings.clone(),
        };
        match self.backend.speak(&utterance) {
            Ok(()) => {
                self.speaking = true;
                SpeakOutcome::Spoken
            }
            Err(e) => {
                warn!("speech failed: {}", e);
                self.speaking = false;
                SpeakOutcome::Failed
            }
        }
    }

    /// Silence the utterance in progress.
    pub fn cancel(&mut self) {
        if self.speaking {
            self.backend.cancel();
            self.speaking = false;
        }
    }
}
