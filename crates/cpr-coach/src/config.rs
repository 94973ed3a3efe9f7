//! Coaching session configuration.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | compressions_per_minute | 120 | Metronome cadence. |
//! | compressions_per_cycle | 30 | Compressions before the breathing pause. |
//! | breathing_pause_ms | 10000 | Length of the rescue-breath pause. |
//! | rescue_breaths | 2 | Breaths announced per pause. |
//! | recognition_restart_delay_ms | 1000 | Delay before a recognizer session is restarted. |
//! | recognition_max_retries | 5 | Consecutive recognizer failures before voice commands give up. |
//! | audio_enabled | true | Spoken instructions and click on open. |
//! | listening_enabled | true | Arm voice commands on open. |
//! | language / speech_rate / speech_pitch / speech_volume | en-US / 0.9 / 1.0 / 1.0 | Voice settings. |
//! | emergency_number | 911 | Number offered by the call-emergency intent. |
//! | click_frequency_hz / click_duration_ms / click_gain | 800 / 100 / 0.3 | Metronome click tone. |
//!
//! Precedence: env `CPR_COACH__<KEY>` > file (`CPR_COACH_CONFIG` or `config/coach.toml`) > defaults.

use crate::click::ClickSettings;
use crate::error::{CoachError, CoachResult};
use crate::metronome::interval_for_cadence;
use crate::speech::VoiceSettings;
use crate::voice_commands::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "CPR_COACH_CONFIG";
/// Config file used when `CPR_COACH_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/coach.toml";
/// Prefix for per-key environment overrides (`CPR_COACH__SPEECH_RATE=1.1`).
pub const ENV_PREFIX: &str = "CPR_COACH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub compressions_per_minute: u32,
    pub compressions_per_cycle: u32,
    pub breathing_pause_ms: u64,
    pub rescue_breaths: u32,
    pub recognition_restart_delay_ms: u64,
    pub recognition_max_retries: u32,
    pub audio_enabled: bool,
    pub listening_enabled: bool,
    pub language: String,
    pub speech_rate: f32,
    pub speech_pitch: f32,
    pub speech_volume: f32,
    pub emergency_number: String,
    pub click_frequency_hz: f32,
    pub click_duration_ms: u64,
    pub click_gain: f32,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            compressions_per_minute: 120,
            compressions_per_cycle: 30,
            breathing_pause_ms: 10_000,
            rescue_breaths: 2,
            recognition_restart_delay_ms: 1000,
            recognition_max_retries: 5,
            audio_enabled: true,
            listening_enabled: true,
            language: "en-US".to_string(),
            speech_rate: 0.9,
            speech_pitch: 1.0,
            speech_volume: 1.0,
            emergency_number: "911".to_string(),
            click_frequency_hz: 800.0,
            click_duration_ms: 100,
            click_gain: 0.3,
        }
    }
}

impl CoachConfig {
    /// Load from `CPR_COACH_CONFIG` (or `config/coach.toml` if present) and the environment.
    pub fn load() -> CoachResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(Some(Path::new(&path))),
            Err(_) => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
                if fallback.exists() {
                    Self::load_from(Some(&fallback))
                } else {
                    Self::load_from(None)
                }
            }
        }
    }

    /// Load from an explicit file (which must exist) and the environment.
    pub fn load_from(path: Option<&Path>) -> CoachResult<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("compressions_per_minute", i64::from(defaults.compressions_per_minute))?
            .set_default("compressions_per_cycle", i64::from(defaults.compressions_per_cycle))?
            .set_default("emergency_number", defaults.emergency_number.clone())?
            .set_default("language", defaults.language.clone())?;

        if let Some(path) = path {
            if !path.exists() {
                return Err(CoachError::Config(format!("config file not found: {}", path.display())));
            }
            debug!(path = %path.display(), "loading coach config file");
            builder = builder.add_source(config::File::from(path));
        }

        let built = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = built.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values no session can run with.
    pub fn validate(&self) -> CoachResult<()> {
        interval_for_cadence(self.compressions_per_minute)?;
        if self.compressions_per_cycle == 0 {
            return Err(CoachError::Config("compressions_per_cycle must be at least 1".into()));
        }
        if self.breathing_pause_ms == 0 {
            return Err(CoachError::Config("breathing_pause_ms must be non-zero".into()));
        }
        if self.rescue_breaths == 0 {
            return Err(CoachError::Config("rescue_breaths must be at least 1".into()));
        }
        if self.recognition_max_retries == 0 {
            return Err(CoachError::Config("recognition_max_retries must be at least 1".into()));
        }
        if !(self.speech_rate > 0.0 && self.speech_rate <= 10.0) {
            return Err(CoachError::Config(format!("speech_rate out of range: {}", self.speech_rate)));
        }
        if !(0.0..=1.0).contains(&self.speech_volume) || !(0.0..=1.0).contains(&self.click_gain) {
            return Err(CoachError::Config("speech_volume and click_gain must be within 0.0..=1.0".into()));
        }
        if self.emergency_number.trim().is_empty() {
            return Err(CoachError::Config("emergency_number must not be empty".into()));
        }
        Ok(())
    }

    pub fn compression_interval(&self) -> CoachResult<Duration> {
        interval_for_cadence(self.compressions_per_minute)
    }

    pub fn breathing_pause(&self) -> Duration {
        Duration::from_millis(self.breathing_pause_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            restart_delay: Duration::from_millis(self.recognition_restart_delay_ms),
            max_consecutive_failures: self.recognition_max_retries,
        }
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            rate: self.speech_rate,
            pitch: self.speech_pitch,
            volume: self.speech_volume,
            language: self.language.clone(),
        }
    }

    pub fn click_settings(&self) -> ClickSettings {
        ClickSettings {
            frequency_hz: self.click_frequency_hz,
            duration: Duration::from_millis(self.click_duration_ms),
            gain: self.click_gain,
        }
    }
}
