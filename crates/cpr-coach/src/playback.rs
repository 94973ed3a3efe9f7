//! **Playback**: real audio for spoken instructions and the metronome click.
//!
//! Speech goes text → [`TtsBackend`] → `rodio::Sink`. Synthesis runs on a
//! worker thread so the coaching loop never waits on the network, and a
//! generation counter drops audio for utterances that were superseded while
//! they were being synthesized. Cancelling stops the sink immediately.

use crate::click::{ClickSettings, ClickSink};
use crate::error::{CoachError, CoachResult};
use crate::speech::{SpeechBackend, Utterance};
use rodio::source::SineWave;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backend that turns an utterance into audio bytes (WAV/MP3).
pub trait TtsBackend: Send {
    /// Return an empty vec to skip playback.
    fn synthesize(&self, utterance: &Utterance) -> CoachResult<Vec<u8>>;
}

/// Returns no audio. Use to exercise playback without a TTS service.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _utterance: &Utterance) -> CoachResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// OpenAI-compatible `/audio/speech` endpoint.
///
/// `CPR_COACH_TTS_URL` (default `https://api.openai.com/v1`), `CPR_COACH_TTS_KEY`,
/// `CPR_COACH_TTS_MODEL` (default `tts-1`), `CPR_COACH_TTS_VOICE` (default `nova`).
///
/// Holds a blocking client: build and drop it outside the async runtime
/// (the [`PlaybackSpeech`] worker does both).
#[derive(Debug, Clone)]
pub struct HttpTts {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    client: reqwest::blocking::Client,
}

impl HttpTts {
    pub fn from_env() -> CoachResult<Self> {
        let base_url = std::env::var("CPR_COACH_TTS_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("CPR_COACH_TTS_KEY")
            .map_err(|_| CoachError::Config("HTTP TTS requires CPR_COACH_TTS_KEY".to_string()))?;
        let model = std::env::var("CPR_COACH_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice = std::env::var("CPR_COACH_TTS_VOICE").unwrap_or_else(|_| "nova".to_string());
        Self::new(base_url, api_key, model, voice)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> CoachResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CoachError::Speech(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }
}

impl TtsBackend for HttpTts {
    fn synthesize(&self, utterance: &Utterance) -> CoachResult<Vec<u8>> {
        let text = utterance.text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "speed": utterance.settings.rate,
            "response_format": "wav",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| CoachError::Speech(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(CoachError::Speech(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| CoachError::Speech(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Default output device, kept open on a dedicated thread for as long as this
/// value (or a clone) lives.
#[derive(Clone)]
pub struct AudioOutput {
    handle: OutputStreamHandle,
    _keepalive: Arc<std_mpsc::Sender<()>>,
}

impl AudioOutput {
    pub fn open_default() -> CoachResult<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (keepalive_tx, keepalive_rx) = std_mpsc::channel::<()>();
        thread::Builder::new()
            .name("cpr-audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Blocks until every AudioOutput clone is gone.
                    let _ = keepalive_rx.recv();
                    drop(stream);
                    debug!("audio output closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(CoachError::Playback(e.to_string())));
                }
            })?;
        let handle = ready_rx
            .recv()
            .map_err(|e| CoachError::Playback(format!("audio output thread exited: {}", e)))??;
        info!("🔊 Audio output ready");
        Ok(Self {
            handle,
            _keepalive: Arc::new(keepalive_tx),
        })
    }

    pub fn new_sink(&self) -> CoachResult<Sink> {
        Sink::try_new(&self.handle).map_err(|e| CoachError::Playback(e.to_string()))
    }
}

struct Job {
    generation: u64,
    utterance: Utterance,
}

/// [`SpeechBackend`] that synthesizes with a [`TtsBackend`] and plays through rodio.
pub struct PlaybackSpeech {
    sink: Arc<Sink>,
    generation: Arc<AtomicU64>,
    jobs: std_mpsc::Sender<Job>,
    alive: Arc<AtomicBool>,
    _output: AudioOutput,
}

impl PlaybackSpeech {
    /// Start the synthesis worker. `make_tts` runs on the worker thread.
    pub fn spawn<F>(output: AudioOutput, make_tts: F) -> CoachResult<Self>
    where
        F: FnOnce() -> CoachResult<Box<dyn TtsBackend>> + Send + 'static,
    {
        let sink = Arc::new(output.new_sink()?);
        let generation = Arc::new(AtomicU64::new(0));
        let alive = Arc::new(AtomicBool::new(true));
        let (jobs_tx, jobs_rx) = std_mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<CoachResult<()>>();

        let worker_sink = Arc::clone(&sink);
        let worker_generation = Arc::clone(&generation);
        let worker_alive = Arc::clone(&alive);
        thread::Builder::new().name("cpr-tts".to_string()).spawn(move || {
            let tts = match make_tts() {
                Ok(tts) => {
                    let _ = ready_tx.send(Ok(()));
                    tts
                }
                Err(e) => {
                    worker_alive.store(false, Ordering::Release);
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            while let Ok(mut job) = jobs_rx.recv() {
                // Only the newest queued utterance matters.
                while let Ok(newer) = jobs_rx.try_recv() {
                    job = newer;
                }
                let current = || worker_generation.load(Ordering::Acquire) == job.generation;
                if !current() {
                    continue;
                }
                let bytes = match tts.synthesize(&job.utterance) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("TTS failed: {}", e);
                        continue;
                    }
                };
                if bytes.is_empty() || !current() {
                    continue;
                }
                match rodio::Decoder::new(Cursor::new(bytes)) {
                    Ok(source) => {
                        worker_sink.set_volume(job.utterance.settings.volume);
                        worker_sink.append(source.convert_samples::<f32>());
                    }
                    Err(e) => warn!("TTS audio decode failed: {}", e),
                }
            }
            worker_alive.store(false, Ordering::Release);
            debug!("TTS worker stopped");
        })?;

        ready_rx
            .recv()
            .map_err(|e| CoachError::Speech(format!("TTS worker exited: {}", e)))??;
        info!("🗣️ Playback speech ready");
        Ok(Self {
            sink,
            generation,
            jobs: jobs_tx,
            alive,
            _output: output,
        })
    }
}

impl SpeechBackend for PlaybackSpeech {
    fn is_available(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn speak(&mut self, utterance: &Utterance) -> CoachResult<()> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.sink.stop();
        self.jobs
            .send(Job {
                generation,
                utterance: utterance.clone(),
            })
            .map_err(|e| CoachError::ChannelSend(e.to_string()))
    }

    fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.sink.stop();
    }
}

/// Metronome click as a short sine tone.
pub struct ToneClick {
    output: AudioOutput,
    settings: ClickSettings,
}

impl ToneClick {
    pub fn new(output: AudioOutput, settings: ClickSettings) -> Self {
        Self { output, settings }
    }
}

impl ClickSink for ToneClick {
    fn click(&mut self, _count: u32) {
        let tone = SineWave::new(self.settings.frequency_hz)
            .take_duration(self.settings.duration)
            .amplify(self.settings.gain);
        if let Err(e) = self.output.handle.play_raw(tone) {
            warn!("click playback failed: {}", e);
        }
    }
}
