//! Speech recognition port.
//!
//! A [`SpeechRecognizer`] runs one continuous session at a time and reports
//! what it hears through a [`RecognitionSink`]. Restarting after a session
//! ends is not the recognizer's job; [`crate::voice_commands`] does that.

use crate::error::{CoachError, CoachResult};
use crate::events::CoachEvent;
use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why a recognition session failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionFailure {
    /// The session was cancelled on purpose.
    Aborted,
    /// The user or platform refused microphone / recognition access.
    NotAllowed,
    NoSpeech,
    Network,
    AudioCapture,
    Other(String),
}

/// How the voice source should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Explicit cancel: do not restart.
    Cancelled,
    /// Will not get better by retrying.
    Unavailable,
    /// Restart after the fixed delay.
    Transient,
}

impl RecognitionFailure {
    pub fn disposition(&self) -> FailureDisposition {
        match self {
            RecognitionFailure::Aborted => FailureDisposition::Cancelled,
            RecognitionFailure::NotAllowed => FailureDisposition::Unavailable,
            RecognitionFailure::NoSpeech
            | RecognitionFailure::Network
            | RecognitionFailure::AudioCapture
            | RecognitionFailure::Other(_) => FailureDisposition::Transient,
        }
    }
}

/// Something a recognizer session reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Transcript { text: String, is_final: bool },
    Error(RecognitionFailure),
    /// The session ended on its own.
    Ended,
}

/// Where a recognizer session delivers its events. Tagged with the session id
/// so events from a superseded session can be told apart.
#[derive(Debug, Clone)]
pub struct RecognitionSink {
    session: u64,
    tx: mpsc::UnboundedSender<CoachEvent>,
}

impl RecognitionSink {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<CoachEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Deliver an event. Returns false once the orchestrator is gone.
    pub fn send(&self, event: RecognitionEvent) -> bool {
        self.tx
            .send(CoachEvent::Recognition {
                session: self.session,
                event,
            })
            .is_ok()
    }

    pub fn final_transcript(&self, text: impl Into<String>) -> bool {
        self.send(RecognitionEvent::Transcript {
            text: text.into(),
            is_final: true,
        })
    }

    pub fn ended(&self) -> bool {
        self.send(RecognitionEvent::Ended)
    }

    pub fn failed(&self, failure: RecognitionFailure) -> bool {
        self.send(RecognitionEvent::Error(failure))
    }
}

/// Continuous speech recognition capability.
pub trait SpeechRecognizer: Send {
    /// False when the platform has no recognition at all. Checked once; the
    /// voice source never calls `start` on an unavailable recognizer.
    fn is_available(&self) -> bool;

    /// Begin a session that reports into `sink` until it ends or `stop` is called.
    fn start(&mut self, sink: RecognitionSink) -> CoachResult<()>;

    /// End the current session. No further events should be sent for it.
    fn stop(&mut self);
}

/// Recognizer for platforms without speech recognition.
#[derive(Debug, Default)]
pub struct PlaceholderRecognizer;

impl SpeechRecognizer for PlaceholderRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _sink: RecognitionSink) -> CoachResult<()> {
        Err(CoachError::Unavailable(crate::error::Capability::Recognition))
    }

    fn stop(&mut self) {}
}

#[derive(Default)]
struct LineShared {
    sink: Option<RecognitionSink>,
    closed: bool,
}

/// Treats each line read from an input (typically stdin) as a final transcript.
///
/// A single reader thread runs for the recognizer's lifetime; lines that
/// arrive while no session is active are dropped, like speech while the
/// microphone is off. End of input ends the active session, and later
/// `start` calls fail.
pub struct LineRecognizer {
    shared: Arc<Mutex<LineShared>>,
}

impl LineRecognizer {
    pub fn stdin() -> Self {
        Self::from_reader(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let shared = Arc::new(Mutex::new(LineShared::default()));
        let reader_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("LineRecognizer: read failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let guard = lock(&reader_shared);
                match guard.sink.as_ref() {
                    Some(sink) => {
                        if !sink.final_transcript(line) {
                            break;
                        }
                    }
                    None => debug!("LineRecognizer: not listening, dropped {:?}", line),
                }
            }
            let mut guard = lock(&reader_shared);
            guard.closed = true;
            if let Some(sink) = guard.sink.take() {
                sink.ended();
            }
            info!("LineRecognizer: input closed");
        });
        Self { shared }
    }
}

fn lock(shared: &Mutex<LineShared>) -> std::sync::MutexGuard<'_, LineShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SpeechRecognizer for LineRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&mut self, sink: RecognitionSink) -> CoachResult<()> {
        let mut guard = lock(&self.shared);
        if guard.closed {
            return Err(CoachError::Recognition("input closed".to_string()));
        }
        debug!(session = sink.session(), "LineRecognizer: session started");
        guard.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.shared).sink = None;
    }
}
