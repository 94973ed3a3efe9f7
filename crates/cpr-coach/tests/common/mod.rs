//! Fakes and a session harness shared by the integration tests.

#![allow(dead_code)]

use cpr_coach::{
    ClickSink, CoachConfig, CoachError, CoachNotice, CoachOrchestrator, CoachPorts, CoachResult, ManualClock,
    RecognitionEvent, RecognitionSink, SpeechBackend, SpeechRecognizer, Utterance, VoiceIntent, WakeLockGuard,
    WakeLockProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Records "speak:<text>" and "cancel" in call order.
#[derive(Clone, Default)]
pub struct SpeechLog(Arc<Mutex<Vec<String>>>);

impl SpeechLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix("speak:").map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct RecordingSpeech(pub SpeechLog);

impl SpeechBackend for RecordingSpeech {
    fn speak(&mut self, utterance: &Utterance) -> CoachResult<()> {
        self.0 .0.lock().unwrap().push(format!("speak:{}", utterance.text));
        Ok(())
    }

    fn cancel(&mut self) {
        self.0 .0.lock().unwrap().push("cancel".to_string());
    }
}

#[derive(Clone, Default)]
pub struct Clicks(Arc<Mutex<Vec<u32>>>);

impl Clicks {
    pub fn counts(&self) -> Vec<u32> {
        self.0.lock().unwrap().clone()
    }
}

pub struct CountingClick(pub Clicks);

impl ClickSink for CountingClick {
    fn click(&mut self, count: u32) {
        self.0 .0.lock().unwrap().push(count);
    }
}

#[derive(Default)]
pub struct Script {
    pub available: bool,
    pub starts: u32,
    pub stops: u32,
    pub fail_starts: bool,
    pub sink: Option<RecognitionSink>,
}

/// Recognizer driven by the test through the shared [`Script`].
pub struct ScriptedRecognizer(pub Arc<Mutex<Script>>);

impl SpeechRecognizer for ScriptedRecognizer {
    fn is_available(&self) -> bool {
        self.0.lock().unwrap().available
    }

    fn start(&mut self, sink: RecognitionSink) -> CoachResult<()> {
        let mut script = self.0.lock().unwrap();
        script.starts += 1;
        if script.fail_starts {
            return Err(CoachError::Recognition("microphone busy".into()));
        }
        script.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut script = self.0.lock().unwrap();
        script.stops += 1;
        script.sink = None;
    }
}

/// Counts acquisitions and releases; optionally refuses.
#[derive(Default)]
pub struct CountingWakeLock {
    pub refuse: bool,
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl WakeLockProvider for CountingWakeLock {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn acquire(&self) -> CoachResult<WakeLockGuard> {
        if self.refuse {
            return Err(CoachError::WakeLock("denied by platform".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let released = Arc::clone(&self.released);
        Ok(WakeLockGuard::new("counting", move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// One orchestrator on a [`ManualClock`] with every port faked.
pub struct Session {
    pub clock: ManualClock,
    pub coach: CoachOrchestrator,
    pub notices: tokio::sync::mpsc::UnboundedReceiver<CoachNotice>,
    pub speech: SpeechLog,
    pub clicks: Clicks,
    pub script: Arc<Mutex<Script>>,
    pub lock_acquired: Arc<AtomicUsize>,
    pub lock_released: Arc<AtomicUsize>,
}

impl Session {
    pub fn new(config: CoachConfig) -> Self {
        Self::build(config, true, false)
    }

    pub fn build(config: CoachConfig, recognition_available: bool, refuse_wake_lock: bool) -> Self {
        init_tracing();
        let clock = ManualClock::new();
        let speech = SpeechLog::default();
        let clicks = Clicks::default();
        let script = Arc::new(Mutex::new(Script {
            available: recognition_available,
            ..Default::default()
        }));
        let wake_lock = CountingWakeLock {
            refuse: refuse_wake_lock,
            ..Default::default()
        };
        let lock_acquired = Arc::clone(&wake_lock.acquired);
        let lock_released = Arc::clone(&wake_lock.released);

        let ports = CoachPorts {
            clock: Arc::new(clock.clone()),
            speech: Box::new(RecordingSpeech(speech.clone())),
            click: Box::new(CountingClick(clicks.clone())),
            recognizer: Box::new(ScriptedRecognizer(Arc::clone(&script))),
            wake_lock: Arc::new(wake_lock),
        };
        let mut coach = CoachOrchestrator::new(config, ports).expect("valid config");
        let notices = coach.take_notice_receiver().expect("notice receiver");
        Self {
            clock,
            coach,
            notices,
            speech,
            clicks,
            script,
            lock_acquired,
            lock_released,
        }
    }

    /// Default config, opened.
    pub fn opened() -> Self {
        let mut session = Self::new(CoachConfig::default());
        session.coach.open();
        session
    }

    pub fn intent(&mut self, intent: VoiceIntent) {
        self.coach.handle().intent(intent).unwrap();
        self.coach.process_pending();
    }

    /// Advance the clock, handling each event as soon as its timer fires.
    pub fn advance_ms(&mut self, ms: u64) {
        let coach = &mut self.coach;
        self.clock.advance_with(Duration::from_millis(ms), || {
            coach.process_pending();
        });
        self.coach.process_pending();
    }

    /// Advance exactly `n` metronome ticks at the default cadence.
    pub fn ticks(&mut self, n: u64) {
        self.advance_ms(500 * n);
    }

    /// Deliver an event as the active recognizer session.
    pub fn hear(&mut self, event: RecognitionEvent) {
        let sent = {
            let script = self.script.lock().unwrap();
            script.sink.as_ref().map(|sink| sink.send(event)).unwrap_or(false)
        };
        assert!(sent, "no active recognizer session");
        self.coach.process_pending();
    }

    pub fn say(&mut self, words: &str) {
        self.hear(RecognitionEvent::Transcript {
            text: words.to_string(),
            is_final: true,
        });
    }

    pub fn drain_notices(&mut self) -> Vec<CoachNotice> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }

    pub fn recognizer_starts(&self) -> u32 {
        self.script.lock().unwrap().starts
    }
}
