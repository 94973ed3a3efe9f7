//! Coach Orchestrator - the single event loop behind a coaching session
//!
//! Every input (UI commands, recognized voice intents, metronome ticks,
//! breathing-pause expiry, recognizer restarts) arrives as a [`CoachEvent`] on
//! one channel and is handled in order. The orchestrator owns the procedure
//! state, the timers, the speech output, the voice source and the wake lock;
//! nothing else mutates them.

use crate::clock::{ClockSource, TimerCallback, TimerSlot};
use crate::click::ClickSink;
use crate::config::CoachConfig;
use crate::error::{Capability, CoachError, CoachResult};
use crate::events::{CoachCommand, CoachEvent, CoachNotice, ProcedureSnapshot};
use crate::instructions::{
    breathing_announcement, emergency_announcement, help_announcement, StepInstructions, RESUME_ANNOUNCEMENT,
    START_ANNOUNCEMENT, STOP_ANNOUNCEMENT,
};
use crate::intent::VoiceIntent;
use crate::metronome::Metronome;
use crate::procedure::{ProcedureState, ProcedureStateMachine, Transition};
use crate::recognition::SpeechRecognizer;
use crate::speech::{SpeakOutcome, SpeechBackend, SpeechOutput};
use crate::voice_commands::{VoiceCommandSource, VoiceOutcome, VoiceStatus};
use crate::wake_lock::{WakeLockGuard, WakeLockProvider};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Platform capabilities a session runs on.
pub struct CoachPorts {
    pub clock: Arc<dyn ClockSource>,
    pub speech: Box<dyn SpeechBackend>,
    pub click: Box<dyn ClickSink>,
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub wake_lock: Arc<dyn WakeLockProvider>,
}

/// Cloneable sender for UI commands.
#[derive(Debug, Clone)]
pub struct CoachHandle {
    tx: mpsc::UnboundedSender<CoachEvent>,
}

impl CoachHandle {
    pub fn send(&self, command: CoachCommand) -> CoachResult<()> {
        self.tx
            .send(CoachEvent::Command(command))
            .map_err(|e| CoachError::ChannelSend(e.to_string()))
    }

    /// Same effect as the matching voice command.
    pub fn intent(&self, intent: VoiceIntent) -> CoachResult<()> {
        self.send(CoachCommand::Intent(intent))
    }

    pub fn set_listening(&self, listening: bool) -> CoachResult<()> {
        self.send(CoachCommand::SetListening(listening))
    }

    pub fn set_audio(&self, enabled: bool) -> CoachResult<()> {
        self.send(CoachCommand::SetAudio(enabled))
    }

    pub fn close(&self) -> CoachResult<()> {
        self.send(CoachCommand::Close)
    }
}

/// The coaching session.
///
/// Call [`CoachOrchestrator::open`] (or [`CoachOrchestrator::run`], which opens
/// for you) before feeding events. Dropping the orchestrator closes the session.
pub struct CoachOrchestrator {
    config: CoachConfig,
    clock: Arc<dyn ClockSource>,
    machine: ProcedureStateMachine,
    metronome: Metronome,
    breathing: TimerSlot,
    speech: SpeechOutput,
    click: Box<dyn ClickSink>,
    voice: VoiceCommandSource,
    wake_lock_provider: Arc<dyn WakeLockProvider>,
    wake_lock: Option<WakeLockGuard>,

    events_tx: mpsc::UnboundedSender<CoachEvent>,
    events_rx: mpsc::UnboundedReceiver<CoachEvent>,
    notices_tx: mpsc::UnboundedSender<CoachNotice>,
    // Held until someone takes it; notices are not queued before that.
    notices_rx: Option<mpsc::UnboundedReceiver<CoachNotice>>,

    opened: bool,
    closed: bool,
}

impl CoachOrchestrator {
    pub fn new(config: CoachConfig, ports: CoachPorts) -> CoachResult<Self> {
        info!("🎭 Initializing Coach Orchestrator");
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let mut machine = ProcedureStateMachine::new(config.compressions_per_cycle);
        machine.set_audio_enabled(config.audio_enabled);
        let metronome = Metronome::new(Arc::clone(&ports.clock), config.compression_interval()?);
        let speech = SpeechOutput::new(ports.speech, config.voice_settings(), config.audio_enabled);
        let voice = VoiceCommandSource::new(
            ports.recognizer,
            events_tx.clone(),
            Arc::clone(&ports.clock),
            config.retry_policy(),
        );

        Ok(Self {
            config,
            clock: ports.clock,
            machine,
            metronome,
            breathing: TimerSlot::new(),
            speech,
            click: ports.click,
            voice,
            wake_lock_provider: ports.wake_lock,
            wake_lock: None,
            events_tx,
            events_rx,
            notices_tx,
            notices_rx: Some(notices_rx),
            opened: false,
            closed: false,
        })
    }

    /// Take the notice stream. Only the first call returns it.
    pub fn take_notice_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<CoachNotice>> {
        self.notices_rx.take()
    }

    pub fn handle(&self) -> CoachHandle {
        CoachHandle {
            tx: self.events_tx.clone(),
        }
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    pub fn state(&self) -> &ProcedureState {
        self.machine.state()
    }

    pub fn snapshot(&self) -> ProcedureSnapshot {
        ProcedureSnapshot::new(self.machine.state(), self.machine.compressions_per_cycle())
    }

    pub fn voice_status(&self) -> VoiceStatus {
        self.voice.status()
    }

    pub fn is_open(&self) -> bool {
        self.opened && !self.closed
    }

    pub fn holds_wake_lock(&self) -> bool {
        self.wake_lock.as_ref().is_some_and(WakeLockGuard::is_held)
    }

    /// Begin the session: take the wake lock and arm voice commands.
    pub fn open(&mut self) {
        if self.opened || self.closed {
            return;
        }
        self.opened = true;
        info!("🚀 Opening coaching session");

        match self.wake_lock_provider.acquire() {
            Ok(guard) => self.wake_lock = Some(guard),
            Err(CoachError::Unavailable(capability)) => {
                warn!("🔅 {} unavailable; the screen may sleep", capability);
                self.notify(CoachNotice::CapabilityUnavailable { capability });
            }
            Err(e) => warn!(provider = self.wake_lock_provider.name(), "Wake lock not acquired: {}", e),
        }

        if self.config.listening_enabled {
            let outcome = self.voice.set_listening(true);
            self.apply_voice_outcome(outcome);
        }
        self.publish_state();
        info!("✅ Coaching session open");
    }

    /// End the session: cancel timers, stop listening and speech, release the wake lock.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("🛑 Closing coaching session");

        self.metronome.stop();
        self.breathing.cancel();
        self.voice.shutdown();
        self.speech.cancel();
        self.machine.stop();
        self.machine.set_listening(false);
        if let Some(guard) = self.wake_lock.take() {
            guard.release();
        }
        self.notify(CoachNotice::Closed);
        info!("✅ Coaching session closed");
    }

    /// Handle one event. Returns false once the session is closed.
    pub fn handle_event(&mut self, event: CoachEvent) -> bool {
        if self.closed {
            trace!(?event, "event after close dropped");
            return false;
        }
        match event {
            CoachEvent::Command(command) => self.handle_command(command),
            CoachEvent::MetronomeTick { epoch } => self.on_metronome_tick(epoch),
            CoachEvent::BreathingElapsed { epoch } => self.on_breathing_elapsed(epoch),
            CoachEvent::Recognition { session, event } => {
                let outcome = self.voice.handle_recognition(session, event);
                self.apply_voice_outcome(outcome);
            }
            CoachEvent::RecognitionRestart { epoch } => {
                let outcome = self.voice.handle_restart(epoch);
                self.apply_voice_outcome(outcome);
            }
        }
        !self.closed
    }

    /// Handle every event already queued without waiting. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            if !self.handle_event(event) {
                break;
            }
        }
        handled
    }

    /// Open the session and handle events until a close command or `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.open();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => {
                        if !self.handle_event(event) {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
        self.close();
    }

    fn handle_command(&mut self, command: CoachCommand) {
        debug!(?command, "command");
        match command {
            CoachCommand::Intent(intent) => self.apply_intent(intent),
            CoachCommand::SetListening(listening) => {
                let outcome = self.voice.set_listening(listening);
                self.apply_voice_outcome(outcome);
            }
            CoachCommand::SetAudio(enabled) => {
                self.speech.set_enabled(enabled);
                if self.machine.set_audio_enabled(enabled) {
                    info!(enabled, "🔈 Audio toggled");
                    self.publish_state();
                }
            }
            CoachCommand::Close => self.close(),
        }
    }

    fn apply_intent(&mut self, intent: VoiceIntent) {
        match intent {
            VoiceIntent::Start => {
                if self.machine.start() == Transition::Started {
                    info!("💓 CPR started");
                    self.start_metronome();
                    self.speak(START_ANNOUNCEMENT);
                    self.publish_state();
                }
            }
            VoiceIntent::Stop => {
                self.metronome.stop();
                self.breathing.cancel();
                if self.machine.stop() == Transition::Stopped {
                    info!(cycles = self.machine.state().cycle_count, "⏹️ CPR stopped");
                    self.speak(STOP_ANNOUNCEMENT);
                    self.publish_state();
                }
            }
            VoiceIntent::Next => {
                let transition = self.machine.advance();
                self.announce_move(transition);
            }
            VoiceIntent::Previous => {
                let transition = self.machine.retreat();
                self.announce_move(transition);
            }
            VoiceIntent::Repeat => {
                let step = self.machine.state().current_step;
                self.speak(StepInstructions::for_step(step).audio);
            }
            VoiceIntent::CallEmergency => {
                let number = self.config.emergency_number.clone();
                info!(number = %number, "📞 Emergency call requested");
                self.speak(&emergency_announcement(&number));
                self.notify(CoachNotice::DialRequested { number });
            }
            VoiceIntent::Help => self.speak(&help_announcement()),
            VoiceIntent::Unrecognized => {}
        }
    }

    fn announce_move(&mut self, transition: Transition) {
        if let Transition::Moved(step) = transition {
            debug!(?step, "moved");
            self.speak(StepInstructions::for_step(step).audio);
            self.publish_state();
        }
    }

    fn on_metronome_tick(&mut self, epoch: u64) {
        if !self.metronome.is_current(epoch) {
            trace!(epoch, "stale metronome tick");
            return;
        }
        match self.machine.tick_compression() {
            Transition::Counted(count) => {
                self.play_click(count);
                self.publish_state();
            }
            Transition::BreathingDue => {
                let per_cycle = self.machine.compressions_per_cycle();
                self.play_click(per_cycle);
                self.metronome.stop();
                self.schedule_breathing_resume();
                info!(cycle = self.machine.state().cycle_count + 1, "💨 Breathing pause");
                self.speak(&breathing_announcement(per_cycle, self.config.rescue_breaths));
                self.publish_state();
            }
            _ => {}
        }
    }

    fn on_breathing_elapsed(&mut self, epoch: u64) {
        if !self.breathing.take_if_current(epoch) {
            trace!(epoch, "stale breathing timer");
            return;
        }
        if let Transition::Resumed(cycles) = self.machine.complete_breathing_pause() {
            info!(cycles, "💓 Compressions resumed");
            self.speak(RESUME_ANNOUNCEMENT);
            self.start_metronome();
            self.publish_state();
        }
    }

    fn start_metronome(&mut self) {
        let tx = self.events_tx.clone();
        if let Err(e) = self.metronome.start(move |epoch| {
            let _ = tx.send(CoachEvent::MetronomeTick { epoch });
        }) {
            warn!("Metronome failed to start: {}", e);
        }
    }

    fn schedule_breathing_resume(&mut self) {
        let tx = self.events_tx.clone();
        let armed = self
            .breathing
            .arm_once(self.clock.as_ref(), self.config.breathing_pause(), |epoch| -> TimerCallback {
                Box::new(move || {
                    let _ = tx.send(CoachEvent::BreathingElapsed { epoch });
                })
            });
        if let Err(e) = armed {
            warn!("Breathing timer failed to start: {}", e);
        }
    }

    fn apply_voice_outcome(&mut self, outcome: VoiceOutcome) {
        match outcome {
            VoiceOutcome::Idle | VoiceOutcome::Cancelled => {}
            VoiceOutcome::Intent(intent) => self.apply_intent(intent),
            VoiceOutcome::Unavailable => self.notify(CoachNotice::CapabilityUnavailable {
                capability: Capability::Recognition,
            }),
            VoiceOutcome::GaveUp { failures } => self.notify(CoachNotice::RecognitionGaveUp { failures }),
        }
        self.sync_listening();
    }

    fn sync_listening(&mut self) {
        let listening = self.voice.is_listening();
        if self.machine.set_listening(listening) {
            self.notify(CoachNotice::ListeningChanged { listening });
            self.publish_state();
        }
    }

    fn play_click(&mut self, count: u32) {
        if self.machine.state().audio_enabled {
            self.click.click(count);
        }
    }

    fn speak(&mut self, text: &str) {
        match self.speech.speak(text) {
            SpeakOutcome::Spoken => self.notify(CoachNotice::Spoke { text: text.to_string() }),
            SpeakOutcome::Unavailable { first: true } => self.notify(CoachNotice::CapabilityUnavailable {
                capability: Capability::Synthesis,
            }),
            SpeakOutcome::Unavailable { first: false } | SpeakOutcome::Muted | SpeakOutcome::Failed => {}
        }
    }

    fn publish_state(&self) {
        self.notify(CoachNotice::StateChanged {
            snapshot: self.snapshot(),
            timestamp: Utc::now(),
        });
    }

    fn notify(&self, notice: CoachNotice) {
        if self.notices_rx.is_some() {
            return;
        }
        if self.notices_tx.send(notice).is_err() {
            trace!("notice receiver dropped");
        }
    }
}

impl Drop for CoachOrchestrator {
    fn drop(&mut self) {
        self.close();
    }
}
