//! Procedure state machine for guided CPR.
//!
//! ```text
//! CheckResponsiveness → PositionHands → Compress ⇄ Breathe → Cycle
//!                                          (cycle_count++ on each return)
//! ```
//!
//! The machine is the only place procedure state changes. Every operation
//! returns a [`Transition`] telling the orchestrator which side effects to run;
//! an operation that is not valid in the current state returns
//! [`Transition::None`] and leaves the state untouched.

use serde::Serialize;
use tracing::debug;

/// Compressions per cycle when nothing else is configured.
pub const DEFAULT_COMPRESSIONS_PER_CYCLE: u32 = 30;

/// One step of the guided procedure, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CheckResponsiveness,
    PositionHands,
    Compress,
    Breathe,
    Cycle,
}

impl Step {
    /// All steps in order.
    pub const ALL: [Step; 5] = [
        Step::CheckResponsiveness,
        Step::PositionHands,
        Step::Compress,
        Step::Breathe,
        Step::Cycle,
    ];

    /// Position of this step in [`Step::ALL`].
    pub fn index(self) -> usize {
        match self {
            Step::CheckResponsiveness => 0,
            Step::PositionHands => 1,
            Step::Compress => 2,
            Step::Breathe => 3,
            Step::Cycle => 4,
        }
    }

    /// Following step, or `None` on the last one.
    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.index() + 1).copied()
    }

    /// Preceding step, or `None` on the first one.
    pub fn previous(self) -> Option<Step> {
        self.index().checked_sub(1).map(|i| Step::ALL[i])
    }

    pub fn is_first(self) -> bool {
        self.previous().is_none()
    }

    pub fn is_last(self) -> bool {
        self.next().is_none()
    }
}

/// Observable procedure state for one coaching session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureState {
    pub current_step: Step,
    pub is_active: bool,
    /// Compressions in the current phase, `0..=compressions_per_cycle`.
    pub compression_count: u32,
    /// Completed Compress → Breathe → Compress loops.
    pub cycle_count: u32,
    pub is_listening: bool,
    pub audio_enabled: bool,
}

impl Default for ProcedureState {
    fn default() -> Self {
        Self {
            current_step: Step::CheckResponsiveness,
            is_active: false,
            compression_count: 0,
            cycle_count: 0,
            is_listening: false,
            audio_enabled: true,
        }
    }
}

/// What an operation did. The orchestrator maps these to timers and speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed (invalid or redundant operation).
    None,
    /// `start()` began compressions.
    Started,
    /// A compression was counted; carries the new count.
    Counted(u32),
    /// The cycle's last compression landed; the breathing pause should begin.
    BreathingDue,
    /// The breathing pause finished; compressions resume. Carries the new cycle count.
    Resumed(u32),
    /// `stop()` deactivated the procedure.
    Stopped,
    /// Manual navigation moved to the carried step.
    Moved(Step),
}

/// Owns [`ProcedureState`] and enforces its transitions.
#[derive(Debug, Clone)]
pub struct ProcedureStateMachine {
    state: ProcedureState,
    compressions_per_cycle: u32,
    // Set when the last compression of a cycle lands, cleared on resume or stop.
    // Manual navigation during the pause does not clear it.
    breathing_pending: bool,
}

impl Default for ProcedureStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSIONS_PER_CYCLE)
    }
}

impl ProcedureStateMachine {
    /// Create a machine at CheckResponsiveness, inactive.
    pub fn new(compressions_per_cycle: u32) -> Self {
        Self {
            state: ProcedureState::default(),
            compressions_per_cycle: compressions_per_cycle.max(1),
            breathing_pending: false,
        }
    }

    pub fn state(&self) -> &ProcedureState {
        &self.state
    }

    pub fn compressions_per_cycle(&self) -> u32 {
        self.compressions_per_cycle
    }

    /// True between the last compression of a cycle and the resume.
    pub fn is_breathing_pending(&self) -> bool {
        self.breathing_pending
    }

    /// Begin compressions. No-op while already active.
    pub fn start(&mut self) -> Transition {
        if self.state.is_active {
            debug!("start ignored: procedure already active");
            return Transition::None;
        }
        self.state.is_active = true;
        self.state.current_step = Step::Compress;
        self.state.compression_count = 0;
        self.state.cycle_count = 0;
        self.breathing_pending = false;
        Transition::Started
    }

    /// Deactivate. Keeps `current_step`; no-op while inactive.
    pub fn stop(&mut self) -> Transition {
        if !self.state.is_active {
            debug!("stop ignored: procedure not active");
            return Transition::None;
        }
        self.state.is_active = false;
        self.breathing_pending = false;
        Transition::Stopped
    }

    /// Count one compression. Valid only in Compress while active and not pausing.
    pub fn tick_compression(&mut self) -> Transition {
        if !self.state.is_active || self.state.current_step != Step::Compress || self.breathing_pending {
            debug!(step = ?self.state.current_step, active = self.state.is_active, "stray compression tick");
            return Transition::None;
        }
        let count = self.state.compression_count + 1;
        if count >= self.compressions_per_cycle {
            self.state.compression_count = 0;
            self.state.current_step = Step::Breathe;
            self.breathing_pending = true;
            return Transition::BreathingDue;
        }
        self.state.compression_count = count;
        Transition::Counted(count)
    }

    /// Finish the breathing pause and resume compressions.
    ///
    /// Valid only while a pause is pending and the procedure is still active, so a
    /// resume timer that fires after `stop()` changes nothing.
    pub fn complete_breathing_pause(&mut self) -> Transition {
        if !self.state.is_active || !self.breathing_pending {
            debug!(active = self.state.is_active, "stray breathing resume");
            return Transition::None;
        }
        self.breathing_pending = false;
        self.state.cycle_count += 1;
        self.state.compression_count = 0;
        self.state.current_step = Step::Compress;
        Transition::Resumed(self.state.cycle_count)
    }

    /// Move to the next step, clamped at the last one.
    pub fn advance(&mut self) -> Transition {
        match self.state.current_step.next() {
            Some(step) => {
                self.state.current_step = step;
                Transition::Moved(step)
            }
            None => Transition::None,
        }
    }

    /// Move to the previous step, clamped at the first one.
    pub fn retreat(&mut self) -> Transition {
        match self.state.current_step.previous() {
            Some(step) => {
                self.state.current_step = step;
                Transition::Moved(step)
            }
            None => Transition::None,
        }
    }

    pub fn set_listening(&mut self, listening: bool) -> bool {
        let changed = self.state.is_listening != listening;
        self.state.is_listening = listening;
        changed
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.state.audio_enabled != enabled;
        self.state.audio_enabled = enabled;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> ProcedureStateMachine {
        let mut machine = ProcedureStateMachine::default();
        assert_eq!(machine.start(), Transition::Started);
        machine
    }

    fn tick_n(machine: &mut ProcedureStateMachine, n: u32) -> Vec<Transition> {
        (0..n).map(|_| machine.tick_compression()).collect()
    }

    #[test]
    fn new_machine_is_idle_at_first_step() {
        let machine = ProcedureStateMachine::default();
        let state = machine.state();
        assert_eq!(state.current_step, Step::CheckResponsiveness);
        assert!(!state.is_active);
        assert_eq!(state.compression_count, 0);
        assert_eq!(state.cycle_count, 0);
    }

    #[test]
    fn start_enters_compress_and_resets_counters() {
        let machine = started();
        assert_eq!(machine.state().current_step, Step::Compress);
        assert!(machine.state().is_active);
    }

    #[test]
    fn start_while_active_is_noop() {
        let mut machine = started();
        tick_n(&mut machine, 7);
        let before = machine.state().clone();
        assert_eq!(machine.start(), Transition::None);
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn stop_is_idempotent_and_keeps_step() {
        let mut machine = started();
        tick_n(&mut machine, 3);
        assert_eq!(machine.stop(), Transition::Stopped);
        assert_eq!(machine.stop(), Transition::None);
        assert_eq!(machine.state().current_step, Step::Compress);
        assert!(!machine.state().is_active);
    }

    #[test]
    fn thirty_ticks_enter_breathe_exactly_once() {
        let mut machine = started();
        let transitions = tick_n(&mut machine, 30);
        let breathing = transitions.iter().filter(|t| **t == Transition::BreathingDue).count();
        assert_eq!(breathing, 1);
        assert_eq!(transitions[28], Transition::Counted(29));
        assert_eq!(transitions[29], Transition::BreathingDue);
        assert_eq!(machine.state().compression_count, 0);
        assert_eq!(machine.state().current_step, Step::Breathe);
        assert_eq!(machine.state().cycle_count, 0);
        assert!(machine.is_breathing_pending());
    }

    #[test]
    fn ticks_during_breathe_are_ignored() {
        let mut machine = started();
        tick_n(&mut machine, 30);
        assert!(tick_n(&mut machine, 5).iter().all(|t| *t == Transition::None));
        assert_eq!(machine.state().compression_count, 0);
    }

    #[test]
    fn resume_counts_cycle_and_returns_to_compress() {
        let mut machine = started();
        tick_n(&mut machine, 30);
        assert_eq!(machine.complete_breathing_pause(), Transition::Resumed(1));
        assert_eq!(machine.state().current_step, Step::Compress);
        assert_eq!(machine.state().compression_count, 0);
        assert_eq!(machine.complete_breathing_pause(), Transition::None);
        assert_eq!(machine.state().cycle_count, 1);
    }

    #[test]
    fn stop_during_breathing_makes_resume_a_noop() {
        let mut machine = started();
        tick_n(&mut machine, 30);
        machine.stop();
        assert!(!machine.is_breathing_pending());
        let before = machine.state().clone();
        assert_eq!(machine.complete_breathing_pause(), Transition::None);
        assert_eq!(machine.tick_compression(), Transition::None);
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn stray_events_after_stop_change_nothing() {
        let mut machine = started();
        tick_n(&mut machine, 12);
        machine.stop();
        let before = machine.state().clone();
        tick_n(&mut machine, 40);
        machine.complete_breathing_pause();
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn cycle_count_survives_navigation_during_breathe() {
        let mut machine = started();
        for loop_index in 1..=4u32 {
            tick_n(&mut machine, 30);
            for _ in 0..loop_index {
                machine.advance();
            }
            for _ in 0..(loop_index + 1) {
                machine.retreat();
            }
            assert!(machine.is_breathing_pending());
            assert_eq!(machine.complete_breathing_pause(), Transition::Resumed(loop_index));
            assert!(!machine.is_breathing_pending());
        }
        assert_eq!(machine.state().cycle_count, 4);
    }

    #[test]
    fn navigation_clamps_at_both_ends() {
        let mut machine = ProcedureStateMachine::default();
        assert_eq!(machine.retreat(), Transition::None);
        for expected in &Step::ALL[1..] {
            assert_eq!(machine.advance(), Transition::Moved(*expected));
        }
        assert_eq!(machine.advance(), Transition::None);
        assert_eq!(machine.state().current_step, Step::Cycle);
    }

    #[test]
    fn navigation_leaves_counters_alone() {
        let mut machine = started();
        tick_n(&mut machine, 9);
        machine.advance();
        machine.retreat();
        assert_eq!(machine.state().compression_count, 9);
        assert_eq!(machine.state().cycle_count, 0);
    }

    #[test]
    fn step_order_helpers() {
        assert!(Step::CheckResponsiveness.is_first());
        assert!(Step::Cycle.is_last());
        assert_eq!(Step::Compress.next(), Some(Step::Breathe));
        assert_eq!(Step::Compress.previous(), Some(Step::PositionHands));
    }
}
