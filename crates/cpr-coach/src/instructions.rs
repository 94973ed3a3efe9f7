//! Instruction text for each step and the fixed announcements.

use crate::intent::{VoiceIntent, KEYWORD_TABLE};
use crate::procedure::Step;

/// Display and spoken text for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInstructions {
    pub title: &'static str,
    pub visual: &'static str,
    pub instruction: &'static [&'static str],
    /// What the coach says when the step is entered or repeated.
    pub audio: &'static str,
}

pub const START_ANNOUNCEMENT: &str =
    "Starting CPR. Beginning chest compressions. Push hard and fast at least 2 inches deep.";
pub const STOP_ANNOUNCEMENT: &str = "CPR stopped. Check for pulse and breathing.";
pub const RESUME_ANNOUNCEMENT: &str = "Continue compressions. Push hard and fast.";

/// Headline while compressions are running.
pub const COMPRESS_HEADLINE: &str = "PUSH HARD & FAST";
/// Headline for every other active step.
pub const BREATHE_HEADLINE: &str = "RESCUE BREATHS";

impl StepInstructions {
    pub fn for_step(step: Step) -> &'static StepInstructions {
        match step {
            Step::CheckResponsiveness => &CHECK_RESPONSIVENESS,
            Step::PositionHands => &POSITION_HANDS,
            Step::Compress => &COMPRESS,
            Step::Breathe => &BREATHE,
            Step::Cycle => &CYCLE,
        }
    }

    /// Bullet list as shown on screen.
    pub fn bullets(&self) -> String {
        self.instruction
            .iter()
            .map(|line| format!("• {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

const CHECK_RESPONSIVENESS: StepInstructions = StepInstructions {
    title: "1. Check Responsiveness",
    visual: "👤 Tap shoulders firmly and shout 'Are you okay?'",
    instruction: &[
        "Tap the person's shoulders firmly",
        "Shout 'Are you okay?'",
        "Check for normal breathing",
        "Call 911 or have someone else call",
    ],
    audio: "Tap the person's shoulders firmly and shout 'Are you okay?'. Check for normal breathing. Call 911 immediately.",
};

const POSITION_HANDS: StepInstructions = StepInstructions {
    title: "2. Position Hands",
    visual: "✋ Place heel of hand on center of chest between nipples",
    instruction: &[
        "Place heel of one hand on center of chest",
        "Between the nipples on breastbone",
        "Place other hand on top, interlacing fingers",
        "Keep arms straight, shoulders over hands",
    ],
    audio: "Place the heel of one hand on the center of the chest between the nipples. Place your other hand on top and interlace your fingers. Keep your arms straight.",
};

const COMPRESS: StepInstructions = StepInstructions {
    title: "3. Chest Compressions",
    visual: "💓 Push hard and fast at least 2 inches deep",
    instruction: &[
        "Push hard and fast at least 2 inches deep",
        "Allow complete chest recoil",
        "Minimize interruptions",
        "Count out loud: 1, 2, 3...",
    ],
    audio: "Push hard and fast at least 2 inches deep. Allow the chest to come back up completely between compressions.",
};

const BREATHE: StepInstructions = StepInstructions {
    title: "4. Rescue Breaths",
    visual: "💨 Tilt head back, lift chin, give 2 breaths",
    instruction: &[
        "Tilt head back, lift chin",
        "Pinch nose closed",
        "Make seal over mouth",
        "Give 2 breaths, 1 second each",
    ],
    audio: "Tilt the head back and lift the chin. Pinch the nose closed and give 2 rescue breaths, one second each.",
};

const CYCLE: StepInstructions = StepInstructions {
    title: "5. Continue Cycles",
    visual: "🔄 30 compressions, then 2 breaths",
    instruction: &[
        "Continue 30 compressions, 2 breaths",
        "Don't stop until help arrives",
        "Switch with someone every 2 minutes if possible",
    ],
    audio: "Continue cycles of 30 compressions followed by 2 rescue breaths. Don't stop until emergency help arrives.",
};

/// Spoken when the last compression of a cycle lands.
pub fn breathing_announcement(compressions: u32, breaths: u32) -> String {
    format!(
        "{compressions} compressions complete. Give {breaths} rescue breaths. Tilt head back, lift chin, pinch nose, and give {breaths} breaths."
    )
}

/// Spoken before handing off to the platform dialer.
pub fn emergency_announcement(number: &str) -> String {
    format!("Calling {number}. Stay on the line and follow the dispatcher's instructions. Keep doing CPR if you can.")
}

/// Spoken for the help intent: one example phrase per command.
pub fn help_announcement() -> String {
    let examples: Vec<&str> = KEYWORD_TABLE
        .iter()
        .filter(|(intent, _)| *intent != VoiceIntent::Help)
        .filter_map(|(_, phrases)| phrases.first().copied())
        .collect();
    format!("You can say: {}, or help.", examples.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_has_text() {
        for step in Step::ALL {
            let text = StepInstructions::for_step(step);
            assert!(!text.title.is_empty());
            assert!(!text.audio.is_empty());
            assert!(!text.instruction.is_empty());
            assert!(!text.visual.is_empty());
        }
    }

    #[test]
    fn bullets_are_one_per_line() {
        let bullets = StepInstructions::for_step(Step::Cycle).bullets();
        assert_eq!(bullets.lines().count(), 3);
        assert!(bullets.starts_with("• Continue 30 compressions"));
    }

    #[test]
    fn help_lists_the_commands() {
        let help = help_announcement();
        assert!(help.contains("start cpr"));
        assert!(help.contains("call 911"));
        assert!(help.ends_with("or help."));
    }

    #[test]
    fn breathing_announcement_uses_counts() {
        assert!(breathing_announcement(30, 2).starts_with("30 compressions complete. Give 2 rescue breaths."));
    }
}
