//! Performance instruction sets: one synthesis request.

use serde::{Deserialize, Serialize};

/// Upper bound for [`EmotionalState::intensity`].
pub const MAX_INTENSITY: u8 = 100;

/// A single synthesis request for one character.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceInstructionSet {
    /// Must equal the `character_id` of the model the request is run against.
    pub character_id: String,
    pub scene_context: SceneContext,
    pub emotional_state: EmotionalState,
    pub physical_state: PhysicalState,
    /// Ordered stage directions.
    pub actions: Vec<ActionCue>,
    /// Ordered dialogue lines.
    pub dialogue: Vec<DialogueLine>,
    pub modality_instructions: ModalityInstructions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneContext {
    pub location: String,
    pub time_of_day: String,
    pub mood: String,
    pub other_characters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionalState {
    pub primary: String,
    /// Requested intensity, 0–100.
    pub intensity: u8,
    pub secondary: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicalState {
    pub posture: String,
    pub energy_level: String,
    pub conditions: Vec<String>,
}

/// A stage direction with an optional timing hint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActionCue {
    pub description: String,
    pub start_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// A dialogue line with an optional timing hint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialogueLine {
    pub text: String,
    pub start_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub emotion: Option<String>,
}

/// Free-form instructions addressed to a single modality.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModalityInstructions {
    pub visual: Vec<String>,
    pub audio: Vec<String>,
    pub animation: Vec<String>,
}

/// Which ordered list a timing hint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintList {
    Dialogue,
    Actions,
}

impl std::fmt::Display for HintList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HintList::Dialogue => write!(f, "dialogue"),
            HintList::Actions => write!(f, "actions"),
        }
    }
}

/// A timing hint that goes backwards relative to the previous hint in its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingViolation {
    pub list: HintList,
    /// Index of the offending entry.
    pub index: usize,
    pub previous_ms: u64,
    pub current_ms: u64,
}

impl PerformanceInstructionSet {
    /// Timing hints that decrease within their own list.
    ///
    /// Entries without a hint are skipped; the comparison is against the most
    /// recent entry that had one. Lists are never re-sorted.
    pub fn timing_violations(&self) -> Vec<TimingViolation> {
        let mut violations = scan_hints(
            HintList::Dialogue,
            self.dialogue.iter().map(|d| d.start_ms),
        );
        violations.extend(scan_hints(
            HintList::Actions,
            self.actions.iter().map(|a| a.start_ms),
        ));
        violations
    }

    /// Distinct dialogue and action start hints in ascending order.
    pub fn anchor_timestamps(&self) -> Vec<u64> {
        let mut anchors: Vec<u64> = self
            .dialogue
            .iter()
            .filter_map(|d| d.start_ms)
            .chain(self.actions.iter().filter_map(|a| a.start_ms))
            .collect();
        anchors.sort_unstable();
        anchors.dedup();
        anchors
    }
}

fn scan_hints(list: HintList, hints: impl Iterator<Item = Option<u64>>) -> Vec<TimingViolation> {
    let mut violations = Vec::new();
    let mut previous: Option<u64> = None;
    for (index, hint) in hints.enumerate() {
        let Some(current) = hint else { continue };
        if let Some(prev) = previous {
            if current < prev {
                violations.push(TimingViolation {
                    list,
                    index,
                    previous_ms: prev,
                    current_ms: current,
                });
            }
        }
        previous = Some(current);
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(start: Option<u64>) -> DialogueLine {
        DialogueLine {
            text: "…".to_string(),
            start_ms: start,
            ..DialogueLine::default()
        }
    }

    fn cue(start: Option<u64>) -> ActionCue {
        ActionCue {
            description: "turns".to_string(),
            start_ms: start,
            duration_ms: None,
        }
    }

    #[test]
    fn test_monotonic_hints_have_no_violations() {
        let set = PerformanceInstructionSet {
            dialogue: vec![line(Some(0)), line(None), line(Some(400)), line(Some(400))],
            actions: vec![cue(Some(100)), cue(Some(900))],
            ..Default::default()
        };
        assert!(set.timing_violations().is_empty());
    }

    #[test]
    fn test_decreasing_hint_is_flagged_not_sorted() {
        let set = PerformanceInstructionSet {
            dialogue: vec![line(Some(500)), line(None), line(Some(200))],
            actions: vec![cue(Some(50)), cue(Some(10))],
            ..Default::default()
        };
        let violations = set.timing_violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(
            violations[0],
            TimingViolation {
                list: HintList::Dialogue,
                index: 2,
                previous_ms: 500,
                current_ms: 200,
            }
        );
        assert_eq!(violations[1].list, HintList::Actions);
        assert_eq!(set.dialogue[0].start_ms, Some(500));
    }

    #[test]
    fn test_anchor_timestamps_merge_and_dedup() {
        let set = PerformanceInstructionSet {
            dialogue: vec![line(Some(300)), line(Some(100))],
            actions: vec![cue(Some(100)), cue(None), cue(Some(700))],
            ..Default::default()
        };
        assert_eq!(set.anchor_timestamps(), vec![100, 300, 700]);
    }
}
