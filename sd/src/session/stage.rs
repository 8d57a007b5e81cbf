//! Conversation stage machine
//!
//! A turn walks the stages from its entry point to a terminal stage.
//! Only [`Stage::CollectingPrefs`] and [`Stage::AwaitingSelection`]
//! persist between turns; every other stage collapses back to
//! [`Stage::Initial`] when the next message arrives.

use serde::{Deserialize, Serialize};

/// Where a turn currently is in the conversation pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fresh turn, nothing decided yet
    #[default]
    Initial,
    /// Merging stated preferences and deciding where to route
    CollectingPrefs,
    /// Applying pantry mutations
    PantryOp,
    /// Querying and ranking recipe candidates
    Searching,
    /// Answering a cooking question without a recipe search
    General,
    /// Recommendations are being shown to the user
    PresentingOptions,
    /// Waiting for the user to pick one of the presented options
    AwaitingSelection,
    /// Rewriting the selected recipe against the pantry
    Adapting,
    /// Turn finished successfully
    Done,
    /// Turn finished with an error response
    Error,
}

impl Stage {
    /// Stages that survive between turns
    pub fn is_persistent(&self) -> bool {
        matches!(self, Stage::CollectingPrefs | Stage::AwaitingSelection)
    }

    /// Terminal stages for a single turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }

    /// The stage a new turn starts from, given the persisted stage
    pub fn resume_stage(&self) -> Stage {
        if self.is_persistent() { *self } else { Stage::Initial }
    }

    /// Whether the machine allows moving from `self` to `next`
    pub fn can_transition(&self, next: Stage) -> bool {
        use Stage::*;
        match self {
            Initial => matches!(next, CollectingPrefs | Error),
            // Dispatch point: ambiguous turns stay here, everything
            // else routes by intent
            CollectingPrefs => matches!(next, CollectingPrefs | PantryOp | Searching | General | Adapting | Error),
            PantryOp => matches!(next, Searching | Done | Error),
            Searching => matches!(next, PresentingOptions | Error),
            General => matches!(next, Done | Error),
            PresentingOptions => matches!(next, AwaitingSelection),
            // A non-selection message abandons the pending options and
            // re-enters the pipeline
            AwaitingSelection => matches!(next, CollectingPrefs | Error),
            Adapting => matches!(next, Done | Error),
            Done | Error => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::CollectingPrefs => "collecting_prefs",
            Stage::PantryOp => "pantry_op",
            Stage::Searching => "searching",
            Stage::General => "general",
            Stage::PresentingOptions => "presenting_options",
            Stage::AwaitingSelection => "awaiting_selection",
            Stage::Adapting => "adapting",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_two_stages_persist() {
        let persistent: Vec<Stage> = [
            Stage::Initial,
            Stage::CollectingPrefs,
            Stage::PantryOp,
            Stage::Searching,
            Stage::General,
            Stage::PresentingOptions,
            Stage::AwaitingSelection,
            Stage::Adapting,
            Stage::Done,
            Stage::Error,
        ]
        .into_iter()
        .filter(Stage::is_persistent)
        .collect();

        assert_eq!(persistent, vec![Stage::CollectingPrefs, Stage::AwaitingSelection]);
    }

    #[test]
    fn test_resume_stage_collapses_transient_stages() {
        assert_eq!(Stage::Done.resume_stage(), Stage::Initial);
        assert_eq!(Stage::Error.resume_stage(), Stage::Initial);
        assert_eq!(Stage::PresentingOptions.resume_stage(), Stage::Initial);
        assert_eq!(Stage::AwaitingSelection.resume_stage(), Stage::AwaitingSelection);
        assert_eq!(Stage::CollectingPrefs.resume_stage(), Stage::CollectingPrefs);
    }

    #[test]
    fn test_search_turn_walk() {
        let walk = [
            Stage::Initial,
            Stage::CollectingPrefs,
            Stage::Searching,
            Stage::PresentingOptions,
            Stage::AwaitingSelection,
        ];
        for pair in walk.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {} should be legal", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_selection_turn_walk() {
        let walk = [
            Stage::AwaitingSelection,
            Stage::CollectingPrefs,
            Stage::Adapting,
            Stage::Done,
        ];
        for pair in walk.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {} should be legal", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_split_intent_walk_routes_mutation_before_search() {
        assert!(Stage::CollectingPrefs.can_transition(Stage::PantryOp));
        assert!(Stage::PantryOp.can_transition(Stage::Searching));
    }

    #[test]
    fn test_terminal_stages_have_no_exits() {
        for next in [Stage::Initial, Stage::CollectingPrefs, Stage::Done, Stage::Error] {
            assert!(!Stage::Done.can_transition(next));
            assert!(!Stage::Error.can_transition(next));
        }
    }

    #[test]
    fn test_presenting_always_moves_to_awaiting() {
        assert!(Stage::PresentingOptions.can_transition(Stage::AwaitingSelection));
        assert!(!Stage::PresentingOptions.can_transition(Stage::Done));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Stage::AwaitingSelection).unwrap();
        assert_eq!(json, "\"awaiting_selection\"");
    }
}
