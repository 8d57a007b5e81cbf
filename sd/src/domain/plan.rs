//! Per-turn task plans produced by the complexity planner

use serde::{Deserialize, Serialize};

/// How much explicit planning a turn receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// What a plan step talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTarget {
    Inventory,
    SearchIndex,
    TextGeneration,
    SubstitutionCatalog,
    /// Work done inside the orchestrator (ranking, gating)
    Internal,
}

impl std::fmt::Display for StepTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inventory => write!(f, "inventory"),
            Self::SearchIndex => write!(f, "search_index"),
            Self::TextGeneration => write!(f, "text_generation"),
            Self::SubstitutionCatalog => write!(f, "substitution_catalog"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// One ordered step of a task plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub target: StepTarget,
    pub action: String,
}

impl PlanStep {
    pub fn new(target: StepTarget, action: impl Into<String>) -> Self {
        Self {
            target,
            action: action.into(),
        }
    }
}

/// The plan for one turn. Created fresh per turn, kept only as
/// `last_plan` on the session for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub complexity: Complexity,
    pub ordered_steps: Vec<PlanStep>,
    pub success_criteria: Vec<String>,
    /// Human-readable relaxation order, logged, never parsed
    pub fallback_strategy: String,
}

impl TaskPlan {
    /// Distinct collaborators this plan touches (internal steps excluded)
    pub fn collaborator_count(&self) -> usize {
        let mut seen = std::collections::BTreeSet::new();
        for step in &self.ordered_steps {
            if step.target != StepTarget::Internal {
                seen.insert(step.target);
            }
        }
        seen.len()
    }
}
