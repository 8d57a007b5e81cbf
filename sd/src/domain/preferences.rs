//! User preference model with additive merge semantics

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ingredient::normalize_name;

/// Self-reported cooking skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for SkillLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("Unknown skill level: {}", other)),
        }
    }
}

/// The constraint set for one conversation.
///
/// Sets are ordered so everything downstream (filters, prompts, logs)
/// sees them in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub dietary_restrictions: BTreeSet<String>,
    pub allergies: BTreeSet<String>,
    pub cuisine_preferences: BTreeSet<String>,
    pub skill_level: Option<SkillLevel>,
}

impl Preferences {
    /// Apply a delta. Sets grow by union; the allergy set shrinks only
    /// through `remove_allergies`. Absent fields leave prior values alone.
    pub fn apply(&mut self, delta: &PreferenceDelta) {
        if let Some(restrictions) = &delta.dietary_restrictions {
            for r in restrictions {
                self.dietary_restrictions.insert(normalize_name(r));
            }
        }
        if let Some(allergies) = &delta.allergies {
            for a in allergies {
                self.allergies.insert(normalize_name(a));
            }
        }
        if let Some(removed) = &delta.remove_allergies {
            for a in removed {
                self.allergies.remove(&normalize_name(a));
            }
        }
        if let Some(cuisines) = &delta.cuisine_preferences {
            for c in cuisines {
                self.cuisine_preferences.insert(normalize_name(c));
            }
        }
        if let Some(skill) = delta.skill_level {
            self.skill_level = Some(skill);
        }
    }

    /// Number of active hard and soft constraints, used by the planner
    pub fn constraint_count(&self) -> usize {
        self.dietary_restrictions.len() + self.allergies.len() + self.cuisine_preferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraint_count() == 0 && self.skill_level.is_none()
    }

    pub fn skill(&self) -> SkillLevel {
        self.skill_level.unwrap_or_default()
    }
}

/// Preference changes extracted from one message.
/// `None` means "the message said nothing about this field".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceDelta {
    #[serde(default)]
    pub dietary_restrictions: Option<Vec<String>>,
    #[serde(default)]
    pub allergies: Option<Vec<String>>,
    #[serde(default)]
    pub remove_allergies: Option<Vec<String>>,
    #[serde(default)]
    pub cuisine_preferences: Option<Vec<String>>,
    #[serde(default)]
    pub skill_level: Option<SkillLevel>,
}

impl PreferenceDelta {
    pub fn is_empty(&self) -> bool {
        fn blank(v: &Option<Vec<String>>) -> bool {
            v.as_ref().map(|l| l.is_empty()).unwrap_or(true)
        }
        blank(&self.dietary_restrictions)
            && blank(&self.allergies)
            && blank(&self.remove_allergies)
            && blank(&self.cuisine_preferences)
            && self.skill_level.is_none()
    }
}
