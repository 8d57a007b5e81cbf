//! Constraint gate
//!
//! Last stop before a recipe reaches the user. Re-checks the fully
//! adapted ingredient list against allergies and dietary restrictions,
//! so a substitution or adaptation can never smuggle a violating
//! ingredient past the ranker's filters. Every response path that
//! carries an adapted recipe goes through here, no exceptions.

use tracing::debug;

use crate::domain::{AdaptedRecipe, DietVerdict, Preferences, constraint_matches, diet_verdict};
use crate::error::TurnError;

/// Check an adapted recipe against the session constraints.
///
/// All ingredient lines count, including to-buy entries: an allergen
/// on the shopping list still ends up in the dish. Returns every
/// violation found, not just the first.
pub fn check(adapted: &AdaptedRecipe, preferences: &Preferences) -> Result<(), TurnError> {
    let mut violations = Vec::new();

    for ingredient in &adapted.ingredients {
        for allergy in &preferences.allergies {
            if constraint_matches(allergy, &ingredient.name) {
                violations.push(format!("'{}' conflicts with allergy '{}'", ingredient.name, allergy));
            }
        }
    }

    let names: Vec<&str> = adapted.ingredients.iter().map(|i| i.name.as_str()).collect();
    let no_tags = std::collections::BTreeSet::new();
    for restriction in &preferences.dietary_restrictions {
        if let DietVerdict::Contradicted(offenders) = diet_verdict(restriction, names.iter().copied(), &no_tags) {
            for offender in offenders {
                violations.push(format!("'{}' conflicts with the {} diet", offender, restriction));
            }
        }
    }

    violations.sort();
    violations.dedup();

    debug!(
        recipe_id = adapted.recipe_id,
        violations = violations.len(),
        "gate::check: called"
    );

    if violations.is_empty() {
        Ok(())
    } else {
        Err(TurnError::ConstraintViolation { violations })
    }
}
