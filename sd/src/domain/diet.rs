//! Diet compliance knowledge
//!
//! Maps each dietary restriction the assistant understands to the
//! ingredients that contradict it. The ranker's pre-filter and the
//! quality gate's post-adaptation re-check both decide compliance here,
//! so a candidate dropped early and an adapted recipe blocked late can
//! never disagree.

use std::collections::BTreeSet;

use super::ingredient::{constraint_matches, normalize_name};

const MEAT: &[&str] = &[
    "chicken", "beef", "pork", "lamb", "veal", "bacon", "ham", "turkey", "duck", "sausage", "chorizo", "prosciutto",
    "gelatin",
];

const SEAFOOD: &[&str] = &[
    "fish", "salmon", "tuna", "cod", "anchovy", "shrimp", "prawn", "crab", "lobster", "mussel", "clam", "oyster",
    "squid",
];

const DAIRY: &[&str] = &["milk", "butter", "cream", "cheese", "yogurt", "ghee", "parmesan", "mozzarella", "feta"];

const GLUTEN: &[&str] = &[
    "flour", "wheat", "pasta", "spaghetti", "noodle", "bread", "breadcrumb", "couscous", "barley", "rye", "beer",
    "soy sauce", "tortilla",
];

const ANIMAL_EXTRAS: &[&str] = &["egg", "honey", "mayonnaise", "lard"];

/// Verdict for one restriction against one recipe's metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DietVerdict {
    /// No conflicting ingredient and the recipe is tagged for the diet
    Compliant,
    /// No conflicting ingredient, but nothing verifies compliance either
    Unverified,
    /// These ingredients contradict the restriction
    Contradicted(Vec<String>),
}

/// Ingredients that contradict a restriction; empty slice when the
/// restriction carries no ingredient-level knowledge. Keys are in
/// normalized form ("gluten free", not "gluten-free").
fn conflict_list(restriction: &str) -> Vec<&'static str> {
    match restriction {
        "vegetarian" => [MEAT, SEAFOOD].concat(),
        "vegan" => [MEAT, SEAFOOD, DAIRY, ANIMAL_EXTRAS].concat(),
        "pescatarian" => MEAT.to_vec(),
        "gluten free" => GLUTEN.to_vec(),
        "dairy free" => DAIRY.to_vec(),
        _ => Vec::new(),
    }
}

/// Tags that verify compliance with a restriction. A vegan recipe is
/// vegetarian and pescatarian by inclusion.
fn satisfying_tags(restriction: &str) -> &'static [&'static str] {
    match restriction {
        "vegetarian" => &["vegetarian", "vegan"],
        "pescatarian" => &["pescatarian", "vegetarian", "vegan"],
        "vegan" => &["vegan"],
        "gluten free" => &["gluten free"],
        "dairy free" => &["dairy free", "vegan"],
        _ => &[],
    }
}

/// Judge one restriction against a recipe's ingredient names and tags.
///
/// A conflicting ingredient contradicts even a tagged recipe (labels
/// lose to contents). With no conflict found, a matching tag verifies
/// compliance; otherwise the verdict is [`DietVerdict::Unverified`] and
/// the caller must disclose, never assume.
pub fn diet_verdict<'a, I>(restriction: &str, ingredients: I, tags: &BTreeSet<String>) -> DietVerdict
where
    I: IntoIterator<Item = &'a str>,
{
    let restriction = normalize_name(restriction);

    let conflicts = conflict_list(&restriction);
    let mut offending: Vec<String> = ingredients
        .into_iter()
        .filter(|name| conflicts.iter().any(|c| constraint_matches(c, name)))
        .map(|name| name.to_string())
        .collect();
    if !offending.is_empty() {
        offending.sort();
        offending.dedup();
        return DietVerdict::Contradicted(offending);
    }

    let satisfied = satisfying_tags(&restriction)
        .iter()
        .chain(std::iter::once(&restriction.as_str()))
        .any(|wanted| tags.iter().any(|tag| normalize_name(tag) == *wanted));

    if satisfied { DietVerdict::Compliant } else { DietVerdict::Unverified }
}
