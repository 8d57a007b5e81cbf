//! Hybrid ranker
//!
//! Turns the raw candidate list into a constraint-safe, deterministic
//! top three. Safety filters run first and are never relaxed; the
//! missing-ingredient allowance is the only knob the single fallback
//! pass may loosen. Scoring favors pantry coverage over raw semantic
//! similarity because coverage is the waste-reduction signal.

use chrono::NaiveDate;
use pantrystore::PantryItem;
use tracing::debug;

use crate::config::RankerConfig;
use crate::domain::{
    CandidateRecipe, DietVerdict, Difficulty, Preferences, RankedRecommendation, SkillLevel, constraint_matches,
    diet_verdict,
};

/// How many recommendations a turn presents
pub const TOP_N: usize = 3;

/// What ranking produced for the turn
#[derive(Debug, Clone)]
pub enum RankOutcome {
    Ranked {
        recommendations: Vec<RankedRecommendation>,
        /// Whether the allow-missing relaxation pass ran
        relaxed: bool,
        /// Candidates that survived the safety filters
        pool_size: usize,
    },
    /// Nothing survived even the relaxation pass. The shopping list
    /// completes the cheapest near-misses among the safe candidates.
    NoSafeMatch { shopping_list: Vec<String> },
}

/// A safety-filtered candidate with its per-signal measurements
struct Scored {
    recipe: CandidateRecipe,
    similarity: f64,
    diet_unverified: bool,
    coverage: f64,
    missing: Vec<String>,
    expiring_used: Vec<String>,
    composite: f64,
}

/// Rank candidates against the pantry and preferences.
///
/// `today` anchors expiration math so identical inputs rank identically
/// regardless of when the test or replay runs.
pub fn rank(
    candidates: &[(CandidateRecipe, f64)],
    pantry: &[PantryItem],
    preferences: &Preferences,
    config: &RankerConfig,
    today: NaiveDate,
) -> RankOutcome {
    let pool = score_pool(candidates, pantry, preferences, config, today);
    debug!(
        candidates = candidates.len(),
        safe = pool.len(),
        "rank: safety filters applied"
    );

    let strict = select(&pool, config.allow_missing);
    if strict.len() >= TOP_N {
        return ranked(strict, false, pool.len());
    }

    // One relaxation pass, then give up with a shopping list.
    let relaxed = select(&pool, config.allow_missing + config.relax_increment);
    if !relaxed.is_empty() {
        return ranked(relaxed, true, pool.len());
    }

    RankOutcome::NoSafeMatch {
        shopping_list: shopping_list(&pool),
    }
}

fn ranked(selected: Vec<&Scored>, relaxed: bool, pool_size: usize) -> RankOutcome {
    let recommendations = selected
        .into_iter()
        .map(|s| {
            let mut recipe = s.recipe.clone();
            recipe.source_score = s.similarity;
            RankedRecommendation {
                recipe,
                composite_score: s.composite,
                coverage_fraction: s.coverage,
                missing_ingredients: s.missing.clone(),
                uses_expiring: !s.expiring_used.is_empty(),
                expiring_used: s.expiring_used.clone(),
                diet_unverified: s.diet_unverified,
            }
        })
        .collect();
    RankOutcome::Ranked {
        recommendations,
        relaxed,
        pool_size,
    }
}

/// Apply both hard safety filters and measure every survivor
fn score_pool(
    candidates: &[(CandidateRecipe, f64)],
    pantry: &[PantryItem],
    preferences: &Preferences,
    config: &RankerConfig,
    today: NaiveDate,
) -> Vec<Scored> {
    let mut pool = Vec::new();

    'candidates: for (recipe, similarity) in candidates {
        // Allergy intersection drops the candidate outright.
        if recipe
            .ingredient_names()
            .any(|name| preferences.allergies.iter().any(|a| constraint_matches(a, name)))
        {
            continue;
        }

        let mut diet_unverified = false;
        for restriction in &preferences.dietary_restrictions {
            match diet_verdict(restriction, recipe.ingredient_names(), &recipe.tags) {
                DietVerdict::Contradicted(_) => continue 'candidates,
                DietVerdict::Unverified => diet_unverified = true,
                DietVerdict::Compliant => {}
            }
        }

        let (coverage, missing, expiring_used, bonus) = measure(recipe, pantry, config, today);
        let composite = composite_score(
            coverage,
            similarity.clamp(0.0, 1.0),
            bonus,
            recipe.difficulty,
            preferences.skill(),
            config,
        );

        pool.push(Scored {
            recipe: recipe.clone(),
            similarity: similarity.clamp(0.0, 1.0),
            diet_unverified,
            coverage,
            missing,
            expiring_used,
            composite,
        });
    }

    pool
}

/// Coverage fraction, missing list, expiring pantry items used, and the
/// pre-cap expiration bonus sum for one recipe.
fn measure(
    recipe: &CandidateRecipe,
    pantry: &[PantryItem],
    config: &RankerConfig,
    today: NaiveDate,
) -> (f64, Vec<String>, Vec<String>, f64) {
    let mut covered = 0usize;
    let mut missing: Vec<String> = Vec::new();
    let mut expiring_used: Vec<String> = Vec::new();
    let mut bonus = 0.0;

    let mut names: Vec<&str> = recipe.ingredient_names().collect();
    names.sort_unstable();
    names.dedup();
    let total = names.len();

    for name in names {
        match pantry.iter().find(|item| item.name == name) {
            Some(item) => {
                covered += 1;
                let tier = expiration_tier(item.days_until_expiry(today), config.expiring_window_days);
                if tier > 0.0 {
                    bonus += tier;
                    expiring_used.push(item.name.clone());
                }
            }
            None => missing.push(name.to_string()),
        }
    }

    let coverage = if total == 0 { 0.0 } else { covered as f64 / total as f64 };
    (coverage, missing, expiring_used, bonus)
}

/// Tiered urgency bonus per used pantry ingredient. Already-expired
/// items earn nothing; rescuing them is not a recommendation.
fn expiration_tier(days: Option<i64>, window_days: i64) -> f64 {
    match days {
        Some(d) if (0..=1).contains(&d) => 30.0,
        Some(d) if (2..=3).contains(&d) => 20.0,
        Some(d) if (4..=window_days).contains(&d) => 10.0,
        _ => 0.0,
    }
}

fn composite_score(
    coverage: f64,
    similarity: f64,
    bonus_sum: f64,
    difficulty: Option<Difficulty>,
    skill: SkillLevel,
    config: &RankerConfig,
) -> f64 {
    let expiration = bonus_sum.min(config.expiration_bonus_cap) / config.expiration_bonus_cap * 100.0;
    let base = config.weight_coverage * (coverage * 100.0)
        + config.weight_similarity * (similarity * 100.0)
        + config.weight_expiration * expiration;
    (base + skill_adjustment(difficulty, skill)).clamp(0.0, 100.0)
}

/// Small nudge toward recipes at the cook's level: +5 for a match, -5
/// for a recipe above it, untagged recipes unadjusted.
fn skill_adjustment(difficulty: Option<Difficulty>, skill: SkillLevel) -> f64 {
    let Some(difficulty) = difficulty else { return 0.0 };
    let recipe_level = match difficulty {
        Difficulty::Easy => 0,
        Difficulty::Medium => 1,
        Difficulty::Hard => 2,
    };
    let cook_level = match skill {
        SkillLevel::Beginner => 0,
        SkillLevel::Intermediate => 1,
        SkillLevel::Advanced => 2,
    };
    if recipe_level == cook_level {
        5.0
    } else if recipe_level > cook_level {
        -5.0
    } else {
        0.0
    }
}

/// Missing-count filter, deterministic sort, distinct-id top three
fn select(pool: &[Scored], allow_missing: usize) -> Vec<&Scored> {
    let mut qualifying: Vec<&Scored> = pool.iter().filter(|s| s.missing.len() <= allow_missing).collect();

    qualifying.sort_by(|a, b| {
        b.composite
            .total_cmp(&a.composite)
            .then_with(|| a.missing.len().cmp(&b.missing.len()))
            .then_with(|| b.expiring_used.len().cmp(&a.expiring_used.len()))
            .then_with(|| a.recipe.id.cmp(&b.recipe.id))
    });

    let mut seen = std::collections::BTreeSet::new();
    qualifying.retain(|s| seen.insert(s.recipe.id.clone()));
    qualifying.truncate(TOP_N);
    qualifying
}

/// Union of the missing sets of the three cheapest-to-complete safe
/// candidates, so buying the list unlocks at least one real recipe.
fn shopping_list(pool: &[Scored]) -> Vec<String> {
    let mut nearest: Vec<&Scored> = pool.iter().collect();
    nearest.sort_by(|a, b| {
        a.missing
            .len()
            .cmp(&b.missing.len())
            .then_with(|| a.recipe.id.cmp(&b.recipe.id))
    });

    let mut list: Vec<String> = nearest
        .iter()
        .take(TOP_N)
        .flat_map(|s| s.missing.iter().cloned())
        .collect();
    list.sort();
    list.dedup();
    list
}
