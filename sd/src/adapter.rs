//! Recipe adapter
//!
//! Rewrites a chosen recipe against the household's pantry: quantities
//! scale to the target serving count, missing ingredients get a
//! substitute from the catalog (or, failing that, from the
//! text-generation collaborator), and whatever still cannot be covered
//! lands on the shopping list. Every output ingredient carries one of
//! three provenances: already in the pantry, substituted, or to buy.
//!
//! Adaptation is idempotent: feeding an [`AdaptedRecipe`] back in
//! against the same pantry and preferences changes no provenance and
//! no quantity.

use chrono::NaiveDate;
use pantrystore::PantryItem;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::{
    AdaptedIngredient, AdaptedRecipe, CandidateRecipe, DietVerdict, Preferences, Provenance, constraint_matches,
    diet_verdict, normalize_name,
};
use crate::llm::{JsonKind, ResponseSchema};
use crate::prompts::{PromptLoader, SubstituteContext};
use crate::router::Router;

const SUBSTITUTE_SCHEMA: ResponseSchema = ResponseSchema::with_optional(
    "substitute",
    &[],
    &[("substitute", JsonKind::String), ("reason", JsonKind::String)],
);

/// What adaptation starts from. Passing a previous adaptation back in
/// is legal and, against the same pantry and preferences, a no-op.
pub enum AdaptSource<'a> {
    Recipe(&'a CandidateRecipe),
    Adapted(&'a AdaptedRecipe),
}

/// One ingredient line before provenance resolution
struct Line {
    name: String,
    quantity: Option<f64>,
    unit: Option<String>,
    prior: Option<Provenance>,
}

impl AdaptSource<'_> {
    fn recipe_id(&self) -> &str {
        match self {
            Self::Recipe(r) => &r.id,
            Self::Adapted(a) => &a.recipe_id,
        }
    }

    fn title(&self) -> &str {
        match self {
            Self::Recipe(r) => &r.title,
            Self::Adapted(a) => &a.title,
        }
    }

    fn base_servings(&self) -> Option<u32> {
        match self {
            Self::Recipe(r) => r.servings,
            Self::Adapted(a) => Some(a.servings),
        }
    }

    fn instructions(&self) -> &[String] {
        match self {
            Self::Recipe(r) => &r.instructions,
            Self::Adapted(a) => &a.instructions,
        }
    }

    fn lines(&self) -> Vec<Line> {
        match self {
            Self::Recipe(r) => r
                .ingredients
                .iter()
                .map(|i| Line {
                    name: normalize_name(&i.name),
                    quantity: i.quantity,
                    unit: i.unit.clone(),
                    prior: None,
                })
                .collect(),
            Self::Adapted(a) => a
                .ingredients
                .iter()
                .map(|i| Line {
                    name: normalize_name(&i.name),
                    quantity: i.quantity,
                    unit: i.unit.clone(),
                    prior: Some(i.provenance.clone()),
                })
                .collect(),
        }
    }
}

/// Scales, substitutes, and annotates recipes against a pantry
pub struct RecipeAdapter {
    prompts: PromptLoader,
    /// Days ahead that count as "expiring soon" for the waste note
    expiring_window_days: i64,
}

impl RecipeAdapter {
    pub fn new(prompts: PromptLoader, expiring_window_days: i64) -> Self {
        Self {
            prompts,
            expiring_window_days,
        }
    }

    /// Adapt a recipe to the pantry. Never fails: a missing substitute
    /// is a shopping-list entry, not an error.
    pub async fn adapt(
        &self,
        source: AdaptSource<'_>,
        pantry: &[PantryItem],
        preferences: &Preferences,
        target_servings: u32,
        router: &Router,
        today: NaiveDate,
    ) -> AdaptedRecipe {
        let target_servings = target_servings.max(1);
        let factor = match source.base_servings() {
            Some(base) if base > 0 => f64::from(target_servings) / f64::from(base),
            _ => 1.0,
        };
        debug!(
            recipe_id = source.recipe_id(),
            target_servings, factor, "RecipeAdapter::adapt: called"
        );

        let mut ingredients = Vec::new();
        let mut swaps: Vec<(String, String)> = Vec::new();

        for line in source.lines() {
            let scaled = line.quantity.map(|q| scale(q, factor));

            // A substitution made earlier stays a substitution; the
            // swap already happened and must not be re-derived.
            if let Some(Provenance::Substituted { original }) = &line.prior
                && in_pantry(pantry, &line.name)
            {
                ingredients.push(AdaptedIngredient {
                    name: line.name,
                    quantity: scaled,
                    unit: line.unit,
                    provenance: Provenance::Substituted {
                        original: original.clone(),
                    },
                });
                continue;
            }

            if in_pantry(pantry, &line.name) {
                ingredients.push(AdaptedIngredient {
                    name: line.name,
                    quantity: scaled,
                    unit: line.unit,
                    provenance: Provenance::Pantry,
                });
                continue;
            }

            match self
                .find_substitute(&line.name, source.title(), pantry, preferences, router)
                .await
            {
                Some(substitute) => {
                    swaps.push((line.name.clone(), substitute.clone()));
                    ingredients.push(AdaptedIngredient {
                        name: substitute,
                        quantity: scaled,
                        unit: line.unit,
                        provenance: Provenance::Substituted { original: line.name },
                    });
                }
                None => ingredients.push(AdaptedIngredient {
                    name: line.name,
                    quantity: scaled,
                    unit: line.unit,
                    provenance: Provenance::ToBuy,
                }),
            }
        }

        let instructions = rewrite_instructions(source.instructions(), &swaps);

        let mut shopping_list: Vec<String> = ingredients
            .iter()
            .filter(|i| matches!(i.provenance, Provenance::ToBuy))
            .map(|i| i.name.clone())
            .collect();
        shopping_list.sort();
        shopping_list.dedup();

        let waste_note = self.waste_note(&ingredients, pantry, today);

        AdaptedRecipe {
            recipe_id: source.recipe_id().to_string(),
            title: source.title().to_string(),
            servings: target_servings,
            ingredients,
            instructions,
            shopping_list,
            waste_note,
        }
    }

    /// Best pantry-available substitute for a missing ingredient:
    /// catalog first, then one advisory model call. Both paths must
    /// produce something actually on hand and safe under the
    /// constraints, or the ingredient stays unresolved.
    async fn find_substitute(
        &self,
        ingredient: &str,
        title: &str,
        pantry: &[PantryItem],
        preferences: &Preferences,
        router: &Router,
    ) -> Option<String> {
        for candidate in router.lookup_substitutes(ingredient).await {
            let candidate = normalize_name(&candidate);
            if in_pantry(pantry, &candidate) && is_safe(&candidate, preferences) {
                return Some(candidate);
            }
        }

        if pantry.is_empty() {
            return None;
        }

        let context = SubstituteContext {
            ingredient: ingredient.to_string(),
            title: title.to_string(),
            pantry: json_names(pantry.iter().map(|i| i.name.as_str())),
            allergies: json_names(preferences.allergies.iter().map(String::as_str)),
            restrictions: json_names(preferences.dietary_restrictions.iter().map(String::as_str)),
        };
        let prompt = match self.prompts.render("substitute", &context) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(%err, "substitute prompt failed to render");
                return None;
            }
        };

        let suggestion = match router.generate_json(&prompt, &SUBSTITUTE_SCHEMA).await {
            Ok(value) => value.get("substitute").and_then(|v| v.as_str()).map(normalize_name),
            Err(err) => {
                debug!(%err, ingredient, "no model substitute, marking to-buy");
                None
            }
        };

        suggestion.filter(|s| !s.is_empty() && in_pantry(pantry, s) && is_safe(s, preferences))
    }

    /// Note the expiring pantry items this adaptation rescues
    fn waste_note(&self, ingredients: &[AdaptedIngredient], pantry: &[PantryItem], today: NaiveDate) -> Option<String> {
        let mut rescued: Vec<&str> = ingredients
            .iter()
            .filter(|i| !matches!(i.provenance, Provenance::ToBuy))
            .filter_map(|i| pantry.iter().find(|item| item.name == i.name))
            .filter(|item| {
                item.days_until_expiry(today)
                    .is_some_and(|d| (0..=self.expiring_window_days).contains(&d))
            })
            .map(|item| item.name.as_str())
            .collect();
        rescued.sort_unstable();
        rescued.dedup();

        match rescued.len() {
            0 => None,
            1 => Some(format!("Uses your {} before it expires.", rescued[0])),
            _ => Some(format!("Uses your {} before they expire.", join_names(&rescued))),
        }
    }
}

fn in_pantry(pantry: &[PantryItem], name: &str) -> bool {
    pantry.iter().any(|item| item.name == name)
}

/// Whether a substitute violates an allergy or contradicts a diet
fn is_safe(name: &str, preferences: &Preferences) -> bool {
    if preferences.allergies.iter().any(|a| constraint_matches(a, name)) {
        return false;
    }
    let no_tags = std::collections::BTreeSet::new();
    preferences
        .dietary_restrictions
        .iter()
        .all(|r| !matches!(diet_verdict(r, [name], &no_tags), DietVerdict::Contradicted(_)))
}

/// Two-decimal rounding keeps scaled amounts readable and stable under
/// repeated scaling by 1.0.
fn scale(quantity: f64, factor: f64) -> f64 {
    (quantity * factor * 100.0).round() / 100.0
}

/// Swap substituted ingredient names inside the instruction text.
/// Matches whole words, case-insensitively, tolerating a plural tail.
fn rewrite_instructions(instructions: &[String], swaps: &[(String, String)]) -> Vec<String> {
    let mut rewritten: Vec<String> = instructions.to_vec();
    for (original, substitute) in swaps {
        let pattern = format!(r"(?i)\b{}(?:e?s)?\b", regex::escape(original));
        let Ok(re) = Regex::new(&pattern) else { continue };
        for step in &mut rewritten {
            *step = re.replace_all(step, substitute.as_str()).into_owned();
        }
    }
    rewritten
}

fn json_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    serde_json::to_string(&names.collect::<Vec<_>>()).unwrap_or_else(|_| "[]".to_string())
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockInventory, MockSearchIndex, YamlCatalog};
    use crate::config::RouterConfig;
    use crate::domain::RecipeIngredient;
    use crate::llm::mock::MockLlmClient;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn adapter() -> RecipeAdapter {
        RecipeAdapter::new(PromptLoader::embedded_only(), 7)
    }

    fn router(llm: MockLlmClient) -> Router {
        Router::new(
            Arc::new(MockInventory::new(vec![])),
            Arc::new(MockSearchIndex::new(vec![])),
            Arc::new(YamlCatalog::builtin()),
            Arc::new(llm),
            &RouterConfig::default(),
        )
    }

    fn pantry(names: &[&str]) -> Vec<PantryItem> {
        names.iter().map(|n| PantryItem::new(*n, 5.0)).collect()
    }

    fn pasta_recipe() -> CandidateRecipe {
        CandidateRecipe {
            id: "r-pasta".to_string(),
            title: "Garlic Butter Pasta".to_string(),
            ingredients: vec![
                RecipeIngredient::new("pasta").with_amount(200.0, "g"),
                RecipeIngredient::new("butter").with_amount(2.0, "tbsp"),
                RecipeIngredient::new("garlic"),
                RecipeIngredient::new("parsley"),
            ],
            instructions: vec![
                "Boil the pasta until al dente.".to_string(),
                "Melt the butter and fry the garlic.".to_string(),
                "Toss with parsley.".to_string(),
            ],
            tags: Default::default(),
            minutes: Some(20),
            difficulty: None,
            servings: Some(2),
            source_score: 0.8,
        }
    }

    #[tokio::test]
    async fn test_full_pantry_recipe_needs_nothing() {
        let pantry = pantry(&["pasta", "butter", "garlic", "parsley"]);
        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&pasta_recipe()),
                &pantry,
                &Preferences::default(),
                2,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        assert!(adapted.ingredients.iter().all(|i| i.provenance == Provenance::Pantry));
        assert!(adapted.shopping_list.is_empty());
        assert_eq!(adapted.servings, 2);
    }

    #[tokio::test]
    async fn test_scaling_doubles_quantities() {
        let pantry = pantry(&["pasta", "butter", "garlic", "parsley"]);
        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&pasta_recipe()),
                &pantry,
                &Preferences::default(),
                4,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        let by_name = |name: &str| adapted.ingredients.iter().find(|i| i.name == name).unwrap();
        assert_eq!(by_name("pasta").quantity, Some(400.0));
        assert_eq!(by_name("butter").quantity, Some(4.0));
        assert_eq!(by_name("garlic").quantity, None);
        assert_eq!(adapted.servings, 4);
    }

    #[tokio::test]
    async fn test_unstated_servings_scale_by_one() {
        let mut recipe = pasta_recipe();
        recipe.servings = None;
        let pantry = pantry(&["pasta", "butter", "garlic", "parsley"]);

        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&recipe),
                &pantry,
                &Preferences::default(),
                6,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        assert_eq!(
            adapted.ingredients.iter().find(|i| i.name == "pasta").unwrap().quantity,
            Some(200.0)
        );
    }

    #[tokio::test]
    async fn test_catalog_substitution_rewrites_instructions() {
        // No butter, but the catalog's first pantry-available swap is
        // olive oil.
        let pantry = pantry(&["pasta", "olive oil", "garlic", "parsley"]);
        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&pasta_recipe()),
                &pantry,
                &Preferences::default(),
                2,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        let swapped = adapted.ingredients.iter().find(|i| i.name == "olive oil").unwrap();
        assert_eq!(
            swapped.provenance,
            Provenance::Substituted {
                original: "butter".to_string()
            }
        );
        assert!(adapted.shopping_list.is_empty());
        assert_eq!(adapted.instructions[1], "Melt the olive oil and fry the garlic.");
    }

    #[tokio::test]
    async fn test_substitute_must_respect_allergies() {
        // Catalog offers oat/almond/soy milk; only almond milk is on
        // hand and the household is allergic to almonds.
        let recipe = CandidateRecipe::new("r-1", "Pancakes").with_ingredients(["milk", "flour"]);
        let pantry = pantry(&["almond milk", "flour"]);
        let mut prefs = Preferences::default();
        prefs.allergies.insert("almond".to_string());

        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&recipe),
                &pantry,
                &prefs,
                2,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        let milk = adapted
            .ingredients
            .iter()
            .find(|i| matches!(&i.provenance, Provenance::ToBuy) && i.name == "milk");
        assert!(milk.is_some(), "allergen substitute must be rejected");
        assert_eq!(adapted.shopping_list, vec!["milk"]);
    }

    #[tokio::test]
    async fn test_model_substitute_when_catalog_has_no_entry() {
        // "tahini" is not in the builtin catalog; the model suggests
        // peanut butter, which is on hand.
        let recipe = CandidateRecipe::new("r-1", "Noodle Sauce").with_ingredients(["tahini", "noodle"]);
        let pantry = pantry(&["peanut butter", "noodle"]);
        let llm = MockLlmClient::new(vec![json!({
            "substitute": "peanut butter",
            "reason": "same texture and richness"
        })]);

        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&recipe),
                &pantry,
                &Preferences::default(),
                2,
                &router(llm),
                today(),
            )
            .await;

        let swapped = adapted.ingredients.iter().find(|i| i.name == "peanut butter").unwrap();
        assert_eq!(
            swapped.provenance,
            Provenance::Substituted {
                original: "tahini".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_model_substitute_not_on_hand_is_rejected() {
        let recipe = CandidateRecipe::new("r-1", "Noodle Sauce").with_ingredients(["tahini", "noodle"]);
        let pantry = pantry(&["noodle"]);
        let llm = MockLlmClient::new(vec![json!({
            "substitute": "cashew butter",
            "reason": "not actually in the pantry"
        })]);

        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&recipe),
                &pantry,
                &Preferences::default(),
                2,
                &router(llm),
                today(),
            )
            .await;

        assert_eq!(adapted.shopping_list, vec!["tahini"]);
    }

    #[tokio::test]
    async fn test_waste_note_names_expiring_items() {
        let mut pantry = pantry(&["pasta", "butter", "parsley"]);
        pantry.push(PantryItem::new("garlic", 3.0).with_expiry(today() + Duration::days(2)));

        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&pasta_recipe()),
                &pantry,
                &Preferences::default(),
                2,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        let note = adapted.waste_note.expect("expiring garlic deserves a note");
        assert!(note.contains("garlic"));
    }

    #[tokio::test]
    async fn test_no_waste_note_when_nothing_expires() {
        let pantry = pantry(&["pasta", "butter", "garlic", "parsley"]);
        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&pasta_recipe()),
                &pantry,
                &Preferences::default(),
                2,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        assert!(adapted.waste_note.is_none());
    }

    #[tokio::test]
    async fn test_adaptation_is_a_fixed_point() {
        let pantry = pantry(&["pasta", "olive oil", "garlic"]);
        let adapter = adapter();
        let router = router(MockLlmClient::failing("offline"));
        let prefs = Preferences::default();
        let anchor = today();

        let first = adapter
            .adapt(AdaptSource::Recipe(&pasta_recipe()), &pantry, &prefs, 4, &router, anchor)
            .await;
        let second = adapter
            .adapt(AdaptSource::Adapted(&first), &pantry, &prefs, 4, &router, anchor)
            .await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_shopping_list_is_sorted_and_deduplicated() {
        let recipe = CandidateRecipe::new("r-1", "Stew").with_ingredients(["zucchini", "apricot", "zucchini"]);
        let adapted = adapter()
            .adapt(
                AdaptSource::Recipe(&recipe),
                &[],
                &Preferences::default(),
                2,
                &router(MockLlmClient::failing("offline")),
                today(),
            )
            .await;

        assert_eq!(adapted.shopping_list, vec!["apricot", "zucchini"]);
    }
}
