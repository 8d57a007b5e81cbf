//! Integration tests for the sousdaemon turn pipeline
//!
//! These run the real stack end to end: a SQLite pantry in a temp
//! directory, the hash-embedding recipe index, the builtin substitution
//! catalog, and the local completion provider. The local provider
//! cannot complete text, so every turn exercises the deterministic
//! fallbacks. No network is touched and every run is reproducible.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pantrystore::{PantryDelta, PantryItem, PantryStore};
use sousdaemon::collaborators::{RecipeIndex, SqlitePantry, YamlCatalog, load_corpus};
use sousdaemon::config::Config;
use sousdaemon::domain::{CandidateRecipe, Provenance};
use sousdaemon::events::{create_event_bus, read_session_events, spawn_event_logger};
use sousdaemon::llm::{create_client, create_embedding_client};
use sousdaemon::prompts::PromptLoader;
use sousdaemon::session::SessionManager;
use sousdaemon::{
    IntentClassifier, Orchestrator, RankOutcome, RecipeAdapter, Router, Stage, StructuredPayload, Synthesizer,
    TurnRequest, TurnResponse, rank,
};
use tempfile::TempDir;
use tokio::task::JoinHandle;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    orchestrator: Arc<Orchestrator>,
    config: Config,
    _logger: JoinHandle<()>,
    _temp: TempDir,
}

impl Harness {
    async fn ask(&self, session: &str, message: &str) -> TurnResponse {
        self.orchestrator
            .handle_message(TurnRequest {
                session_id: session.to_string(),
                message: message.to_string(),
                known_preferences: None,
            })
            .await
    }

    /// Seed a session's pantry directly through the store. Names are
    /// given pre-normalized so they match recipe ingredient names.
    fn seed_pantry(&self, session: &str, items: &[(&str, f64)]) {
        let store = PantryStore::open(&self.config.pantry.db_path).expect("Failed to open pantry store");
        let deltas: Vec<PantryDelta> = items.iter().map(|(name, qty)| PantryDelta::add(*name, *qty)).collect();
        store.apply_delta(session, &deltas).expect("Failed to seed pantry");
    }
}

async fn harness(recipes: Vec<CandidateRecipe>) -> Harness {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let mut config = Config::default();
    config.pantry.db_path = temp.path().join("pantry.db");
    config.events.log_dir = temp.path().join("events");

    let llm = create_client(&config.llm).expect("Failed to create local client");
    let embedder = create_embedding_client(&config.embedding).expect("Failed to create local embedder");

    let index = RecipeIndex::new(embedder);
    index.index_recipes(recipes).await.expect("Failed to index recipes");

    let pantry = SqlitePantry::open(&config.pantry.db_path).expect("Failed to open pantry");
    let events = create_event_bus();
    let logger = spawn_event_logger(Arc::clone(&events), &config.events.log_dir).expect("Failed to start logger");

    let router = Router::new(
        Arc::new(pantry),
        Arc::new(index),
        Arc::new(YamlCatalog::builtin()),
        Arc::clone(&llm),
        &config.router,
    );
    let classifier = IntentClassifier::new(llm, PromptLoader::embedded_only());
    let adapter = RecipeAdapter::new(PromptLoader::embedded_only(), config.ranker.expiring_window_days);
    let synthesizer = Synthesizer::new(PromptLoader::embedded_only());
    let orchestrator = Orchestrator::new(
        SessionManager::spawn(),
        classifier,
        router,
        adapter,
        synthesizer,
        PromptLoader::embedded_only(),
        events,
        config.clone(),
    );

    Harness {
        orchestrator,
        config,
        _logger: logger,
        _temp: temp,
    }
}

fn recipe(id: &str, title: &str, ingredients: &[&str], tags: &[&str]) -> CandidateRecipe {
    let mut candidate = CandidateRecipe::new(id, title)
        .with_ingredients(ingredients.iter().copied())
        .with_tags(tags.iter().copied());
    candidate.instructions = vec!["Prep the ingredients.".to_string(), "Cook and serve.".to_string()];
    candidate.servings = Some(2);
    candidate
}

/// Four-recipe corpus covering the main test axes: a near-complete
/// match, a meat dish, an allergen dish, and a vegan soup.
fn corpus() -> Vec<CandidateRecipe> {
    vec![
        recipe(
            "garlic-tomato-pasta",
            "Garlic Tomato Pasta",
            &["pasta", "tomato", "garlic", "olive oil"],
            &["italian", "vegetarian"],
        ),
        recipe(
            "chicken-fried-rice",
            "Chicken Fried Rice",
            &["chicken breast", "rice", "egg", "soy sauce"],
            &["asian"],
        ),
        recipe(
            "peanut-noodle-salad",
            "Peanut Noodle Salad",
            &["noodle", "peanut butter", "cucumber", "lime juice"],
            &["asian"],
        ),
        recipe(
            "lentil-soup",
            "Lentil Soup",
            &["lentil", "onion", "carrot", "vegetable broth"],
            &["vegan"],
        ),
    ]
}

// =============================================================================
// Conversation flow
// =============================================================================

#[tokio::test]
async fn test_grocery_search_selection_round_trip() {
    let h = harness(corpus()).await;
    let session = "s-flow";

    // Greeting opens the conversation
    let response = h.ask(session, "hey there!").await;
    assert_eq!(response.stage, Stage::CollectingPrefs);
    assert!(matches!(response.structured_payload, StructuredPayload::TextAnswer { .. }));

    // Groceries land in the pantry
    let response = h.ask(session, "I bought 5 tomatoes, some pasta and 8 garlic").await;
    assert_eq!(response.stage, Stage::Done);
    let StructuredPayload::PantrySummary { items, .. } = response.structured_payload else {
        panic!("expected pantry summary, got {:?}", response.structured_payload);
    };
    assert_eq!(items.len(), 3);
    let tomato = items.iter().find(|i| i.name == "tomato").expect("tomato stored");
    assert_eq!(tomato.quantity, 5.0);
    let pasta = items.iter().find(|i| i.name == "pasta").expect("pasta stored");
    assert_eq!(pasta.quantity, 1.0);

    // Search ranks the near-complete recipe first
    let response = h.ask(session, "what can I make for a pasta dinner?").await;
    assert_eq!(response.stage, Stage::AwaitingSelection);
    let StructuredPayload::Recommendations { recommendations, relaxed } = response.structured_payload else {
        panic!("expected recommendations, got {:?}", response.structured_payload);
    };
    assert_eq!(recommendations.len(), 3);
    assert!(relaxed, "only one recipe clears the strict missing cap");
    assert_eq!(recommendations[0].recipe.id, "garlic-tomato-pasta");
    assert_eq!(recommendations[0].missing_ingredients, vec!["olive oil".to_string()]);

    // Selection adapts the recipe; the one gap becomes a purchase
    let response = h.ask(session, "option 1").await;
    assert_eq!(response.stage, Stage::Done);
    let StructuredPayload::AdaptedRecipe { recipe } = response.structured_payload else {
        panic!("expected adapted recipe, got {:?}", response.structured_payload);
    };
    assert_eq!(recipe.recipe_id, "garlic-tomato-pasta");
    assert_eq!(recipe.shopping_list, vec!["olive oil".to_string()]);
    let oil = recipe
        .ingredients
        .iter()
        .find(|i| i.name == "olive oil")
        .expect("olive oil line present");
    assert!(matches!(oil.provenance, Provenance::ToBuy));
    let garlic = recipe.ingredients.iter().find(|i| i.name == "garlic").expect("garlic line");
    assert!(matches!(garlic.provenance, Provenance::Pantry));
}

#[tokio::test]
async fn test_out_of_range_selection_keeps_options_pending() {
    let h = harness(corpus()).await;
    let session = "s-range";

    let response = h.ask(session, "suggest a recipe").await;
    assert_eq!(response.stage, Stage::AwaitingSelection);

    // Only three options exist; nine is a clarification, not an error
    let response = h.ask(session, "option 9").await;
    assert_eq!(response.stage, Stage::AwaitingSelection);
    assert!(matches!(
        response.structured_payload,
        StructuredPayload::Clarification { .. }
    ));

    // The options are still live
    let response = h.ask(session, "option 1").await;
    assert_eq!(response.stage, Stage::Done);
    assert!(matches!(response.structured_payload, StructuredPayload::AdaptedRecipe { .. }));
}

#[tokio::test]
async fn test_pantry_mutation_applies_before_search() {
    let h = harness(corpus()).await;
    let session = "s-combo";
    h.seed_pantry(session, &[("rice", 2.0), ("egg", 6.0), ("soy sauce", 1.0)]);

    // One message both stocks the pantry and asks for ideas; the
    // ranking must see the chicken that arrived in the same breath.
    let response = h.ask(session, "I bought 2 chicken breasts, what can I make?").await;
    assert_eq!(response.stage, Stage::AwaitingSelection);
    let StructuredPayload::Recommendations { recommendations, .. } = response.structured_payload else {
        panic!("expected recommendations, got {:?}", response.structured_payload);
    };
    assert_eq!(recommendations[0].recipe.id, "chicken-fried-rice");
    assert!(recommendations[0].missing_ingredients.is_empty());
    assert_eq!(recommendations[0].coverage_fraction, 1.0);
}

// =============================================================================
// Constraint safety
// =============================================================================

#[tokio::test]
async fn test_allergy_never_reaches_recommendations() {
    let h = harness(corpus()).await;
    let session = "s-allergy";
    h.seed_pantry(
        session,
        &[
            ("noodle", 2.0),
            ("peanut butter", 1.0),
            ("cucumber", 1.0),
            ("lime juice", 1.0),
            ("pasta", 1.0),
            ("tomato", 3.0),
            ("garlic", 2.0),
            ("olive oil", 1.0),
        ],
    );

    let response = h.ask(session, "I'm allergic to peanuts").await;
    assert_eq!(response.stage, Stage::Done);
    assert!(response.updated_preferences.allergies.contains("peanut"));
    assert!(response.explanation_text.starts_with("Noted"));

    // The salad covers the pantry perfectly but carries the allergen
    let response = h.ask(session, "any dinner ideas?").await;
    let StructuredPayload::Recommendations { recommendations, .. } = response.structured_payload else {
        panic!("expected recommendations, got {:?}", response.structured_payload);
    };
    assert!(!recommendations.is_empty());
    for rec in &recommendations {
        assert_ne!(rec.recipe.id, "peanut-noodle-salad");
        assert!(
            rec.recipe.ingredient_names().all(|n| !n.contains("peanut")),
            "allergen leaked into {}",
            rec.recipe.id
        );
    }
}

#[tokio::test]
async fn test_dietary_restriction_persists_across_turns() {
    let h = harness(corpus()).await;
    let session = "s-veg";
    h.seed_pantry(
        session,
        &[
            ("pasta", 1.0),
            ("tomato", 3.0),
            ("garlic", 2.0),
            ("olive oil", 1.0),
            ("chicken breast", 2.0),
            ("rice", 2.0),
            ("egg", 6.0),
            ("soy sauce", 1.0),
        ],
    );

    let response = h.ask(session, "I'm vegetarian").await;
    assert_eq!(response.stage, Stage::Done);
    assert!(response.updated_preferences.dietary_restrictions.contains("vegetarian"));

    // A later turn still honors the restriction: the fully-stocked
    // chicken dish is contradicted and must not appear.
    let response = h.ask(session, "dinner ideas?").await;
    let StructuredPayload::Recommendations { recommendations, .. } = response.structured_payload else {
        panic!("expected recommendations, got {:?}", response.structured_payload);
    };
    assert!(recommendations.iter().all(|r| r.recipe.id != "chicken-fried-rice"));
    assert_eq!(recommendations[0].recipe.id, "garlic-tomato-pasta");
    assert!(!recommendations[0].diet_unverified);
}

#[tokio::test]
async fn test_no_safe_match_offers_shopping_list() {
    // A corpus of six-ingredient feasts that no relaxation can rescue
    let feasts = vec![
        recipe(
            "braised-duck-legs",
            "Braised Duck Legs",
            &["duck leg", "star anise", "fennel", "orange", "shallot", "red wine"],
            &["french"],
        ),
        recipe(
            "lamb-apricot-tagine",
            "Lamb and Apricot Tagine",
            &["lamb shank", "apricot", "polenta", "cinnamon", "chickpea", "mint"],
            &["moroccan"],
        ),
    ];
    let h = harness(feasts).await;
    let session = "s-stuck";
    h.seed_pantry(session, &[("salt", 1.0)]);

    let response = h.ask(session, "what can I make tonight?").await;
    assert_eq!(response.stage, Stage::CollectingPrefs);
    let StructuredPayload::NoSafeMatch { shopping_list } = response.structured_payload else {
        panic!("expected no-safe-match, got {:?}", response.structured_payload);
    };
    assert!(!shopping_list.is_empty());
    assert!(shopping_list.contains(&"duck leg".to_string()));
    assert!(shopping_list.contains(&"polenta".to_string()));
    assert!(shopping_list.windows(2).all(|w| w[0] <= w[1]), "shopping list is sorted");
    assert!(response.explanation_text.contains("No recipe fits"));
}

// =============================================================================
// Sessions and events
// =============================================================================

#[tokio::test]
async fn test_sessions_do_not_share_state() {
    let h = harness(corpus()).await;

    let response = h.ask("alpha", "I'm allergic to shellfish").await;
    assert!(response.updated_preferences.allergies.contains("shellfish"));

    // A different household must not inherit the allergy
    let response = h.ask("beta", "hello!").await;
    assert!(response.updated_preferences.allergies.is_empty());

    // And the first household keeps it
    let response = h.ask("alpha", "hi!").await;
    assert!(response.updated_preferences.allergies.contains("shellfish"));
}

#[tokio::test]
async fn test_turn_events_are_logged() {
    let h = harness(corpus()).await;
    let session = "s-events";

    h.ask(session, "hello!").await;

    // The logger drains the bus on its own task
    tokio::time::sleep(Duration::from_millis(200)).await;

    let entries = read_session_events(&h.config.events.log_dir, session).expect("Failed to read event log");
    assert!(!entries.is_empty());
    assert_eq!(entries[0].event.event_type(), "TurnStarted");
    assert!(entries.iter().any(|e| e.event.event_type() == "TurnCompleted"));
}

// =============================================================================
// Corpus and ranking
// =============================================================================

#[tokio::test]
async fn test_corpus_loads_and_serves_from_yaml() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("recipes.yml");
    std::fs::write(
        &path,
        r#"
- id: morning-scramble
  title: Morning Scramble
  ingredients:
    - name: Eggs
      quantity: 3
    - name: Butter
  instructions:
    - Whisk the eggs.
    - Scramble gently in butter.
  tags: [Breakfast, Vegetarian]
  servings: 1
"#,
    )
    .expect("Failed to write corpus");

    let recipes = load_corpus(&path).expect("Failed to load corpus");
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0].ingredients[0].name, "egg");
    assert!(recipes[0].tags.contains("breakfast"));

    // The loaded corpus serves a full search round trip
    let h = harness(recipes).await;
    let session = "s-yaml";
    h.seed_pantry(session, &[("egg", 3.0), ("butter", 1.0)]);

    let response = h.ask(session, "what can I make?").await;
    assert_eq!(response.stage, Stage::AwaitingSelection);
    let StructuredPayload::Recommendations { recommendations, .. } = response.structured_payload else {
        panic!("expected recommendations, got {:?}", response.structured_payload);
    };
    assert_eq!(recommendations[0].recipe.id, "morning-scramble");
    assert!(recommendations[0].missing_ingredients.is_empty());
}

#[tokio::test]
async fn test_expiring_ingredient_breaks_tie() {
    let today = Utc::now().date_naive();
    let candidates = vec![
        (
            recipe("spinach-omelette", "Spinach Omelette", &["egg", "spinach", "butter"], &[]),
            0.5,
        ),
        (
            recipe("butter-rice", "Butter Rice", &["egg", "rice", "butter"], &[]),
            0.5,
        ),
    ];
    let pantry = vec![
        PantryItem::new("egg", 6.0),
        PantryItem::new("spinach", 1.0).with_expiry(today + chrono::Duration::days(2)),
        PantryItem::new("butter", 1.0),
        PantryItem::new("rice", 2.0),
    ];

    let config = Config::default();
    let outcome = rank(&candidates, &pantry, &Default::default(), &config.ranker, today);

    // Identical coverage and similarity: the expiring spinach decides
    let RankOutcome::Ranked { recommendations, .. } = outcome else {
        panic!("expected ranked outcome");
    };
    assert_eq!(recommendations[0].recipe.id, "spinach-omelette");
    assert!(recommendations[0].uses_expiring);
    assert!(recommendations[0].expiring_used.contains(&"spinach".to_string()));
    assert_eq!(recommendations[1].recipe.id, "butter-rice");
    assert!(!recommendations[1].uses_expiring);
}
