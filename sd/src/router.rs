//! Delegation router
//!
//! The orchestrator never calls a collaborator directly. Every call
//! goes through the router, which bounds it with a per-call timeout,
//! measures it, emits a `CollaboratorCalled` event, and applies the
//! degraded path the plan named: the session's cached pantry snapshot
//! when the inventory store is unreachable, keyword matching when the
//! semantic index cannot answer.
//!
//! The router owns transport concerns only. What a degraded read means
//! for the conversation is the orchestrator's decision.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pantrystore::{PantryDelta, PantryItem};
use serde_json::Value;
use tracing::{debug, warn};

use crate::collaborators::{InventoryError, InventoryStore, MetadataFilter, SemanticSearchIndex, SubstitutionCatalog};
use crate::config::RouterConfig;
use crate::domain::{CandidateRecipe, StepTarget};
use crate::error::TurnError;
use crate::events::TurnEmitter;
use crate::llm::{LlmClient, ResponseSchema};

/// A pantry read, flagged when it was served from the session's cached
/// snapshot instead of the live store.
#[derive(Debug, Clone)]
pub struct PantryRead {
    pub items: Vec<PantryItem>,
    pub degraded: bool,
}

/// Search results, flagged when keyword overlap stood in for the
/// semantic index.
#[derive(Debug, Clone)]
pub struct SearchRead {
    pub candidates: Vec<(CandidateRecipe, f64)>,
    pub degraded: bool,
}

/// Outcome of a pantry mutation. A below-zero rejection is a
/// conversational answer, not a turn failure, so it is not an error.
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    Applied { items: Vec<PantryItem> },
    Rejected { reason: String },
}

/// Bounded, observable access to every collaborator
///
/// Cheap to clone: the orchestrator binds a per-turn copy to the
/// turn's event emitter with [`Router::for_turn`].
#[derive(Clone)]
pub struct Router {
    inventory: Arc<dyn InventoryStore>,
    search: Arc<dyn SemanticSearchIndex>,
    catalog: Arc<dyn SubstitutionCatalog>,
    llm: Arc<dyn LlmClient>,
    call_timeout: Duration,
    turn: Option<(TurnEmitter, u64)>,
}

impl Router {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        search: Arc<dyn SemanticSearchIndex>,
        catalog: Arc<dyn SubstitutionCatalog>,
        llm: Arc<dyn LlmClient>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            inventory,
            search,
            catalog,
            llm,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            turn: None,
        }
    }

    /// A copy of this router whose calls are reported against one turn
    pub fn for_turn(&self, emitter: TurnEmitter, turn_seq: u64) -> Self {
        let mut bound = self.clone();
        bound.turn = Some((emitter, turn_seq));
        bound
    }

    /// Read the pantry, falling back to the session's cached snapshot
    /// when the store does not answer. With no snapshot to serve, the
    /// failure propagates.
    pub async fn fetch_pantry(&self, session_id: &str, cached: &[PantryItem]) -> Result<PantryRead, TurnError> {
        debug!(%session_id, "Router::fetch_pantry: called");
        match self.bounded(StepTarget::Inventory, self.inventory.items(session_id)).await {
            Ok(items) => Ok(PantryRead { items, degraded: false }),
            Err(err) if !cached.is_empty() => {
                warn!(%session_id, %err, "Pantry store unavailable, serving cached snapshot");
                Ok(PantryRead {
                    items: cached.to_vec(),
                    degraded: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Apply signed deltas atomically. A below-zero rejection comes
    /// back as [`MutationOutcome::Rejected`] with the store's message.
    pub async fn apply_pantry_deltas(
        &self,
        session_id: &str,
        deltas: Vec<PantryDelta>,
    ) -> Result<MutationOutcome, TurnError> {
        debug!(%session_id, count = deltas.len(), "Router::apply_pantry_deltas: called");
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, self.inventory.apply_deltas(session_id, deltas)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(items)) => {
                self.record(StepTarget::Inventory, true, duration_ms);
                Ok(MutationOutcome::Applied { items })
            }
            Ok(Err(err @ InventoryError::BelowZero { .. })) => {
                // The store answered; the batch was rejected whole.
                self.record(StepTarget::Inventory, true, duration_ms);
                Ok(MutationOutcome::Rejected { reason: err.to_string() })
            }
            Ok(Err(err)) => {
                self.record(StepTarget::Inventory, false, duration_ms);
                Err(TurnError::CollaboratorUnavailable {
                    collaborator: StepTarget::Inventory,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                self.record(StepTarget::Inventory, false, duration_ms);
                Err(self.timed_out(StepTarget::Inventory))
            }
        }
    }

    /// Items expiring within `days`, soonest first
    pub async fn expiring_items(&self, session_id: &str, days: u32) -> Result<Vec<PantryItem>, TurnError> {
        debug!(%session_id, days, "Router::expiring_items: called");
        self.bounded(StepTarget::Inventory, self.inventory.expiring_within(session_id, days))
            .await
    }

    /// Semantic candidate retrieval with keyword fallback
    ///
    /// Embeds the query and searches by vector. When either step fails
    /// the router retries once with token-overlap matching and flags
    /// the read degraded. Only when that also fails does the turn see
    /// an unavailable collaborator.
    pub async fn search_candidates(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<SearchRead, TurnError> {
        debug!(query, top_k, "Router::search_candidates: called");
        let semantic = self.semantic_query(query, top_k, filter).await;
        match semantic {
            Ok(candidates) => Ok(SearchRead {
                candidates,
                degraded: false,
            }),
            Err(err) => {
                warn!(%err, "Semantic search unavailable, trying keyword matching");
                let candidates = self
                    .bounded(StepTarget::SearchIndex, self.search.keyword_query(query, top_k, filter))
                    .await?;
                Ok(SearchRead {
                    candidates,
                    degraded: true,
                })
            }
        }
    }

    async fn semantic_query(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CandidateRecipe, f64)>, TurnError> {
        let vector = self.bounded(StepTarget::SearchIndex, self.search.embed(query)).await?;
        self.bounded(StepTarget::SearchIndex, self.search.query(&vector, top_k, filter))
            .await
    }

    /// Pantry read and candidate retrieval run concurrently; the
    /// orchestrator joins them before ranking.
    pub async fn pantry_and_candidates(
        &self,
        session_id: &str,
        cached: &[PantryItem],
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> (Result<PantryRead, TurnError>, Result<SearchRead, TurnError>) {
        tokio::join!(
            self.fetch_pantry(session_id, cached),
            self.search_candidates(query, top_k, filter),
        )
    }

    /// Schema-validated text generation
    pub async fn generate_json(&self, prompt: &str, schema: &ResponseSchema) -> Result<Value, TurnError> {
        debug!(schema = schema.name, "Router::generate_json: called");
        self.bounded(StepTarget::TextGeneration, self.llm.complete_json(prompt, schema))
            .await
    }

    /// Substitution lookup. The catalog itself cannot fail; a timeout
    /// degrades to "no substitutes known" so adaptation falls through
    /// to the shopping list.
    pub async fn lookup_substitutes(&self, ingredient: &str) -> Vec<String> {
        debug!(ingredient, "Router::lookup_substitutes: called");
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, self.catalog.lookup(ingredient)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(substitutes) => {
                self.record(StepTarget::SubstitutionCatalog, true, duration_ms);
                substitutes
            }
            Err(_) => {
                warn!(ingredient, "Substitution catalog timed out, treating as unknown");
                self.record(StepTarget::SubstitutionCatalog, false, duration_ms);
                Vec::new()
            }
        }
    }

    /// Run one collaborator call under the timeout and report it
    async fn bounded<T, E, F>(&self, target: StepTarget, call: F) -> Result<T, TurnError>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(TurnError::CollaboratorUnavailable {
                collaborator: target,
                reason: err.to_string(),
            }),
            Err(_) => Err(self.timed_out(target)),
        };
        self.record(target, result.is_ok(), duration_ms);
        result
    }

    fn timed_out(&self, target: StepTarget) -> TurnError {
        TurnError::CollaboratorUnavailable {
            collaborator: target,
            reason: format!("no answer within {}s", self.call_timeout.as_secs()),
        }
    }

    fn record(&self, target: StepTarget, success: bool, duration_ms: u64) {
        debug!(%target, success, duration_ms, "Router: collaborator call finished");
        if let Some((emitter, turn_seq)) = &self.turn {
            emitter.collaborator_called(*turn_seq, &target.to_string(), success, duration_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockInventory, MockSearchIndex, YamlCatalog};
    use crate::events::{EventBus, TurnEvent};
    use crate::llm::JsonKind;
    use crate::llm::mock::MockLlmClient;
    use serde_json::json;

    fn recipe(id: &str) -> CandidateRecipe {
        CandidateRecipe::new(id, id).with_ingredients(["tomato", "pasta"])
    }

    fn router_with(
        inventory: MockInventory,
        search: MockSearchIndex,
        llm: MockLlmClient,
        timeout_secs: u64,
    ) -> Router {
        Router::new(
            Arc::new(inventory),
            Arc::new(search),
            Arc::new(YamlCatalog::builtin()),
            Arc::new(llm),
            &RouterConfig {
                call_timeout_secs: timeout_secs,
            },
        )
    }

    #[tokio::test]
    async fn test_fetch_pantry_live_store() {
        let router = router_with(
            MockInventory::new(vec![PantryItem::new("milk", 1.0)]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let read = router.fetch_pantry("kitchen-1", &[]).await.unwrap();
        assert!(!read.degraded);
        assert_eq!(read.items.len(), 1);
        assert_eq!(read.items[0].name, "milk");
    }

    #[tokio::test]
    async fn test_fetch_pantry_falls_back_to_cached_snapshot() {
        let router = router_with(
            MockInventory::failing(),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let cached = vec![PantryItem::new("egg", 6.0)];
        let read = router.fetch_pantry("kitchen-1", &cached).await.unwrap();
        assert!(read.degraded);
        assert_eq!(read.items[0].name, "egg");
    }

    #[tokio::test]
    async fn test_fetch_pantry_fails_without_snapshot() {
        let router = router_with(
            MockInventory::failing(),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let err = router.fetch_pantry("kitchen-1", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::CollaboratorUnavailable {
                collaborator: StepTarget::Inventory,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_slow_inventory_times_out() {
        let router = router_with(
            MockInventory::slow(vec![PantryItem::new("milk", 1.0)], Duration::from_secs(30)),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            1,
        );

        let err = router.fetch_pantry("kitchen-1", &[]).await.unwrap_err();
        match err {
            TurnError::CollaboratorUnavailable { collaborator, reason } => {
                assert_eq!(collaborator, StepTarget::Inventory);
                assert!(reason.contains("within 1s"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_inventory_serves_cached_snapshot() {
        let router = router_with(
            MockInventory::slow(vec![], Duration::from_secs(30)),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            1,
        );

        let cached = vec![PantryItem::new("butter", 1.0)];
        let read = router.fetch_pantry("kitchen-1", &cached).await.unwrap();
        assert!(read.degraded);
        assert_eq!(read.items[0].name, "butter");
    }

    #[tokio::test]
    async fn test_apply_deltas_applied() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let outcome = router
            .apply_pantry_deltas("kitchen-1", vec![PantryDelta::add("tomato", 3.0)])
            .await
            .unwrap();
        match outcome {
            MutationOutcome::Applied { items } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].quantity, 3.0);
            }
            MutationOutcome::Rejected { reason } => panic!("unexpected rejection: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_apply_deltas_below_zero_is_rejection_not_error() {
        let router = router_with(
            MockInventory::new(vec![PantryItem::new("milk", 1.0)]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let outcome = router
            .apply_pantry_deltas("kitchen-1", vec![PantryDelta::remove("milk", 5.0)])
            .await
            .unwrap();
        match outcome {
            MutationOutcome::Rejected { reason } => {
                assert!(reason.contains("milk"));
                assert!(reason.contains("only 1"));
            }
            MutationOutcome::Applied { .. } => panic!("removal past zero must be rejected"),
        }
    }

    #[tokio::test]
    async fn test_apply_deltas_store_down_is_turn_error() {
        let router = router_with(
            MockInventory::failing(),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let err = router
            .apply_pantry_deltas("kitchen-1", vec![PantryDelta::add("tomato", 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::CollaboratorUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_search_semantic_path() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![(recipe("r-1"), 0.9)]),
            MockLlmClient::new(vec![]),
            4,
        );

        let read = router.search_candidates("tomato dinner", 5, None).await.unwrap();
        assert!(!read.degraded);
        assert_eq!(read.candidates.len(), 1);
        assert_eq!(read.candidates[0].0.id, "r-1");
    }

    #[tokio::test]
    async fn test_search_falls_back_to_keywords_when_embedding_down() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::embedding_down(vec![(recipe("r-1"), 0.9)]),
            MockLlmClient::new(vec![]),
            4,
        );

        let read = router.search_candidates("tomato dinner", 5, None).await.unwrap();
        assert!(read.degraded);
        assert_eq!(read.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_search_fully_down_is_turn_error() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::down(),
            MockLlmClient::new(vec![]),
            4,
        );

        let err = router.search_candidates("tomato dinner", 5, None).await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::CollaboratorUnavailable {
                collaborator: StepTarget::SearchIndex,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_search_respects_metadata_filter() {
        let vegetarian = CandidateRecipe::new("r-veg", "Veggie Bowl").with_tags(["vegetarian"]);
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![(recipe("r-1"), 0.9), (vegetarian, 0.8)]),
            MockLlmClient::new(vec![]),
            4,
        );

        let filter = MetadataFilter::with_tags(["vegetarian"]);
        let read = router.search_candidates("dinner", 5, Some(&filter)).await.unwrap();
        assert_eq!(read.candidates.len(), 1);
        assert_eq!(read.candidates[0].0.id, "r-veg");
    }

    #[tokio::test]
    async fn test_pantry_and_candidates_joins_both() {
        let router = router_with(
            MockInventory::new(vec![PantryItem::new("pasta", 1.0)]),
            MockSearchIndex::new(vec![(recipe("r-1"), 0.9)]),
            MockLlmClient::new(vec![]),
            4,
        );

        let (pantry, search) = router.pantry_and_candidates("kitchen-1", &[], "pasta", 5, None).await;
        assert_eq!(pantry.unwrap().items.len(), 1);
        assert_eq!(search.unwrap().candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_generate_json_passthrough() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![json!({"answer": "use a wide pan"})]),
            4,
        );

        let schema = ResponseSchema::new("answer", &[("answer", JsonKind::String)]);
        let value = router.generate_json("how do I sear?", &schema).await.unwrap();
        assert_eq!(value["answer"], "use a wide pan");
    }

    #[tokio::test]
    async fn test_generate_json_timeout() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::slow(vec![json!({"answer": "late"})], Duration::from_secs(30)),
            1,
        );

        let schema = ResponseSchema::new("answer", &[("answer", JsonKind::String)]);
        let err = router.generate_json("how do I sear?", &schema).await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::CollaboratorUnavailable {
                collaborator: StepTarget::TextGeneration,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_lookup_substitutes_builtin_catalog() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let subs = router.lookup_substitutes("butter").await;
        assert!(!subs.is_empty());

        let none = router.lookup_substitutes("dragon fruit essence").await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_bound_router_emits_collaborator_events() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();

        let router = router_with(
            MockInventory::new(vec![PantryItem::new("milk", 1.0)]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        )
        .for_turn(bus.emitter_for("kitchen-1"), 7);

        router.fetch_pantry("kitchen-1", &[]).await.unwrap();

        match rx.try_recv().unwrap() {
            TurnEvent::CollaboratorCalled {
                session_id,
                turn_seq,
                target,
                success,
                ..
            } => {
                assert_eq!(session_id, "kitchen-1");
                assert_eq!(turn_seq, 7);
                assert_eq!(target, "inventory");
                assert!(success);
            }
            other => panic!("expected CollaboratorCalled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unbound_router_emits_nothing_and_still_works() {
        let router = router_with(
            MockInventory::new(vec![]),
            MockSearchIndex::new(vec![]),
            MockLlmClient::new(vec![]),
            4,
        );

        let read = router.fetch_pantry("kitchen-1", &[]).await.unwrap();
        assert!(read.items.is_empty());
    }
}
