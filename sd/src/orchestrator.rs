//! Turn orchestrator
//!
//! Owns the whole life of one message: claim the session's next turn,
//! classify, plan, execute intents through the delegation router, gate
//! anything recipe-shaped, synthesize the response, and commit. At most
//! one turn runs per session; a newer message aborts the one in flight
//! and its results are discarded.
//!
//! Nothing in here crashes a turn. Collaborator failures arrive as
//! [`TurnError`] kinds and every kind maps to a specific degraded or
//! corrective response.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::adapter::{AdaptSource, RecipeAdapter};
use crate::classifier::{Intent, IntentClassifier, is_greeting};
use crate::config::Config;
use crate::domain::{PreferenceDelta, Preferences};
use crate::error::TurnError;
use crate::events::{EventBus, TurnEmitter};
use crate::gate;
use crate::llm::{JsonKind, ResponseSchema};
use crate::planner::plan_turn;
use crate::prompts::{AnswerContext, PromptLoader};
use crate::ranker::{self, RankOutcome};
use crate::router::{MutationOutcome, Router};
use crate::session::{ConversationState, SessionError, SessionManager, Stage};
use crate::synthesizer::{StructuredPayload, Synthesizer};

const ANSWER_SCHEMA: ResponseSchema = ResponseSchema::new("answer", &[("answer", JsonKind::String)]);

const WELCOME: &str = "Hi! I can keep track of your pantry, suggest recipes that use what you have, \
     and adapt them to your household. Tell me about any allergies or diets, or ask what to cook.";

const SUPERSEDED: &str = "A newer message arrived, so I set this one aside. Nothing was changed.";

const CLARIFY: &str = "I can update your pantry, suggest recipes, or answer cooking questions. What would you like?";

/// One inbound message for one session
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub message: String,
    /// Preferences the transport already knows about the household,
    /// merged before classification
    pub known_preferences: Option<PreferenceDelta>,
}

/// What the transport renders back to the user
#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub stage: Stage,
    pub structured_payload: StructuredPayload,
    pub explanation_text: String,
    pub updated_preferences: Preferences,
}

impl TurnResponse {
    fn text(stage: Stage, text: impl Into<String>, preferences: Preferences) -> Self {
        let text = text.into();
        Self {
            stage,
            structured_payload: StructuredPayload::TextAnswer { text: text.clone() },
            explanation_text: text,
            updated_preferences: preferences,
        }
    }
}

pub struct Orchestrator {
    sessions: SessionManager,
    classifier: IntentClassifier,
    router: Router,
    adapter: RecipeAdapter,
    synthesizer: Synthesizer,
    prompts: PromptLoader,
    events: Arc<EventBus>,
    config: Config,
    /// Turn currently running per session, for last-message-wins
    in_flight: Mutex<HashMap<String, (u64, AbortHandle)>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SessionManager,
        classifier: IntentClassifier,
        router: Router,
        adapter: RecipeAdapter,
        synthesizer: Synthesizer,
        prompts: PromptLoader,
        events: Arc<EventBus>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            classifier,
            router,
            adapter,
            synthesizer,
            prompts,
            events,
            config,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Process one message. Always returns a response; a turn aborted
    /// by a newer message reports itself as set aside.
    pub async fn handle_message(self: &Arc<Self>, request: TurnRequest) -> TurnResponse {
        debug!(session_id = %request.session_id, "Orchestrator::handle_message: called");
        let session_id = request.session_id.clone();

        let state = match self.sessions.begin_turn(&session_id).await {
            Ok(state) => state,
            Err(err) => {
                warn!(%err, "session actor unavailable");
                return TurnResponse::text(
                    Stage::Error,
                    "Something went wrong starting this turn. Please try again.",
                    Preferences::default(),
                );
            }
        };
        let turn_seq = state.turn_seq;

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_turn(state, request).await });

        // Last message wins: abort whatever was still running for this
        // session before waiting on our own turn.
        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some((prior_seq, prior)) = in_flight.insert(session_id.clone(), (turn_seq, task.abort_handle())) {
                prior.abort();
                self.events.emitter_for(&session_id).turn_superseded(prior_seq);
                info!(%session_id, prior_seq, turn_seq, "prior turn superseded");
            }
        }

        let response = match task.await {
            Ok(response) => response,
            Err(err) if err.is_cancelled() => {
                TurnResponse::text(Stage::Error, SUPERSEDED, self.current_preferences(&session_id).await)
            }
            Err(err) => {
                warn!(%err, %session_id, "turn task failed");
                TurnResponse::text(
                    Stage::Error,
                    "Something went wrong with that message. Nothing was changed; please try again.",
                    self.current_preferences(&session_id).await,
                )
            }
        };

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.get(&session_id).is_some_and(|(seq, _)| *seq == turn_seq) {
                in_flight.remove(&session_id);
            }
        }

        response
    }

    async fn current_preferences(&self, session_id: &str) -> Preferences {
        self.sessions
            .get(session_id)
            .await
            .ok()
            .flatten()
            .map(|s| s.preferences)
            .unwrap_or_default()
    }

    async fn run_turn(&self, mut state: ConversationState, request: TurnRequest) -> TurnResponse {
        let emitter = self.events.emitter_for(&state.session_id);
        let turn_seq = state.turn_seq;
        emitter.turn_started(turn_seq, &request.message);
        let router = self.router.for_turn(emitter.clone(), turn_seq);

        if let Err(err) = state.validate() {
            return self.recover_corrupt_session(state, err, &emitter).await;
        }

        state.stage = state.stage.resume_stage();
        let entry_stage = state.stage;

        if let Some(delta) = &request.known_preferences {
            state.preferences.apply(delta);
        }

        let classification = self.classifier.classify(&request.message, &state).await;
        emitter.intent_classified(
            turn_seq,
            classification.intents.iter().map(|i| i.name().to_string()).collect(),
            classification.used_fallback,
        );
        state.preferences.apply(&classification.preference_delta);

        let plan = plan_turn(&classification.intents, &state.preferences);
        emitter.plan_built(turn_seq, &plan.complexity.to_string(), plan.ordered_steps.len());
        state.last_plan = Some(plan);

        // Dispatch point of the stage machine; every turn passes
        // through here before routing by intent.
        advance(&mut state, Stage::CollectingPrefs);

        let prefs_updated = request.known_preferences.as_ref().is_some_and(|d| !d.is_empty())
            || !classification.preference_delta.is_empty();

        let result = self
            .execute_intents(&mut state, &classification.intents, &request.message, prefs_updated, &router, &emitter)
            .await;

        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                emitter.turn_failed(turn_seq, err.kind(), &err.to_string());
                return self.error_response(state, err, entry_stage, &router).await;
            }
        };

        if !matches!(state.stage, Stage::PresentingOptions | Stage::AwaitingSelection) {
            state.pending_recommendations.clear();
        }
        state.touch();

        let explanation = self.synthesizer.explain(&payload, &router).await;

        match self.sessions.commit_turn(state.clone()).await {
            Ok(()) => emitter.turn_completed(turn_seq, state.stage.as_str(), payload.kind()),
            Err(SessionError::StaleTurn { .. }) => {
                debug!(turn_seq, "commit lost to a newer turn");
            }
            Err(err) => warn!(%err, "turn commit failed"),
        }

        TurnResponse {
            stage: state.stage,
            structured_payload: payload,
            explanation_text: explanation,
            updated_preferences: state.preferences,
        }
    }

    /// Execute classified intents in order, pantry mutations first so a
    /// search in the same message sees the updated inventory.
    async fn execute_intents(
        &self,
        state: &mut ConversationState,
        intents: &[Intent],
        message: &str,
        prefs_updated: bool,
        router: &Router,
        emitter: &TurnEmitter,
    ) -> Result<StructuredPayload, TurnError> {
        let mut mutated: Option<Vec<pantrystore::PantryItem>> = None;

        for intent in intents {
            if let Intent::MutatePantry { deltas } = intent {
                advance(state, Stage::PantryOp);
                match router.apply_pantry_deltas(&state.session_id, deltas.clone()).await? {
                    MutationOutcome::Applied { items } => {
                        state.cached_pantry = items.clone();
                        mutated = Some(items);
                    }
                    MutationOutcome::Rejected { reason } => {
                        advance(state, Stage::Done);
                        return Ok(StructuredPayload::TextAnswer {
                            text: format!("I couldn't update the pantry: {reason}"),
                        });
                    }
                }
            }
        }

        for intent in intents {
            match intent {
                Intent::MutatePantry { .. } => {}
                Intent::SearchRecipes { query } => return self.search_turn(state, query, router, emitter).await,
                Intent::SelectRecommendation { index } => {
                    return self.selection_turn(state, *index, router, emitter).await;
                }
                Intent::GeneralQuery => return self.general_turn(state, message, prefs_updated, router).await,
                Intent::Ambiguous { question } => {
                    return Err(TurnError::ClassificationAmbiguous {
                        question: question.clone(),
                    });
                }
            }
        }

        if let Some(items) = mutated {
            let expiring = router
                .expiring_items(&state.session_id, self.config.pantry.expiring_report_days)
                .await
                .unwrap_or_default();
            advance(state, Stage::Done);
            return Ok(StructuredPayload::PantrySummary { items, expiring });
        }

        Err(TurnError::ClassificationAmbiguous {
            question: CLARIFY.to_string(),
        })
    }

    async fn search_turn(
        &self,
        state: &mut ConversationState,
        query: &str,
        router: &Router,
        emitter: &TurnEmitter,
    ) -> Result<StructuredPayload, TurnError> {
        advance(state, Stage::Searching);
        state.last_query = Some(query.to_string());

        let (pantry_read, search_read) = router
            .pantry_and_candidates(
                &state.session_id,
                &state.cached_pantry,
                query,
                self.config.search.top_k,
                None,
            )
            .await;
        let pantry = pantry_read?;
        let search = search_read?;
        if !pantry.degraded {
            state.cached_pantry = pantry.items.clone();
        }

        let today = Utc::now().date_naive();
        let outcome = ranker::rank(
            &search.candidates,
            &pantry.items,
            &state.preferences,
            &self.config.ranker,
            today,
        );

        match outcome {
            RankOutcome::Ranked {
                recommendations,
                relaxed,
                pool_size,
            } => {
                debug!(pool_size, returned = recommendations.len(), "search_turn: ranked");
                emitter.candidates_ranked(state.turn_seq, search.candidates.len(), recommendations.len(), relaxed);
                state.pending_recommendations = recommendations.clone();
                advance(state, Stage::PresentingOptions);
                advance(state, Stage::AwaitingSelection);
                Ok(StructuredPayload::Recommendations {
                    recommendations,
                    relaxed,
                })
            }
            RankOutcome::NoSafeMatch { shopping_list } => {
                emitter.candidates_ranked(state.turn_seq, search.candidates.len(), 0, true);
                Err(TurnError::NoCandidatesFound { shopping_list })
            }
        }
    }

    async fn selection_turn(
        &self,
        state: &mut ConversationState,
        index: usize,
        router: &Router,
        emitter: &TurnEmitter,
    ) -> Result<StructuredPayload, TurnError> {
        let available = state.pending_recommendations.len();
        if index == 0 || index > available {
            return Err(TurnError::InvalidSelection { index, available });
        }

        advance(state, Stage::Adapting);
        let recommendation = state.pending_recommendations[index - 1].clone();

        let pantry = router.fetch_pantry(&state.session_id, &state.cached_pantry).await?;
        if !pantry.degraded {
            state.cached_pantry = pantry.items.clone();
        }

        let today = Utc::now().date_naive();
        let adapted = self
            .adapter
            .adapt(
                AdaptSource::Recipe(&recommendation.recipe),
                &pantry.items,
                &state.preferences,
                self.config.adapter.default_servings,
                router,
                today,
            )
            .await;
        emitter.recipe_adapted(
            state.turn_seq,
            &adapted.recipe_id,
            adapted.substituted().count(),
            adapted.shopping_list.len(),
        );

        match gate::check(&adapted, &state.preferences) {
            Ok(()) => {
                emitter.gate_checked(state.turn_seq, true, vec![]);
                state.pending_recommendations.clear();
                advance(state, Stage::Done);
                Ok(StructuredPayload::AdaptedRecipe { recipe: adapted })
            }
            Err(TurnError::ConstraintViolation { violations }) => {
                emitter.gate_checked(state.turn_seq, false, violations.clone());
                Err(TurnError::ConstraintViolation { violations })
            }
            Err(other) => Err(other),
        }
    }

    async fn general_turn(
        &self,
        state: &mut ConversationState,
        message: &str,
        prefs_updated: bool,
        router: &Router,
    ) -> Result<StructuredPayload, TurnError> {
        if is_greeting(message) {
            // Stay in preference collection so the next message keeps
            // the conversational thread.
            advance(state, Stage::CollectingPrefs);
            return Ok(StructuredPayload::TextAnswer { text: WELCOME.to_string() });
        }

        advance(state, Stage::General);

        let noted = if prefs_updated {
            "Noted, I've saved your preferences. "
        } else {
            ""
        };

        let answer = match self.answer_prompt(state, message) {
            Some(prompt) => match router.generate_json(&prompt, &ANSWER_SCHEMA).await {
                Ok(value) => value
                    .get("answer")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                Err(err) => {
                    debug!(%err, "general answer degraded");
                    None
                }
            },
            None => None,
        };

        let text = match answer {
            Some(answer) => format!("{noted}{answer}"),
            None => format!(
                "{noted}I can't answer free-form questions right now, but I can still update \
                 your pantry and suggest recipes from what you have."
            ),
        };

        advance(state, Stage::Done);
        Ok(StructuredPayload::TextAnswer { text })
    }

    fn answer_prompt(&self, state: &ConversationState, message: &str) -> Option<String> {
        let context = AnswerContext {
            preferences: serde_json::to_string(&state.preferences).ok()?,
            message: message.to_string(),
        };
        match self.prompts.render("answer", &context) {
            Ok(prompt) => Some(prompt),
            Err(err) => {
                debug!(%err, "answer prompt failed to render");
                None
            }
        }
    }

    /// Map a turn error to its corrective response and commit whatever
    /// state may safely persist.
    async fn error_response(
        &self,
        mut state: ConversationState,
        err: TurnError,
        entry_stage: Stage,
        router: &Router,
    ) -> TurnResponse {
        let emitter = self.events.emitter_for(&state.session_id);
        let persistent_entry = entry_stage.is_persistent();

        let (payload, stage) = match &err {
            TurnError::ClassificationAmbiguous { question } => (
                StructuredPayload::Clarification {
                    question: question.clone(),
                },
                if persistent_entry { entry_stage } else { Stage::CollectingPrefs },
            ),
            TurnError::InvalidSelection { index, available } => {
                let question = if *available == 0 {
                    "There are no options to pick from right now. Ask for recipe ideas first.".to_string()
                } else {
                    format!("Option {index} isn't on the table; pick a number between 1 and {available}.")
                };
                (
                    StructuredPayload::Clarification { question },
                    if persistent_entry { entry_stage } else { Stage::CollectingPrefs },
                )
            }
            TurnError::ConstraintViolation { violations } => (
                StructuredPayload::ViolationReport {
                    violations: violations.clone(),
                },
                if persistent_entry { entry_stage } else { Stage::Error },
            ),
            TurnError::NoCandidatesFound { shopping_list } => (
                StructuredPayload::NoSafeMatch {
                    shopping_list: shopping_list.clone(),
                },
                Stage::CollectingPrefs,
            ),
            TurnError::CollaboratorUnavailable { collaborator, .. } => (
                StructuredPayload::TextAnswer {
                    text: format!(
                        "I couldn't reach the {collaborator} service just now. Nothing was changed; please try again shortly."
                    ),
                },
                if persistent_entry { entry_stage } else { Stage::Error },
            ),
            TurnError::SessionStateCorrupt { .. } => {
                return self.recover_corrupt_session(state, err, &emitter).await;
            }
        };

        state.stage = stage;
        if !matches!(stage, Stage::PresentingOptions | Stage::AwaitingSelection) {
            state.pending_recommendations.clear();
        }
        state.touch();

        let explanation = self.synthesizer.explain(&payload, router).await;

        match self.sessions.commit_turn(state.clone()).await {
            Ok(()) | Err(SessionError::StaleTurn { .. }) => {}
            Err(commit_err) => warn!(%commit_err, "error-path commit failed"),
        }

        TurnResponse {
            stage,
            structured_payload: payload,
            explanation_text: explanation,
            updated_preferences: state.preferences,
        }
    }

    /// A session that fails its own invariants is reset rather than
    /// trusted. Allergies survive the reset.
    async fn recover_corrupt_session(
        &self,
        state: ConversationState,
        err: TurnError,
        emitter: &TurnEmitter,
    ) -> TurnResponse {
        warn!(session_id = %state.session_id, %err, "session state corrupt, resetting");
        emitter.turn_failed(state.turn_seq, err.kind(), &err.to_string());

        if self.sessions.reset(&state.session_id).await.is_ok() {
            emitter.session_reset();
        }

        let preferences = self.current_preferences(&state.session_id).await;
        TurnResponse::text(
            Stage::Error,
            "I lost track of our conversation and started fresh. Your allergies are still saved; \
             everything else was cleared.",
            preferences,
        )
    }
}

/// Move the stage machine. Transitions outside the documented walk are
/// logged, not blocked; the orchestrator is the machine's only driver.
fn advance(state: &mut ConversationState, next: Stage) {
    if !state.stage.can_transition(next) && state.stage != next {
        debug!(from = %state.stage, to = %next, "unusual stage transition");
    }
    state.stage = next;
}
