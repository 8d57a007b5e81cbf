//! Semantic search collaborator
//!
//! An in-memory vector index over the recipe corpus. Queries are embedded
//! through the configured [`EmbeddingClient`] and matched by cosine
//! similarity; a token-overlap keyword query serves as the degraded path
//! when embedding is unavailable.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{CandidateRecipe, normalize_name};
use crate::llm::{EmbeddingClient, LlmError};

/// Search collaborator failures
#[derive(Debug, Error)]
pub enum SearchError {
    /// The index could not serve the request
    #[error("Search index unavailable: {0}")]
    Unavailable(String),

    /// The query could not be embedded
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),

    /// The recipe corpus could not be loaded
    #[error("Failed to load recipe corpus from {path}: {reason}")]
    Corpus { path: String, reason: String },
}

/// Optional hard tag filter a query can carry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    /// Tags every returned recipe must carry
    pub required_tags: BTreeSet<String>,
}

impl MetadataFilter {
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            required_tags: tags.into_iter().map(|t| t.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, recipe: &CandidateRecipe) -> bool {
        self.required_tags.is_subset(&recipe.tags)
    }
}

/// The search index collaborator
#[async_trait]
pub trait SemanticSearchIndex: Send + Sync {
    /// Embed free text into the index's vector space
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    /// Query by vector, returning up to `top_k` recipes with similarity in [0,1]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CandidateRecipe, f64)>, SearchError>;

    /// Degraded token-overlap query for when embedding is down
    async fn keyword_query(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CandidateRecipe, f64)>, SearchError>;
}

struct IndexEntry {
    recipe: CandidateRecipe,
    vector: Vec<f32>,
    tokens: BTreeSet<String>,
}

/// Production in-memory index over the recipe corpus
pub struct RecipeIndex {
    embedder: Arc<dyn EmbeddingClient>,
    entries: RwLock<Vec<IndexEntry>>,
}

impl RecipeIndex {
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and store recipes, replacing any previous index contents
    pub async fn index_recipes(&self, recipes: Vec<CandidateRecipe>) -> Result<usize, SearchError> {
        debug!(count = recipes.len(), "RecipeIndex::index_recipes: called");
        let mut entries = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let document = document_text(&recipe);
            let vector = self.embedder.embed(&document).await?;
            let tokens = tokenize(&document);
            entries.push(IndexEntry { recipe, vector, tokens });
        }

        let count = entries.len();
        *self.entries.write().map_err(|_| poisoned())? = entries;
        info!(count, "RecipeIndex: corpus indexed");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SemanticSearchIndex for RecipeIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embedder.embed(text).await?)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CandidateRecipe, f64)>, SearchError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;

        let mut scored: Vec<(CandidateRecipe, f64)> = entries
            .iter()
            .filter(|entry| filter.is_none_or(|f| f.matches(&entry.recipe)))
            .map(|entry| (entry.recipe.clone(), cosine_similarity(vector, &entry.vector)))
            .collect();

        sort_and_truncate(&mut scored, top_k);
        Ok(scored)
    }

    async fn keyword_query(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CandidateRecipe, f64)>, SearchError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().map_err(|_| poisoned())?;

        let mut scored: Vec<(CandidateRecipe, f64)> = entries
            .iter()
            .filter(|entry| filter.is_none_or(|f| f.matches(&entry.recipe)))
            .map(|entry| {
                let overlap = query_tokens.intersection(&entry.tokens).count();
                let score = overlap as f64 / query_tokens.len() as f64;
                (entry.recipe.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        sort_and_truncate(&mut scored, top_k);
        Ok(scored)
    }
}

fn poisoned() -> SearchError {
    SearchError::Unavailable("index lock poisoned".to_string())
}

/// The text a recipe is embedded under
fn document_text(recipe: &CandidateRecipe) -> String {
    let mut parts = vec![recipe.title.clone()];
    parts.extend(recipe.tags.iter().cloned());
    parts.extend(recipe.ingredient_names().map(|n| n.to_string()));
    parts.join(" ")
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(normalize_name)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Cosine similarity clamped to [0,1]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Deterministic result order: score descending, then id ascending
fn sort_and_truncate(scored: &mut Vec<(CandidateRecipe, f64)>, top_k: usize) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    scored.truncate(top_k);
}

/// Load a recipe corpus from a YAML file
///
/// Ingredient names are normalized on load so the ranker's coverage
/// checks compare like with like.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<CandidateRecipe>, SearchError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "load_corpus: called");

    let content = std::fs::read_to_string(path).map_err(|e| SearchError::Corpus {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut recipes: Vec<CandidateRecipe> = serde_yaml::from_str(&content).map_err(|e| SearchError::Corpus {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    for recipe in &mut recipes {
        for ingredient in &mut recipe.ingredients {
            ingredient.name = normalize_name(&ingredient.name);
        }
        recipe.tags = recipe.tags.iter().map(|t| t.to_lowercase()).collect();
    }

    info!(count = recipes.len(), path = %path.display(), "load_corpus: loaded recipes");
    Ok(recipes)
}
