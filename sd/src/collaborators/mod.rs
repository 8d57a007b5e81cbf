//! Collaborator traits and production implementations
//!
//! Each external subsystem the orchestrator delegates to sits behind a
//! narrow trait: the pantry inventory, the semantic search index, and
//! the substitution catalog. Text generation lives in [`crate::llm`].
//! Test mocks are compiled alongside each trait under `#[cfg(test)]`.

mod catalog;
mod inventory;
mod search;

pub use catalog::{CatalogError, SubstitutionCatalog, YamlCatalog};
pub use inventory::{InventoryError, InventoryStore, SqlitePantry};
pub use search::{MetadataFilter, RecipeIndex, SearchError, SemanticSearchIndex, load_corpus};

#[cfg(test)]
pub use inventory::mock::MockInventory;
#[cfg(test)]
pub use search::mock::MockSearchIndex;
