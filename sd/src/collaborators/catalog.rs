//! Substitution catalog collaborator
//!
//! Maps an ingredient to known kitchen substitutes. The builtin table
//! covers common swaps; a YAML file can extend or override it.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::normalize_name;

/// Catalog collaborator failures
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read or parsed
    #[error("Failed to load substitution catalog from {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Lookup of known substitutes for an ingredient
#[async_trait]
pub trait SubstitutionCatalog: Send + Sync {
    /// Known substitutes for `ingredient`, best first. Empty when unknown.
    async fn lookup(&self, ingredient: &str) -> Vec<String>;
}

/// Production catalog backed by an in-memory table
#[derive(Debug)]
pub struct YamlCatalog {
    table: BTreeMap<String, Vec<String>>,
}

impl YamlCatalog {
    /// The builtin substitution table
    pub fn builtin() -> Self {
        let pairs: &[(&str, &[&str])] = &[
            ("butter", &["olive oil", "coconut oil", "margarine"]),
            ("milk", &["oat milk", "almond milk", "soy milk"]),
            ("heavy cream", &["coconut cream", "evaporated milk"]),
            ("cream", &["coconut cream", "evaporated milk"]),
            ("egg", &["flax meal", "applesauce", "mashed banana"]),
            ("yogurt", &["sour cream", "coconut yogurt"]),
            ("sour cream", &["yogurt", "coconut cream"]),
            ("buttermilk", &["milk", "yogurt"]),
            ("honey", &["maple syrup", "sugar"]),
            ("soy sauce", &["tamari", "coconut amino"]),
            ("parmesan", &["pecorino", "nutritional yeast"]),
            ("onion", &["shallot", "leek"]),
            ("garlic", &["shallot", "garlic powder"]),
            ("lemon juice", &["lime juice", "vinegar"]),
            ("white wine", &["chicken broth", "vegetable broth"]),
            ("breadcrumb", &["crushed cracker", "rolled oat"]),
            ("rice", &["quinoa", "couscous"]),
            ("pasta", &["rice noodle", "zucchini noodle"]),
            ("ground beef", &["ground turkey", "lentil"]),
            ("chicken breast", &["chicken thigh", "tofu"]),
            ("fish sauce", &["soy sauce"]),
            ("vegetable oil", &["canola oil", "olive oil"]),
            ("basil", &["oregano", "parsley"]),
            ("cilantro", &["parsley"]),
            ("spinach", &["kale", "chard"]),
        ];

        let table = pairs
            .iter()
            .map(|(name, subs)| {
                (
                    normalize_name(name),
                    subs.iter().map(|s| normalize_name(s)).collect::<Vec<_>>(),
                )
            })
            .collect();

        Self { table }
    }

    /// Builtin table extended (and overridden) by a YAML file
    ///
    /// The file is a map of ingredient name to a list of substitutes:
    ///
    /// ```yaml
    /// butter: [ghee, olive oil]
    /// tahini: [peanut butter, sunflower seed butter]
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "YamlCatalog::load: called");

        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let raw: BTreeMap<String, Vec<String>> = serde_yaml::from_str(&content).map_err(|e| CatalogError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut catalog = Self::builtin();
        for (name, subs) in raw {
            let subs: Vec<String> = subs.iter().map(|s| normalize_name(s)).collect();
            catalog.table.insert(normalize_name(&name), subs);
        }

        info!(entries = catalog.table.len(), path = %path.display(), "YamlCatalog: loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[async_trait]
impl SubstitutionCatalog for YamlCatalog {
    async fn lookup(&self, ingredient: &str) -> Vec<String> {
        self.table.get(&normalize_name(ingredient)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_lookup() {
        let catalog = YamlCatalog::builtin();
        let subs = catalog.lookup("butter").await;
        assert_eq!(subs[0], "olive oil");
    }

    #[tokio::test]
    async fn test_lookup_normalizes_input() {
        let catalog = YamlCatalog::builtin();
        // Plural and casing collapse to the catalog key
        let subs = catalog.lookup("Onions").await;
        assert!(subs.contains(&"shallot".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_ingredient_is_empty() {
        let catalog = YamlCatalog::builtin();
        assert!(catalog.lookup("dragon fruit").await.is_empty());
    }

    #[tokio::test]
    async fn test_load_extends_and_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yml");
        std::fs::write(&path, "butter: [ghee]\ntahini: [peanut butter]\n").unwrap();

        let catalog = YamlCatalog::load(&path).unwrap();

        // Override replaces the builtin entry
        assert_eq!(catalog.lookup("butter").await, vec!["ghee".to_string()]);
        // Extension adds a new entry
        assert_eq!(catalog.lookup("tahini").await, vec!["peanut butter".to_string()]);
        // Untouched builtin entries survive
        assert!(!catalog.lookup("milk").await.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = YamlCatalog::load("/nonexistent/catalog.yml").unwrap_err();
        assert!(matches!(err, CatalogError::Load { .. }));
    }
}
