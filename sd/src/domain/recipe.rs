//! Recipe types: search candidates, ranked recommendations, adapted output

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Recipe difficulty as tagged in the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// One ingredient line within a recipe. `name` is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl RecipeIngredient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: super::normalize_name(&name.into()),
            quantity: None,
            unit: None,
        }
    }

    pub fn with_amount(mut self, quantity: f64, unit: impl Into<String>) -> Self {
        self.quantity = Some(quantity);
        self.unit = Some(unit.into());
        self
    }
}

/// A recipe as returned by the search collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecipe {
    pub id: String,
    pub title: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    /// Diet and cuisine hints ("vegan", "italian", ...)
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub minutes: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Serving count the quantities are written for
    #[serde(default)]
    pub servings: Option<u32>,
    /// Raw semantic similarity from the search collaborator, in [0,1]
    #[serde(default)]
    pub source_score: f64,
}

impl CandidateRecipe {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ingredients: Vec::new(),
            instructions: Vec::new(),
            tags: BTreeSet::new(),
            minutes: None,
            difficulty: None,
            servings: None,
            source_score: 0.0,
        }
    }

    pub fn with_ingredients<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingredients = names.into_iter().map(RecipeIngredient::new).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    pub fn ingredient_names(&self) -> impl Iterator<Item = &str> {
        self.ingredients.iter().map(|i| i.name.as_str())
    }
}

/// One entry of the ranker's top-3
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecommendation {
    pub recipe: CandidateRecipe,
    /// Composite score in [0,100]
    pub composite_score: f64,
    /// Fraction of the recipe's ingredients already in the pantry, in [0,1]
    pub coverage_fraction: f64,
    /// Ingredients not in the pantry, sorted
    pub missing_ingredients: Vec<String>,
    /// Whether any used pantry ingredient is inside the urgency window
    pub uses_expiring: bool,
    /// Names of expiring pantry ingredients this recipe uses, sorted
    pub expiring_used: Vec<String>,
    /// Diet compliance could not be determined from the recipe's metadata
    pub diet_unverified: bool,
}

/// Where an adapted ingredient comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// Already in the pantry
    Pantry,
    /// Must be bought
    ToBuy,
    /// Swapped for something in the pantry
    Substituted { original: String },
}

/// One ingredient line after adaptation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedIngredient {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub provenance: Provenance,
}

/// A recipe rewritten against the pantry: scaled, substituted, and
/// annotated with the pantry/buy/substituted split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedRecipe {
    pub recipe_id: String,
    pub title: String,
    pub servings: u32,
    pub ingredients: Vec<AdaptedIngredient>,
    pub instructions: Vec<String>,
    /// Everything with `ToBuy` provenance, sorted
    pub shopping_list: Vec<String>,
    /// Present when the recipe rescues expiring pantry items
    pub waste_note: Option<String>,
}

impl AdaptedRecipe {
    pub fn from_pantry(&self) -> impl Iterator<Item = &AdaptedIngredient> {
        self.ingredients.iter().filter(|i| matches!(i.provenance, Provenance::Pantry))
    }

    pub fn substituted(&self) -> impl Iterator<Item = &AdaptedIngredient> {
        self.ingredients
            .iter()
            .filter(|i| matches!(i.provenance, Provenance::Substituted { .. }))
    }
}
