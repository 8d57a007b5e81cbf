//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Context for rendering the `classify` template
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyContext {
    /// Current conversation stage name
    pub stage: String,
    /// Number of pending recommendations (0 when none are on the table)
    pub pending_count: usize,
    /// Known preferences as a JSON object string
    pub preferences: String,
    /// The raw user message
    pub message: String,
}

/// Context for rendering the `explain` template
#[derive(Debug, Clone, Serialize)]
pub struct ExplainContext {
    /// JSON summary of the structured result being explained
    pub summary: String,
}

/// Context for rendering the `answer` template
#[derive(Debug, Clone, Serialize)]
pub struct AnswerContext {
    /// Known preferences as a JSON object string
    pub preferences: String,
    /// The cooking question as the user asked it
    pub message: String,
}

/// Context for rendering the `substitute` template
#[derive(Debug, Clone, Serialize)]
pub struct SubstituteContext {
    /// The missing ingredient
    pub ingredient: String,
    /// Title of the recipe being adapted
    pub title: String,
    /// On-hand pantry item names as a JSON array string
    pub pantry: String,
    /// Allergies as a JSON array string
    pub allergies: String,
    /// Dietary restrictions as a JSON array string
    pub restrictions: String,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (from config)
    user_dir: Option<PathBuf>,
    /// Repo default directory (`prompts/` next to the working directory)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a new prompt loader
    ///
    /// # Arguments
    /// * `user_dir` - Optional user override directory holding `{name}.pmt` files
    pub fn new(user_dir: Option<PathBuf>) -> Self {
        debug!(?user_dir, "PromptLoader::new: called");
        let repo_dir = PathBuf::from("prompts");

        let user_dir = user_dir.filter(|dir| dir.exists());
        let repo_dir = if repo_dir.exists() { Some(repo_dir) } else { None };
        debug!(?user_dir, ?repo_dir, "PromptLoader::new: resolved directories");

        Self {
            hbs: Handlebars::new(),
            user_dir,
            repo_dir,
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Handlebars::new(),
            user_dir: None,
            repo_dir: None,
        }
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `{user_dir}/{name}.pmt`
    /// 2. Repo default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        if let Some(ref repo_dir) = self.repo_dir {
            let path = repo_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in repo");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read repo prompt {}: {}", path.display(), e));
            }
        }

        debug!("PromptLoader::load_template: trying embedded fallback");
        if let Some(content) = embedded::get_embedded(name) {
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
