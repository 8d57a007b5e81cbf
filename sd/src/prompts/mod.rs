//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for the LLM calls.
//!
//! Template loading chain:
//! 1. `{user_dir}/{name}.pmt` (user override, from config)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{AnswerContext, ClassifyContext, ExplainContext, PromptLoader, SubstituteContext};
