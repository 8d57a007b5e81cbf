//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Intent and preference classification prompt
pub const CLASSIFY: &str = include_str!("../../prompts/classify.pmt");

/// Recommendation explanation prompt
pub const EXPLAIN: &str = include_str!("../../prompts/explain.pmt");

/// Ingredient substitution prompt
pub const SUBSTITUTE: &str = include_str!("../../prompts/substitute.pmt");

/// General cooking question prompt
pub const ANSWER: &str = include_str!("../../prompts/answer.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "classify" => Some(CLASSIFY),
        "explain" => Some(EXPLAIN),
        "substitute" => Some(SUBSTITUTE),
        "answer" => Some(ANSWER),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
