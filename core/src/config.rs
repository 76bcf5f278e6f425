use serde::{Deserialize, Serialize};

/// What to do with a query that normalizes to zero terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueryPolicy {
    /// Answer with an empty result set.
    #[default]
    EmptyResult,
    /// Fail with `EngineError::EmptyQuery`.
    Reject,
}

/// Engine tuning shared by the builder and the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Documents ingested between cancellation checks.
    pub batch_size: usize,
    pub empty_query: EmptyQueryPolicy,
    pub remove_stopwords: bool,
    /// Keep document text in the index so results can carry snippets.
    pub store_text: bool,
    /// Words of context on each side of the first match in a snippet.
    pub snippet_window: usize,
    /// Used by front ends when a request omits k.
    pub default_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            empty_query: EmptyQueryPolicy::EmptyResult,
            remove_stopwords: false,
            store_text: true,
            snippet_window: 40,
            default_k: 10,
        }
    }
}
