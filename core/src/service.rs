//! The two external operations, BuildIndex and Search, over one registry and
//! one row source.

use crate::builder::IndexBuilder;
use crate::config::EngineConfig;
use crate::corpus::{ColumnSpec, CorpusLoader, RowSource};
use crate::error::{EngineError, Result};
use crate::index::IndexStats;
use crate::query::{QueryEngine, ScoredDocument};
use crate::registry::IndexRegistry;
use crate::tokenizer::Analyzer;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub corpus_name: String,
    pub doc_count: usize,
    pub term_count: usize,
    pub malformed_row_count: usize,
    pub build_duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<ScoredDocument>,
    pub result_count: usize,
    pub total_hits: usize,
    pub query_duration: Duration,
}

#[derive(Clone)]
pub struct Engine {
    registry: IndexRegistry,
    source: Arc<dyn RowSource>,
    config: EngineConfig,
    query: QueryEngine,
}

impl Engine {
    pub fn new(registry: IndexRegistry, source: Arc<dyn RowSource>, config: EngineConfig) -> Self {
        let query = QueryEngine::from_config(registry.clone(), &config);
        Self { registry, source, config, query }
    }

    pub fn registry(&self) -> &IndexRegistry { &self.registry }
    pub fn source(&self) -> &dyn RowSource { self.source.as_ref() }
    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Build (or rebuild) the index for `source_name` and publish it.
    ///
    /// Blocks on the row source; async callers should run this on a blocking
    /// thread. The previous artifact stays queryable until the swap. The
    /// index is registered under the source's canonical name.
    pub fn build_index(&self, source_name: &str, columns: &ColumnSpec) -> Result<BuildSummary> {
        let name = self.source.canonical_name(source_name);
        let source_name = name.as_str();
        let token = self.registry.begin_build(source_name)?;
        let start = Instant::now();
        tracing::info!(corpus = source_name, ?columns, "index build started");

        let built = CorpusLoader::new(self.source.as_ref()).load(source_name, columns).and_then(|stream| {
            let malformed = stream.malformed_rows();
            let artifact = IndexBuilder::new()
                .analyzer(Analyzer::new(self.config.remove_stopwords))
                .store_text(self.config.store_text)
                .batch_size(self.config.batch_size)
                .cancel_flag(token.cancel_flag())
                .build(source_name, stream)?;
            Ok((artifact, malformed.get()))
        });

        match built {
            Ok((artifact, malformed_row_count)) => {
                let IndexStats { doc_count, term_count, .. } = artifact.stats();
                self.registry.publish(token, artifact);
                let build_duration = start.elapsed();
                if malformed_row_count > 0 {
                    tracing::warn!(corpus = source_name, malformed_row_count, "skipped malformed rows");
                }
                tracing::info!(corpus = source_name, doc_count, term_count, ?build_duration, "index build complete");
                Ok(BuildSummary { corpus_name: source_name.to_string(), doc_count, term_count, malformed_row_count, build_duration })
            }
            Err(err) => {
                tracing::warn!(corpus = source_name, error = %err, "index build failed");
                self.registry.fail_build(token, err.to_string());
                Err(err)
            }
        }
    }

    /// Ranked top-k search. Negative k is rejected with `InvalidTopK`.
    pub fn search(&self, corpus_name: &str, query: &str, k: i64) -> Result<SearchOutcome> {
        let start = Instant::now();
        let k = usize::try_from(k).ok().filter(|&k| k > 0).ok_or(EngineError::InvalidTopK(k))?;
        let hits = self.query.search(&self.source.canonical_name(corpus_name), query, k)?;
        Ok(SearchOutcome {
            result_count: hits.hits.len(),
            total_hits: hits.total_hits,
            results: hits.hits,
            query_duration: start.elapsed(),
        })
    }
}
