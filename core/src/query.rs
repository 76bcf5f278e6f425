use crate::config::{EmptyQueryPolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::index::{DocOrd, IndexArtifact};
use crate::registry::IndexRegistry;
use crate::snippet::snippet;
use crate::tokenizer::Term;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// BM25 term-frequency saturation.
pub const K1: f64 = 1.2;
/// BM25 length normalization.
pub const B: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub doc_id: String,
    pub score: f64,
    pub fields: BTreeMap<String, String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHits {
    pub corpus_name: String,
    /// Analyzed query terms.
    pub terms: Vec<Term>,
    /// Candidates before truncation to k.
    pub total_hits: usize,
    pub hits: Vec<ScoredDocument>,
}

/// Inverse document frequency, clamped at zero.
pub fn idf(doc_count: usize, df: usize) -> f64 {
    let n = doc_count as f64;
    let df = df as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln().max(0.0)
}

/// Contribution of one query term to one document's score.
pub fn bm25_term(idf: f64, tf: u32, doc_len: u32, avg_doc_length: f64) -> f64 {
    let tf = tf as f64;
    let len_ratio = if avg_doc_length > 0.0 { doc_len as f64 / avg_doc_length } else { 1.0 };
    idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * len_ratio))
}

fn by_rank(a: &(DocOrd, f64), b: &(DocOrd, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Score every document that contains at least one of `terms` and return the
/// best `k`, plus the number of candidates.
///
/// Ties are broken by ascending doc_id (ordinal order).
pub fn rank(artifact: &IndexArtifact, terms: &[Term], k: usize) -> (Vec<(DocOrd, f64)>, usize) {
    let n = artifact.doc_count();
    let avgdl = artifact.avg_doc_length();
    let mut scores: HashMap<DocOrd, f64> = HashMap::new();
    for term in terms {
        let postings = artifact.postings(term);
        if postings.is_empty() {
            continue;
        }
        let w = idf(n, postings.len());
        for p in postings {
            *scores.entry(p.doc).or_insert(0.0) += bm25_term(w, p.term_frequency, artifact.doc_length(p.doc), avgdl);
        }
    }

    let mut scored: Vec<(DocOrd, f64)> = scores.into_iter().collect();
    let total = scored.len();
    if k == 0 {
        return (Vec::new(), total);
    }
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, by_rank);
        scored.truncate(k);
    }
    scored.sort_by(by_rank);
    (scored, total)
}

/// Ranked retrieval against the artifacts held by a registry.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    registry: IndexRegistry,
    empty_query: EmptyQueryPolicy,
    snippet_window: Option<usize>,
}

impl QueryEngine {
    pub fn new(registry: IndexRegistry) -> Self {
        Self { registry, empty_query: EmptyQueryPolicy::default(), snippet_window: None }
    }

    pub fn from_config(registry: IndexRegistry, config: &EngineConfig) -> Self {
        Self {
            registry,
            empty_query: config.empty_query,
            snippet_window: config.store_text.then_some(config.snippet_window),
        }
    }

    pub fn registry(&self) -> &IndexRegistry { &self.registry }

    /// Top `k` documents of `corpus_name` for `query`.
    pub fn search(&self, corpus_name: &str, query: &str, k: usize) -> Result<SearchHits> {
        if k == 0 {
            return Err(EngineError::InvalidTopK(0));
        }
        let artifact = self.registry.get(corpus_name)?;
        self.search_artifact(&artifact, query, k)
    }

    /// Search a specific snapshot. The artifact stays alive for the whole
    /// call even if the registry publishes a replacement meanwhile.
    pub fn search_artifact(&self, artifact: &IndexArtifact, query: &str, k: usize) -> Result<SearchHits> {
        if k == 0 {
            return Err(EngineError::InvalidTopK(0));
        }
        let terms = artifact.analyzer().analyze(query);
        if terms.is_empty() && self.empty_query == EmptyQueryPolicy::Reject {
            return Err(EngineError::EmptyQuery);
        }
        let (ranked, total_hits) = rank(artifact, &terms, k);
        let hits = ranked
            .into_iter()
            .map(|(ord, score)| {
                let doc = artifact.doc(ord);
                let snippet = match (self.snippet_window, &doc.text) {
                    (Some(window), Some(text)) => snippet(text, &terms, artifact.analyzer(), window),
                    _ => None,
                };
                ScoredDocument { doc_id: doc.doc_id.clone(), score, fields: doc.fields.clone(), snippet }
            })
            .collect();
        tracing::debug!(corpus = artifact.corpus_name(), num_terms = terms.len(), total_hits, "query evaluated");
        Ok(SearchHits { corpus_name: artifact.corpus_name().to_string(), terms, total_hits, hits })
    }
}
