use crate::tokenizer::{Analyzer, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;

/// Internal ordinal of a document inside one artifact. Ordinals follow
/// ascending doc_id order.
pub type DocOrd = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    /// Token count after analysis.
    pub length: u32,
    /// Display metadata (title, artist, ...) keyed by column header.
    pub fields: BTreeMap<String, String>,
    /// Raw text, kept only when the engine is configured to store it.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocOrd,
    pub term_frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexStats {
    pub doc_count: usize,
    pub term_count: usize,
    pub total_postings: usize,
    pub avg_doc_length: f64,
}

/// Immutable, fully built index snapshot for one corpus.
#[derive(Debug)]
pub struct IndexArtifact {
    corpus_name: String,
    built_at: OffsetDateTime,
    analyzer: Analyzer,
    avg_doc_length: f64,
    postings: HashMap<Term, Vec<Posting>>, // postings sorted by doc
    doc_lengths: Vec<u32>,
    documents: Vec<Document>, // sorted by doc_id
}

impl IndexArtifact {
    pub(crate) fn new(
        corpus_name: String,
        analyzer: Analyzer,
        postings: HashMap<Term, Vec<Posting>>,
        documents: Vec<Document>,
    ) -> Self {
        let doc_lengths: Vec<u32> = documents.iter().map(|d| d.length).collect();
        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_length = if doc_lengths.is_empty() { 0.0 } else { total as f64 / doc_lengths.len() as f64 };
        Self {
            corpus_name,
            built_at: OffsetDateTime::now_utc(),
            analyzer,
            avg_doc_length,
            postings,
            doc_lengths,
            documents,
        }
    }

    pub fn corpus_name(&self) -> &str { &self.corpus_name }
    pub fn built_at(&self) -> OffsetDateTime { self.built_at }
    pub fn analyzer(&self) -> Analyzer { self.analyzer }
    pub fn doc_count(&self) -> usize { self.documents.len() }
    pub fn avg_doc_length(&self) -> f64 { self.avg_doc_length }
    pub fn term_count(&self) -> usize { self.postings.len() }

    /// Postings for a term, empty when the term is unknown.
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of documents containing the term.
    pub fn df(&self, term: &str) -> usize { self.postings(term).len() }

    pub fn postings_map(&self) -> &HashMap<Term, Vec<Posting>> { &self.postings }

    pub fn doc_lengths(&self) -> &[u32] { &self.doc_lengths }

    pub fn doc_length(&self, doc: DocOrd) -> u32 { self.doc_lengths[doc as usize] }

    pub fn doc(&self, doc: DocOrd) -> &Document { &self.documents[doc as usize] }

    pub fn documents(&self) -> &[Document] { &self.documents }

    /// Look a document up by its external id.
    pub fn document(&self, doc_id: &str) -> Option<&Document> {
        self.documents
            .binary_search_by(|d| d.doc_id.as_str().cmp(doc_id))
            .ok()
            .map(|i| &self.documents[i])
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            doc_count: self.doc_count(),
            term_count: self.term_count(),
            total_postings: self.postings.values().map(Vec::len).sum(),
            avg_doc_length: self.avg_doc_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, length: u32) -> Document {
        Document { doc_id: id.into(), length, fields: BTreeMap::new(), text: None }
    }

    #[test]
    fn empty_artifact_has_zero_average() {
        let a = IndexArtifact::new("empty".into(), Analyzer::default(), HashMap::new(), vec![]);
        assert_eq!(a.doc_count(), 0);
        assert_eq!(a.avg_doc_length(), 0.0);
        assert!(a.postings("anything").is_empty());
    }

    #[test]
    fn document_lookup_uses_sorted_ids() {
        let a = IndexArtifact::new(
            "c".into(),
            Analyzer::default(),
            HashMap::new(),
            vec![doc("a", 2), doc("b", 4), doc("c", 6)],
        );
        assert_eq!(a.document("b").map(|d| d.length), Some(4));
        assert!(a.document("zz").is_none());
        assert_eq!(a.avg_doc_length(), 4.0);
    }
}
