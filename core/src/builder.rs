use crate::corpus::RawDocument;
use crate::error::{EngineError, Result};
use crate::index::{DocOrd, Document, IndexArtifact, Posting};
use crate::registry::CancelFlag;
use crate::tokenizer::{Analyzer, Term};
use std::collections::{HashMap, HashSet};

/// Turns a stream of documents into an immutable [`IndexArtifact`].
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    analyzer: Analyzer,
    store_text: bool,
    batch_size: usize,
    cancel: Option<CancelFlag>,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self { analyzer: Analyzer::default(), store_text: true, batch_size: 1024, cancel: None }
    }
}

struct Staged {
    doc: Document,
    tf: HashMap<Term, u32>,
}

impl IndexBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn store_text(mut self, store: bool) -> Self {
        self.store_text = store;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// Checked between batches; once raised the build stops with `Cancelled`.
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Build an artifact for `corpus_name`.
    ///
    /// Duplicate doc ids fail the whole build. An empty input produces a valid
    /// artifact with no documents.
    pub fn build<I>(&self, corpus_name: &str, documents: I) -> Result<IndexArtifact>
    where
        I: IntoIterator<Item = Result<RawDocument>>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut staged: Vec<Staged> = Vec::new();

        for (n, raw) in documents.into_iter().enumerate() {
            if n % self.batch_size == 0 && self.is_cancelled() {
                return Err(EngineError::Cancelled(corpus_name.to_string()));
            }
            let raw = raw?;
            if !seen.insert(raw.doc_id.clone()) {
                return Err(EngineError::DuplicateDocumentId { corpus: corpus_name.to_string(), doc_id: raw.doc_id });
            }

            let terms = self.analyzer.analyze(&raw.text);
            let length = saturating_length(terms.len());
            let mut tf: HashMap<Term, u32> = HashMap::new();
            for term in terms {
                *tf.entry(term).or_insert(0) += 1;
            }
            let doc = Document {
                doc_id: raw.doc_id,
                length,
                fields: raw.fields,
                text: self.store_text.then_some(raw.text),
            };
            staged.push(Staged { doc, tf });
        }
        if self.is_cancelled() {
            return Err(EngineError::Cancelled(corpus_name.to_string()));
        }

        // Ordinals follow doc_id order, so appending in ordinal order keeps
        // every postings list sorted.
        staged.sort_by(|a, b| a.doc.doc_id.cmp(&b.doc.doc_id));
        let mut postings: HashMap<Term, Vec<Posting>> = HashMap::new();
        let mut documents = Vec::with_capacity(staged.len());
        for (ord, Staged { doc, tf }) in staged.into_iter().enumerate() {
            for (term, term_frequency) in tf {
                postings.entry(term).or_default().push(Posting { doc: ord as DocOrd, term_frequency });
            }
            documents.push(doc);
        }

        let artifact = IndexArtifact::new(corpus_name.to_string(), self.analyzer, postings, documents);
        tracing::debug!(
            corpus = corpus_name,
            num_docs = artifact.doc_count(),
            num_terms = artifact.term_count(),
            "assembled index artifact"
        );
        Ok(artifact)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelFlag::is_cancelled)
    }
}

/// Token count as stored in the artifact; counts past `u32::MAX` saturate.
fn saturating_length(tokens: usize) -> u32 { u32::try_from(tokens).unwrap_or(u32::MAX) }

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn raw(id: &str, text: &str) -> Result<RawDocument> {
        Ok(RawDocument { doc_id: id.into(), text: text.into(), fields: BTreeMap::new() })
    }

    #[test]
    fn computes_tf_df_and_lengths() {
        let a = IndexBuilder::new()
            .build("c", vec![raw("b", "rust rust go"), raw("a", "go home")])
            .unwrap();
        assert_eq!(a.doc_count(), 2);
        assert_eq!(a.doc_lengths(), &[2, 3]);
        assert_eq!(a.avg_doc_length(), 2.5);
        assert_eq!(a.df("go"), 2);
        assert_eq!(a.postings("rust"), &[Posting { doc: 1, term_frequency: 2 }]);
        let go: Vec<DocOrd> = a.postings("go").iter().map(|p| p.doc).collect();
        assert_eq!(go, vec![0, 1]);
        assert_eq!(a.doc(0).doc_id, "a");
    }

    #[test]
    fn duplicate_ids_fail_the_build() {
        let err = IndexBuilder::new().build("c", vec![raw("x", "one"), raw("x", "two")]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDocumentId { doc_id, .. } if doc_id == "x"));
    }

    #[test]
    fn raised_flag_cancels() {
        let flag = CancelFlag::default();
        flag.cancel();
        let err = IndexBuilder::new().cancel_flag(flag).build("c", vec![raw("x", "one")]).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)));
    }

    #[test]
    fn text_is_dropped_when_not_stored() {
        let a = IndexBuilder::new().store_text(false).build("c", vec![raw("x", "one")]).unwrap();
        assert!(a.doc(0).text.is_none());
    }

    #[test]
    fn oversized_lengths_saturate() {
        assert_eq!(saturating_length(7), 7);
        assert_eq!(saturating_length(u32::MAX as usize), u32::MAX);
        assert_eq!(saturating_length(usize::MAX), u32::MAX);
    }
}
