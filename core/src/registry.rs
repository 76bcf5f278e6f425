//! Process-wide mapping from corpus name to its current index artifact.
//!
//! The only mutable shared state in the engine. Artifacts are swapped in
//! whole behind an `Arc`; readers clone the `Arc` under a short read lock and
//! then work on their snapshot without holding any lock. At most one build per
//! corpus name may be in flight, enforced by [`IndexRegistry::begin_build`].

use crate::error::{EngineError, Result};
use crate::index::IndexArtifact;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;

/// Cooperative cancellation signal shared between a build and its registry slot.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) { self.0.store(true, Ordering::Release) }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Acquire) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BuildState {
    Idle,
    Building,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub corpus_name: String,
    pub build_state: BuildState,
    pub doc_count: Option<usize>,
    pub term_count: Option<usize>,
    /// RFC 3339 timestamp of the current artifact.
    pub built_at: Option<String>,
}

#[derive(Debug)]
struct Slot {
    current: Option<Arc<IndexArtifact>>,
    state: BuildState,
    build: Option<(u64, CancelFlag)>,
}

impl Slot {
    fn empty() -> Self { Self { current: None, state: BuildState::Idle, build: None } }

    fn status(&self, corpus_name: &str) -> IndexStatus {
        IndexStatus {
            corpus_name: corpus_name.to_string(),
            build_state: self.state.clone(),
            doc_count: self.current.as_ref().map(|a| a.doc_count()),
            term_count: self.current.as_ref().map(|a| a.term_count()),
            built_at: self.current.as_ref().and_then(|a| a.built_at().format(&Rfc3339).ok()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    slots: RwLock<HashMap<String, Slot>>,
    next_build: AtomicU64,
}

impl Inner {
    /// Release the build slot held by `build_id`, optionally installing a new artifact.
    fn finish(&self, corpus: &str, build_id: u64, artifact: Option<Arc<IndexArtifact>>, failure: Option<String>) {
        let mut slots = self.slots.write();
        let slot = slots.entry(corpus.to_string()).or_insert_with(Slot::empty);
        if !matches!(slot.build, Some((id, _)) if id == build_id) {
            return;
        }
        slot.build = None;
        if let Some(artifact) = artifact {
            slot.current = Some(artifact);
        }
        slot.state = match failure {
            Some(reason) => BuildState::Failed(reason),
            None => BuildState::Idle,
        };
    }
}

/// Reservation of the build slot for one corpus.
///
/// Consumed by [`IndexRegistry::publish`] or [`IndexRegistry::fail_build`].
/// A token dropped without either releases the slot as a failed build.
#[derive(Debug)]
pub struct BuildToken {
    corpus: String,
    build_id: u64,
    cancel: CancelFlag,
    registry: Arc<Inner>,
    finished: bool,
}

impl BuildToken {
    pub fn corpus_name(&self) -> &str { &self.corpus }
    pub fn cancel_flag(&self) -> CancelFlag { self.cancel.clone() }
}

impl Drop for BuildToken {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(corpus = %self.corpus, "build token dropped without publish");
            self.registry.finish(&self.corpus, self.build_id, None, Some("build abandoned".into()));
        }
    }
}

/// Cloning yields another handle onto the same registry.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    inner: Arc<Inner>,
}

impl IndexRegistry {
    pub fn new() -> Self { Self::default() }

    /// Reserve the build slot for `corpus_name`. A second concurrent request is
    /// rejected with `BuildInProgress`, not queued.
    pub fn begin_build(&self, corpus_name: &str) -> Result<BuildToken> {
        let mut slots = self.inner.slots.write();
        let slot = slots.entry(corpus_name.to_string()).or_insert_with(Slot::empty);
        if slot.build.is_some() {
            return Err(EngineError::BuildInProgress(corpus_name.to_string()));
        }
        let build_id = self.inner.next_build.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelFlag::default();
        slot.build = Some((build_id, cancel.clone()));
        slot.state = BuildState::Building;
        Ok(BuildToken {
            corpus: corpus_name.to_string(),
            build_id,
            cancel,
            registry: Arc::clone(&self.inner),
            finished: false,
        })
    }

    /// Make `artifact` the current index for the token's corpus.
    ///
    /// Queries that already hold the previous artifact keep using it.
    pub fn publish(&self, mut token: BuildToken, artifact: IndexArtifact) -> Arc<IndexArtifact> {
        debug_assert!(Arc::ptr_eq(&token.registry, &self.inner), "token from another registry");
        debug_assert_eq!(token.corpus, artifact.corpus_name());
        let artifact = Arc::new(artifact);
        self.inner.finish(&token.corpus, token.build_id, Some(Arc::clone(&artifact)), None);
        token.finished = true;
        artifact
    }

    /// Release the build slot, leaving the previous artifact (if any) current.
    pub fn fail_build<S: Into<String>>(&self, mut token: BuildToken, reason: S) {
        debug_assert!(Arc::ptr_eq(&token.registry, &self.inner), "token from another registry");
        self.inner.finish(&token.corpus, token.build_id, None, Some(reason.into()));
        token.finished = true;
    }

    /// Current artifact for `corpus_name`.
    pub fn get(&self, corpus_name: &str) -> Result<Arc<IndexArtifact>> {
        self.inner
            .slots
            .read()
            .get(corpus_name)
            .and_then(|s| s.current.clone())
            .ok_or_else(|| EngineError::IndexNotFound(corpus_name.to_string()))
    }

    pub fn status(&self, corpus_name: &str) -> Option<IndexStatus> {
        self.inner.slots.read().get(corpus_name).map(|s| s.status(corpus_name))
    }

    /// Status of every known corpus, sorted by name.
    pub fn list(&self) -> Vec<IndexStatus> {
        let slots = self.inner.slots.read();
        let mut out: Vec<IndexStatus> = slots.iter().map(|(name, s)| s.status(name)).collect();
        out.sort_by(|a, b| a.corpus_name.cmp(&b.corpus_name));
        out
    }

    /// Ask the in-flight build for `corpus_name` to stop at its next batch
    /// boundary. Returns false when nothing is building.
    pub fn cancel_build(&self, corpus_name: &str) -> bool {
        match self.inner.slots.read().get(corpus_name).and_then(|s| s.build.as_ref()) {
            Some((_, flag)) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a corpus. Refused while a build is in flight.
    pub fn remove(&self, corpus_name: &str) -> Result<bool> {
        let mut slots = self.inner.slots.write();
        if slots.get(corpus_name).map_or(false, |s| s.build.is_some()) {
            return Err(EngineError::BuildInProgress(corpus_name.to_string()));
        }
        Ok(slots.remove(corpus_name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Analyzer;

    fn artifact(name: &str) -> IndexArtifact {
        IndexArtifact::new(name.into(), Analyzer::default(), HashMap::new(), vec![])
    }

    #[test]
    fn second_begin_build_is_rejected() {
        let reg = IndexRegistry::new();
        let token = reg.begin_build("songs").unwrap();
        assert!(matches!(reg.begin_build("songs"), Err(EngineError::BuildInProgress(_))));
        assert!(reg.begin_build("other").is_ok());
        reg.publish(token, artifact("songs"));
        assert!(reg.begin_build("songs").is_ok());
    }

    #[test]
    fn get_before_publish_is_not_found() {
        let reg = IndexRegistry::new();
        let _token = reg.begin_build("songs").unwrap();
        assert!(matches!(reg.get("songs"), Err(EngineError::IndexNotFound(_))));
    }

    #[test]
    fn failed_build_keeps_previous_artifact() {
        let reg = IndexRegistry::new();
        let first = reg.publish(reg.begin_build("songs").unwrap(), artifact("songs"));
        let token = reg.begin_build("songs").unwrap();
        reg.fail_build(token, "disk on fire");
        assert!(Arc::ptr_eq(&reg.get("songs").unwrap(), &first));
        assert_eq!(reg.status("songs").unwrap().build_state, BuildState::Failed("disk on fire".into()));
    }

    #[test]
    fn dropped_token_releases_slot() {
        let reg = IndexRegistry::new();
        drop(reg.begin_build("songs").unwrap());
        assert!(matches!(reg.status("songs").unwrap().build_state, BuildState::Failed(_)));
        assert!(reg.begin_build("songs").is_ok());
    }

    #[test]
    fn snapshot_survives_republish() {
        let reg = IndexRegistry::new();
        reg.publish(reg.begin_build("songs").unwrap(), artifact("songs"));
        let held = reg.get("songs").unwrap();
        let newer = reg.publish(reg.begin_build("songs").unwrap(), artifact("songs"));
        assert!(!Arc::ptr_eq(&held, &newer));
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn cancel_and_remove() {
        let reg = IndexRegistry::new();
        assert!(!reg.cancel_build("songs"));
        let token = reg.begin_build("songs").unwrap();
        let flag = token.cancel_flag();
        assert!(reg.cancel_build("songs"));
        assert!(flag.is_cancelled());
        assert!(reg.remove("songs").is_err());
        reg.fail_build(token, "cancelled");
        assert_eq!(reg.remove("songs").unwrap(), true);
        assert!(reg.list().is_empty());
    }
}
