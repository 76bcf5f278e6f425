pub mod builder;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod query;
pub mod registry;
pub mod service;
pub mod snippet;
pub mod tokenizer;

pub use builder::IndexBuilder;
pub use config::{EmptyQueryPolicy, EngineConfig};
pub use corpus::{ColumnSpec, CorpusLoader, CsvDirectory, MemorySource, RawDocument, Row, RowError, RowSource, Table};
pub use error::{EngineError, ErrorKind, Result};
pub use index::{DocOrd, Document, IndexArtifact, IndexStats, Posting};
pub use query::{QueryEngine, ScoredDocument, SearchHits};
pub use registry::{BuildState, BuildToken, CancelFlag, IndexRegistry, IndexStatus};
pub use service::{BuildSummary, Engine, SearchOutcome};
pub use tokenizer::{tokenize, Analyzer, Term};
