//! Error types for index building and searching.

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Broad classification of failures, so callers can decide on retries
/// without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller mistake; retrying the same request will fail again.
    Input,
    /// Depends on registry or corpus state; may succeed later.
    ResourceState,
    /// The row source failed while streaming.
    Io,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("corpus not found: {0}")]
    CorpusNotFound(String),

    #[error("invalid column index {index} for corpus {corpus} with {columns} columns")]
    InvalidColumnIndex { corpus: String, index: i64, columns: usize },

    #[error("duplicate document id {doc_id:?} in corpus {corpus}")]
    DuplicateDocumentId { corpus: String, doc_id: String },

    #[error("a build for corpus {0} is already in progress")]
    BuildInProgress(String),

    #[error("no index has been built for corpus {0}")]
    IndexNotFound(String),

    #[error("invalid top-k value {0}, must be greater than zero")]
    InvalidTopK(i64),

    #[error("query produced no searchable terms")]
    EmptyQuery,

    #[error("failed reading corpus {corpus}: {source}")]
    CorpusRead {
        corpus: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build for corpus {0} was cancelled")]
    Cancelled(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidColumnIndex { .. } | EngineError::InvalidTopK(_) | EngineError::EmptyQuery => {
                ErrorKind::Input
            }
            EngineError::CorpusNotFound(_)
            | EngineError::DuplicateDocumentId { .. }
            | EngineError::BuildInProgress(_)
            | EngineError::IndexNotFound(_) => ErrorKind::ResourceState,
            EngineError::CorpusRead { .. } => ErrorKind::Io,
            EngineError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::CorpusNotFound(_) => "CorpusNotFound",
            EngineError::InvalidColumnIndex { .. } => "InvalidColumnIndex",
            EngineError::DuplicateDocumentId { .. } => "DuplicateDocumentId",
            EngineError::BuildInProgress(_) => "BuildInProgress",
            EngineError::IndexNotFound(_) => "IndexNotFound",
            EngineError::InvalidTopK(_) => "InvalidTopK",
            EngineError::EmptyQuery => "EmptyQuery",
            EngineError::CorpusRead { .. } => "CorpusRead",
            EngineError::Cancelled(_) => "Cancelled",
        }
    }
}
