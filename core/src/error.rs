use thiserror::Error;

/// Errors raised while building or querying a corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// Keyword or document id is not part of the lexicon.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A matrix build or query was attempted on a corpus with no documents.
    #[error("corpus has no documents")]
    EmptyCorpus,

    /// A component referenced a token or document the lexicon does not know.
    #[error("inconsistent index: {0}")]
    InconsistentIndex(String),

    /// Raw input that could not be decoded or cleaned.
    #[error("malformed input for document {document_id}: {reason}")]
    MalformedInput { document_id: String, reason: String },

    /// Persistence backend failure.
    #[error("cache error: {0}")]
    Cache(String),
}

impl CorpusError {
    pub fn keyword_not_found(keyword: &str) -> Self {
        CorpusError::NotFound { kind: "keyword", key: keyword.to_string() }
    }

    pub fn document_not_found(document_id: &str) -> Self {
        CorpusError::NotFound { kind: "document", key: document_id.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CorpusError::NotFound { .. })
    }
}

impl From<bincode::Error> for CorpusError {
    fn from(err: bincode::Error) -> Self {
        CorpusError::Cache(err.to_string())
    }
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::Cache(err.to_string())
    }
}

impl From<sled::Error> for CorpusError {
    fn from(err: sled::Error) -> Self {
        CorpusError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for CorpusError {
    fn from(err: serde_json::Error) -> Self {
        CorpusError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CorpusError>;
