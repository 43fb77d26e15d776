//! TF-IDF analysis of a corpus of job-vacancy texts: cleaning and
//! tokenization, a sorted lexicon, sparse term-frequency and TF-IDF
//! matrices, and the queries built on them.

pub mod corpus;
pub mod error;
pub mod ingest;
pub mod lexicon;
pub mod matrix;
pub mod persist;
pub mod query;
pub mod stats;
pub mod svd;
pub mod tfidf;
pub mod tokenizer;

pub use corpus::{BuildReport, Corpus, Document, RawDocument, SkippedDocument};
pub use error::{CorpusError, Result};
pub use ingest::{document_id_from_url, CorpusLoader, DocumentSource, Loaded, PathSource, SourceBatch};
pub use lexicon::{DocId, Lexicon, TermId};
pub use matrix::{TermFrequencyMatrix, Triplet};
pub use persist::{CacheBackend, CorpusCache, FsCache, MemoryCache, SledCache};
pub use query::{DocumentSimilarity, ProjectedDocument, QueryEngine, SimilarWord, WeightedToken, DEFAULT_TOP_N};
pub use stats::{CdfPoint, CorpusStats, DocumentSummary, TokenCount};
pub use svd::ProjectionOptions;
pub use tfidf::TfIdfMatrix;
