// ============================================================
// Layer 3 — Ranking Errors
// ============================================================
// One error enum for everything below the application layer.
// The application and CLI layers wrap it with anyhow::Context.
//
// The variants map onto the four failure classes of the
// pipeline:
//   - configuration errors   → Config
//   - unknown ids            → NotFound
//   - sampling exhaustion    → NoRelevantDocument
//   - malformed input files  → Parse / Io / Tokenizer
//
// Data-quality problems (depth larger than the run, sample size
// larger than depth) are NOT errors; they are logged with
// tracing::warn! and execution continues.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the dataset, batching and scoring layers.
///
/// Clone: dataset items and loader batches carry `RankingResult`s.
#[derive(Debug, Clone, Error)]
pub enum RankingError {
    /// Inconsistent or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A doc_id or query_id is not present in its lookup table.
    #[error("Unknown {kind} id '{id}'")]
    NotFound {
        /// "document" or "query"
        kind: &'static str,
        /// The id that failed to resolve
        id: String,
    },

    /// single_relevant sampling found no document with relevance > 0.
    #[error("Query '{query_id}' has no relevant document to sample")]
    NoRelevantDocument {
        /// The query whose candidate list has no positive judgment
        query_id: String,
    },

    /// Dataset index past the end.
    #[error("Index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Dataset length
        len: usize,
    },

    /// A line in an input file could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// Reading an input file failed.
    #[error("Cannot read '{}': {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The tokenizer rejected an input text.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

impl RankingError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Unknown document id.
    pub fn unknown_doc(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "document", id: id.into() }
    }

    /// Unknown query id.
    pub fn unknown_query(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "query", id: id.into() }
    }

    /// Create a Parse error.
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse { path: path.into(), line, message: message.into() }
    }

    /// Create an Io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source: Arc::new(source) }
    }
}

/// Convenience alias used throughout the library layers.
pub type RankingResult<T> = Result<T, RankingError>;
