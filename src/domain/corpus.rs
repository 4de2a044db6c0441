// ============================================================
// Layer 3 — Corpus (queries + documents)
// ============================================================
// The read-only lookup tables every dataset needs:
//
//   QueryTable        query_id → query text
//   InMemoryDocStore  doc_id   → document text
//
// Both are loaded once (see data::loader) and then shared between
// datasets through Arc<Corpus>. Nothing mutates them after setup,
// so several dataset workers can read them without locking.
//
// A missing key is always an error: silently dropping a document
// would shift every score after it in the batch.

use std::collections::HashMap;

use crate::domain::error::{RankingError, RankingResult};
use crate::domain::traits::DocumentStore;

/// Preloaded query texts.
#[derive(Debug, Clone, Default)]
pub struct QueryTable {
    queries: HashMap<String, String>,
}

impl QueryTable {
    pub fn new(queries: HashMap<String, String>) -> Self {
        Self { queries }
    }

    /// Text of `query_id`, or NotFound.
    pub fn get(&self, query_id: &str) -> RankingResult<&str> {
        self.queries
            .get(query_id)
            .map(String::as_str)
            .ok_or_else(|| RankingError::unknown_query(query_id))
    }

    /// Iterate over all (query_id, text) pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.queries.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Document texts held in a HashMap.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocStore {
    docs: HashMap<String, String>,
}

impl InMemoryDocStore {
    pub fn new(docs: HashMap<String, String>) -> Self {
        Self { docs }
    }

    /// Iterate over all (doc_id, text) pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.docs.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InMemoryDocStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl DocumentStore for InMemoryDocStore {
    fn get(&self, doc_id: &str) -> RankingResult<&str> {
        self.docs
            .get(doc_id)
            .map(String::as_str)
            .ok_or_else(|| RankingError::unknown_doc(doc_id))
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

/// Queries and documents of one collection.
pub struct Corpus {
    pub queries: QueryTable,
    pub docs:    Box<dyn DocumentStore>,
}

impl Corpus {
    pub fn new(queries: QueryTable, docs: impl DocumentStore + 'static) -> Self {
        Self { queries, docs: Box::new(docs) }
    }

    pub fn query_text(&self, query_id: &str) -> RankingResult<&str> {
        self.queries.get(query_id)
    }

    pub fn doc_text(&self, doc_id: &str) -> RankingResult<&str> {
        self.docs.get(doc_id)
    }
}
