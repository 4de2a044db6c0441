// ============================================================
// Layer 3 — Ranking Records and Samples
// ============================================================
// Plain data types flowing from the supervision files into the
// batcher:
//
//   run file line   → RunRecord
//   qrels line      → QrelRecord
//   triples line    → DocPair → ScoredDocPair
//                                   │
//   RunDataset / TriplesDataset ────┴──→ Sample
//
// A Sample is one query with a fixed tuple of documents and one
// target per document. It is built once by a dataset accessor
// and consumed by the batcher; nothing mutates it afterwards.

use serde::{Deserialize, Serialize};

/// Score assigned to doc_a when a supervision record has no scores.
pub const DEFAULT_SCORE_A: f32 = 1.0;
/// Score assigned to doc_b when a supervision record has no scores.
pub const DEFAULT_SCORE_B: f32 = 0.0;

/// One ranked candidate from a run file (columns 0, 2, 3 and 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub query_id: String,
    pub doc_id:   String,
    pub rank:     u32,
    pub score:    f32,
}

/// One relevance judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrelRecord {
    pub query_id:  String,
    pub doc_id:    String,
    pub relevance: i32,
}

impl QrelRecord {
    pub fn new(query_id: impl Into<String>, doc_id: impl Into<String>, relevance: i32) -> Self {
        Self { query_id: query_id.into(), doc_id: doc_id.into(), relevance }
    }
}

/// A raw supervision record. Some sources carry distillation scores,
/// plain triples do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocPair {
    pub query_id: String,
    pub doc_id_a: String,
    pub doc_id_b: String,
    /// (score_a, score_b) when the source provides them
    pub scores:   Option<(f32, f32)>,
}

impl DocPair {
    pub fn new(
        query_id: impl Into<String>,
        doc_id_a: impl Into<String>,
        doc_id_b: impl Into<String>,
        scores:   Option<(f32, f32)>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            doc_id_a: doc_id_a.into(),
            doc_id_b: doc_id_b.into(),
            scores,
        }
    }

    /// Resolve missing scores: doc_a is assumed preferred.
    pub fn scored(self) -> ScoredDocPair {
        let (score_a, score_b) = self.scores.unwrap_or((DEFAULT_SCORE_A, DEFAULT_SCORE_B));
        ScoredDocPair {
            query_id: self.query_id,
            doc_id_a: self.doc_id_a,
            doc_id_b: self.doc_id_b,
            score_a,
            score_b,
        }
    }
}

/// One labelled training triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocPair {
    pub query_id: String,
    pub doc_id_a: String,
    pub doc_id_b: String,
    pub score_a:  f32,
    pub score_b:  f32,
}

/// One query with its sampled documents, ready for batching.
///
/// `doc_ids`, `docs` and `targets` always have the same length.
/// `relevance`, when present, is aligned with `doc_ids` too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub query_id:  String,
    pub query:     String,
    pub doc_ids:   Vec<String>,
    pub docs:      Vec<String>,
    pub targets:   Vec<f32>,
    pub relevance: Option<Vec<f32>>,
}

impl Sample {
    /// Number of documents attached to the query
    pub fn num_docs(&self) -> usize {
        self.doc_ids.len()
    }
}
