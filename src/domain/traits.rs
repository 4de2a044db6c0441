// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data layer produces Samples in two different ways and the
// rest of the system should not have to pretend they are the
// same thing:
//
//   burn Dataset   — finite and indexable (graded runs).
//                    burn's DataLoader shuffles indices and
//                    asks for any item in any order.
//
//   SampleStream   — single-pass producer (supervision triples).
//                    Each call to stream() starts a fresh pass;
//                    items can only be read in file order.
//
// DocumentStore is the seam to the document collection. The
// in-memory TSV store is one implementation; a memory-mapped or
// remote store would be another.

use crate::domain::error::RankingResult;
use crate::domain::sample::Sample;

// ─── DocumentStore ────────────────────────────────────────────────────────────
/// Lookup of document text by id.
///
/// Implementations:
///   - InMemoryDocStore → loaded from a doc_id<TAB>text file
pub trait DocumentStore: Send + Sync {
    /// Return the text for `doc_id`, or a NotFound error.
    fn get(&self, doc_id: &str) -> RankingResult<&str>;

    /// Number of documents in the store
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── SampleStream ─────────────────────────────────────────────────────────────
/// A single-pass producer of samples.
///
/// Implementations:
///   - TriplesDataset → one sample per supervision record
pub trait SampleStream {
    /// Start a new pass over the underlying records.
    fn stream(&self) -> Box<dyn Iterator<Item = RankingResult<Sample>> + '_>;
}
