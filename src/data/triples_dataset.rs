// ============================================================
// Layer 4 — Triples Dataset
// ============================================================
// Streams (query, doc_a, doc_b) supervision records and turns
// each one into a two-document Sample:
//
//   0.8 0.2 q1 d1 d2   →  Sample { doc_ids: [d1, d2], targets: [0.8, 0.2] }
//   q1 d1 d2           →  Sample { doc_ids: [d1, d2], targets: [1.0, 0.0] }
//
// Triples files are far too large to index, so this dataset is a
// SampleStream, not a burn Dataset: every call to stream()
// re-opens the source and walks it once, in file order.

use std::path::PathBuf;
use std::sync::Arc;

use crate::data::loader::DocPairReader;
use crate::domain::corpus::Corpus;
use crate::domain::error::RankingResult;
use crate::domain::sample::{DocPair, Sample, ScoredDocPair};
use crate::domain::traits::SampleStream;

/// Where the supervision records come from.
#[derive(Debug, Clone)]
pub enum DocPairSource {
    /// Whitespace-delimited file, read lazily
    File(PathBuf),
    /// Records already in memory
    Memory(Vec<DocPair>),
}

/// Single-pass dataset over supervision triples.
pub struct TriplesDataset {
    source: DocPairSource,
    corpus: Arc<Corpus>,
}

impl TriplesDataset {
    pub fn new(source: DocPairSource, corpus: Arc<Corpus>) -> Self {
        Self { source, corpus }
    }

    pub fn from_path(path: impl Into<PathBuf>, corpus: Arc<Corpus>) -> Self {
        Self::new(DocPairSource::File(path.into()), corpus)
    }

    pub fn source(&self) -> &DocPairSource {
        &self.source
    }

    fn to_sample(&self, pair: ScoredDocPair) -> RankingResult<Sample> {
        let query = self.corpus.query_text(&pair.query_id)?.to_string();
        let doc_a = self.corpus.doc_text(&pair.doc_id_a)?.to_string();
        let doc_b = self.corpus.doc_text(&pair.doc_id_b)?.to_string();
        Ok(Sample {
            query_id:  pair.query_id,
            query,
            doc_ids:   vec![pair.doc_id_a, pair.doc_id_b],
            docs:      vec![doc_a, doc_b],
            targets:   vec![pair.score_a, pair.score_b],
            relevance: None,
        })
    }
}

impl SampleStream for TriplesDataset {
    fn stream(&self) -> Box<dyn Iterator<Item = RankingResult<Sample>> + '_> {
        let pairs: Box<dyn Iterator<Item = RankingResult<DocPair>> + '_> = match &self.source {
            DocPairSource::File(path) => match DocPairReader::open(path) {
                Ok(reader) => Box::new(reader),
                Err(e) => Box::new(std::iter::once(Err(e))),
            },
            DocPairSource::Memory(pairs) => Box::new(pairs.iter().cloned().map(Ok)),
        };
        Box::new(pairs.map(move |pair| self.to_sample(pair?.scored())))
    }
}
