// ============================================================
// Layer 4 — Ranking Batcher (collator)
// ============================================================
// Converts a Vec<Sample> into tensors for one forward pass.
//
// The awkward part is that every query owns a different number
// of documents. Queries and documents are therefore encoded as
// two independent matrices, and the documents of all queries are
// flattened into one list in sample order:
//
//   samples:  q1 → [d1, d2, d3]     q2 → [d4, d5]
//
//   query_encoding  [2, Lq]   rows: q1, q2
//   doc_encoding    [5, Ld]   rows: d1, d2, d3, d4, d5
//   targets         [5]       same order as doc rows
//   doc_ids         [[d1, d2, d3], [d4, d5]]  ← the grouping
//
// Invariant: sum of per-query doc counts == doc rows == targets.
//
// Token layout per text:  [CLS] [Q|D] tokens... [PAD]...
// Each matrix is truncated to its own maximum length and padded
// to the longest row of THIS batch, not to a global length.
//
// Relevance is only present when at least one sample carries it
// (top sampling). It is padded with 0 to the largest per-query
// document count. A missing relevance tensor means "no grades",
// not "all grades zero".

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::domain::error::{RankingError, RankingResult};
use crate::domain::sample::Sample;
use crate::infra::tokenizer_store::{CLS_ID, DOC_MARKER_ID, PAD_ID, QUERY_MARKER_ID};

/// Tokenised, padded text matrix.
#[derive(Debug, Clone)]
pub struct BatchEncoding<B: Backend> {
    /// Token ids — shape: [rows, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding — shape: [rows, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,
}

impl<B: Backend> BatchEncoding<B> {
    /// Build from row-major id rows (already truncated, unpadded).
    pub fn from_rows(rows: &[Vec<u32>], device: &B::Device) -> Self {
        let seq_len = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut ids  = Vec::with_capacity(rows.len() * seq_len);
        let mut mask = Vec::with_capacity(rows.len() * seq_len);
        for row in rows {
            ids.extend(row.iter().map(|&id| id as i32));
            mask.extend(std::iter::repeat(1i32).take(row.len()));
            ids.extend(std::iter::repeat(PAD_ID as i32).take(seq_len - row.len()));
            mask.extend(std::iter::repeat(0i32).take(seq_len - row.len()));
        }
        let input_ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device)
            .reshape([rows.len(), seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask.as_slice(), device)
            .reshape([rows.len(), seq_len]);
        Self { input_ids, attention_mask }
    }

    /// Number of encoded texts
    pub fn rows(&self) -> usize {
        self.input_ids.dims()[0]
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.dims()[1]
    }
}

/// A collated batch of ranking samples.
#[derive(Debug, Clone)]
pub struct RankingBatch<B: Backend> {
    pub query_ids: Vec<String>,

    /// One row per query
    pub query_encoding: BatchEncoding<B>,

    /// Per-query document ids, in sample order
    pub doc_ids: Vec<Vec<String>>,

    /// One row per document, all queries flattened
    pub doc_encoding: BatchEncoding<B>,

    /// Flattened targets — shape: [total_docs]
    pub targets: Tensor<B, 1>,

    /// Padded relevance grades — shape: [samples_with_relevance, max_docs]
    pub relevance: Option<Tensor<B, 2>>,
}

impl<B: Backend> RankingBatch<B> {
    /// Documents per query
    pub fn num_docs(&self) -> Vec<usize> {
        self.doc_ids.iter().map(Vec::len).collect()
    }

    pub fn total_docs(&self) -> usize {
        self.doc_ids.iter().map(Vec::len).sum()
    }
}

/// Split a flat per-document list back into per-query groups.
pub fn split_by_counts<T: Clone>(flat: &[T], counts: &[usize]) -> RankingResult<Vec<Vec<T>>> {
    let total: usize = counts.iter().sum();
    if total != flat.len() {
        return Err(RankingError::config(format!(
            "counts sum to {total} but {} values were given",
            flat.len()
        )));
    }
    let mut groups = Vec::with_capacity(counts.len());
    let mut start = 0;
    for &count in counts {
        groups.push(flat[start..start + count].to_vec());
        start += count;
    }
    Ok(groups)
}

// ─── RankingBatcher ───────────────────────────────────────────────────────────
/// Holds the tokenizer, length limits and target device.
#[derive(Clone)]
pub struct RankingBatcher<B: Backend> {
    tokenizer:    Tokenizer,
    query_length: usize,
    doc_length:   usize,
    device:       B::Device,
}

impl<B: Backend> RankingBatcher<B> {
    /// Lengths include the two prefix tokens, so both must be >= 2.
    pub fn new(
        tokenizer:    Tokenizer,
        query_length: usize,
        doc_length:   usize,
        device:       B::Device,
    ) -> RankingResult<Self> {
        if query_length < 2 || doc_length < 2 {
            return Err(RankingError::config(format!(
                "query_length ({query_length}) and doc_length ({doc_length}) must be at least 2"
            )));
        }
        Ok(Self { tokenizer, query_length, doc_length, device })
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// [CLS] marker tokens..., truncated to `max_length`.
    fn encode_rows(&self, texts: &[&str], marker: u32, max_length: usize) -> RankingResult<Vec<Vec<u32>>> {
        texts
            .iter()
            .map(|text| {
                let encoding = self
                    .tokenizer
                    .encode(*text, false)
                    .map_err(|e| RankingError::Tokenizer(e.to_string()))?;
                let mut ids = Vec::with_capacity(max_length);
                ids.push(CLS_ID);
                ids.push(marker);
                ids.extend(encoding.get_ids().iter().copied().take(max_length - 2));
                Ok(ids)
            })
            .collect()
    }

    /// Tokenise query texts into a padded encoding.
    pub fn encode_queries(&self, queries: &[&str]) -> RankingResult<BatchEncoding<B>> {
        let rows = self.encode_rows(queries, QUERY_MARKER_ID, self.query_length)?;
        Ok(BatchEncoding::from_rows(&rows, &self.device))
    }

    /// Tokenise document texts into a padded encoding.
    pub fn encode_docs(&self, docs: &[&str]) -> RankingResult<BatchEncoding<B>> {
        let rows = self.encode_rows(docs, DOC_MARKER_ID, self.doc_length)?;
        Ok(BatchEncoding::from_rows(&rows, &self.device))
    }

    /// Merge samples into one batch.
    ///
    /// Steps:
    ///   1. Collect query ids/texts, flatten doc ids/texts/targets
    ///   2. Tokenise queries and documents separately
    ///   3. Build the flat target tensor
    ///   4. Pad relevance grades if any sample carries them
    pub fn collate(&self, samples: &[Sample]) -> RankingResult<RankingBatch<B>> {
        if samples.is_empty() {
            return Err(RankingError::config("cannot collate an empty list of samples"));
        }

        // ── Step 1: flatten ───────────────────────────────────────────────────
        let query_ids: Vec<String> = samples.iter().map(|s| s.query_id.clone()).collect();
        let queries: Vec<&str> = samples.iter().map(|s| s.query.as_str()).collect();
        let doc_ids: Vec<Vec<String>> = samples.iter().map(|s| s.doc_ids.clone()).collect();
        let docs: Vec<&str> = samples
            .iter()
            .flat_map(|s| s.docs.iter().map(String::as_str))
            .collect();
        let targets: Vec<f32> = samples.iter().flat_map(|s| s.targets.iter().copied()).collect();

        let total_docs: usize = doc_ids.iter().map(Vec::len).sum();
        if total_docs == 0 || docs.len() != total_docs || targets.len() != total_docs {
            return Err(RankingError::config(format!(
                "inconsistent samples: {} doc ids, {} doc texts, {} targets",
                total_docs,
                docs.len(),
                targets.len()
            )));
        }

        // ── Step 2: tokenise ──────────────────────────────────────────────────
        let query_encoding = self.encode_queries(&queries)?;
        let doc_encoding = self.encode_docs(&docs)?;

        // ── Step 3: targets ───────────────────────────────────────────────────
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device);

        // ── Step 4: relevance ─────────────────────────────────────────────────
        let grades: Vec<&Vec<f32>> = samples.iter().filter_map(|s| s.relevance.as_ref()).collect();
        let relevance = if grades.is_empty() {
            None
        } else {
            let width = grades.iter().map(|g| g.len()).max().unwrap_or(0);
            let mut flat = Vec::with_capacity(grades.len() * width);
            for g in &grades {
                flat.extend(g.iter().copied());
                flat.extend(std::iter::repeat(0.0f32).take(width - g.len()));
            }
            Some(
                Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
                    .reshape([grades.len(), width]),
            )
        };

        tracing::debug!(
            "Collated {} queries with {} documents (query_len={}, doc_len={})",
            query_ids.len(),
            total_docs,
            query_encoding.seq_len(),
            doc_encoding.seq_len()
        );

        Ok(RankingBatch {
            query_ids,
            query_encoding,
            doc_ids,
            doc_encoding,
            targets,
            relevance,
        })
    }
}

// ─── burn Batcher ─────────────────────────────────────────────────────────────
// Items arrive as dataset results; the first failed item fails the
// whole batch and the error is handed to the loop driving the loader.
impl<B: Backend> Batcher<RankingResult<Sample>, RankingResult<RankingBatch<B>>> for RankingBatcher<B> {
    fn batch(&self, items: Vec<RankingResult<Sample>>) -> RankingResult<RankingBatch<B>> {
        let samples = items.into_iter().collect::<RankingResult<Vec<_>>>()?;
        self.collate(&samples)
    }
}
