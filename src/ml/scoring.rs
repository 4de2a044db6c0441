// ============================================================
// Layer 5 — Multi-Vector Scorer
// ============================================================
// Late-interaction scoring between query and document vectors:
//
//   score(q, d) = AGG_i  max_j  sim(q_i, d_j)
//
// where i runs over scored query vectors and j over scored
// document vectors. Batches are ragged (query k owns num_docs[k]
// consecutive documents), so each query is first gathered once
// per document it owns:
//
//   queries [Q, Lq, D] ──select(idx)──▶ [N, Lq, D]
//   docs    [N, Ld, D]
//   sim     [N, Lq, Ld]   batched matmul / distance
//
// Masked document vectors are filled with -inf so they never win
// the max. Masked query vectors are excluded from the final
// aggregation (0 for sum/mean, -inf for max).

use burn::prelude::*;

use crate::domain::error::{RankingError, RankingResult};
use crate::ml::config::{MvrConfig, QueryAggregation, SimilarityFunction};
use crate::ml::embedding::BiEncoderEmbedding;

const EPS: f32 = 1e-12;

/// How documents of a batch are assigned to its queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumDocs {
    /// One count per query, summing to the number of documents
    PerQuery(Vec<usize>),
    /// The same count for every query
    Uniform(usize),
    /// Documents divided evenly among queries
    Infer,
}

impl NumDocs {
    /// Resolve into one count per query, or a Config error.
    pub fn resolve(&self, num_queries: usize, total_docs: usize) -> RankingResult<Vec<usize>> {
        match self {
            Self::PerQuery(counts) => {
                if counts.len() != num_queries {
                    return Err(RankingError::config(format!(
                        "num_docs has {} entries but there are {num_queries} queries",
                        counts.len()
                    )));
                }
                let sum: usize = counts.iter().sum();
                if sum != total_docs {
                    return Err(RankingError::config(format!(
                        "num_docs sums to {sum} but there are {total_docs} documents"
                    )));
                }
                Ok(counts.clone())
            }
            Self::Uniform(count) => {
                if count * num_queries != total_docs {
                    return Err(RankingError::config(format!(
                        "{count} documents per query does not match {total_docs} documents \
                         for {num_queries} queries"
                    )));
                }
                Ok(vec![*count; num_queries])
            }
            Self::Infer => {
                if num_queries == 0 || total_docs % num_queries != 0 {
                    return Err(RankingError::config(format!(
                        "cannot infer documents per query: {total_docs} documents for \
                         {num_queries} queries"
                    )));
                }
                Ok(vec![total_docs / num_queries; num_queries])
            }
        }
    }
}

impl From<Vec<usize>> for NumDocs {
    fn from(counts: Vec<usize>) -> Self {
        Self::PerQuery(counts)
    }
}

impl From<usize> for NumDocs {
    fn from(count: usize) -> Self {
        Self::Uniform(count)
    }
}

/// Document scores plus the token-level similarity they came from.
#[derive(Debug, Clone)]
pub struct ScoringOutput<B: Backend> {
    /// [total_docs]
    pub scores: Tensor<B, 1>,
    /// [total_docs, query_len, doc_len], masked doc vectors at -inf
    pub token_scores: Tensor<B, 3>,
}

/// Stateless late-interaction scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiVectorScorer {
    pub similarity:        SimilarityFunction,
    pub query_aggregation: QueryAggregation,
}

impl MultiVectorScorer {
    pub fn new(similarity: SimilarityFunction, query_aggregation: QueryAggregation) -> Self {
        Self { similarity, query_aggregation }
    }

    pub fn from_config(config: &MvrConfig) -> Self {
        Self::new(config.similarity, config.query_aggregation)
    }

    /// Score every document against the query it belongs to.
    pub fn score<B: Backend>(
        &self,
        query:    &BiEncoderEmbedding<B>,
        doc:      &BiEncoderEmbedding<B>,
        num_docs: impl Into<NumDocs>,
    ) -> RankingResult<ScoringOutput<B>> {
        let [num_queries, query_len, dim] = query.embeddings.dims();
        let [total_docs, doc_len, doc_dim] = doc.embeddings.dims();
        if dim != doc_dim {
            return Err(RankingError::config(format!(
                "query embedding dim {dim} does not match document embedding dim {doc_dim}"
            )));
        }
        let counts = num_docs.into().resolve(num_queries, total_docs)?;

        // ── Broadcast each query to its documents ─────────────────────────────
        let owner: Vec<i32> = counts
            .iter()
            .enumerate()
            .flat_map(|(q, &count)| std::iter::repeat(q as i32).take(count))
            .collect();
        let device = query.embeddings.device();
        let owner = Tensor::<B, 1, Int>::from_ints(owner.as_slice(), &device);
        let query_embeddings = query.embeddings.clone().select(0, owner.clone()); // [N, Lq, D]
        let query_mask = query
            .scoring_mask
            .clone()
            .int()
            .select(0, owner)
            .equal_elem(1); // [N, Lq]

        // ── Token-level similarity ────────────────────────────────────────────
        let sim = self.similarity_matrix(query_embeddings, doc.embeddings.clone()); // [N, Lq, Ld]
        let doc_mask = doc
            .scoring_mask
            .clone()
            .unsqueeze_dim::<3>(1)
            .expand([total_docs, query_len, doc_len]);
        let token_scores = sim.mask_fill(doc_mask.bool_not(), f32::NEG_INFINITY);

        // ── Best document match per query vector ──────────────────────────────
        let best = token_scores.clone().max_dim(2).squeeze::<2>(2); // [N, Lq]

        // ── Aggregate over query vectors ──────────────────────────────────────
        let excluded = query_mask.clone().bool_not();
        let scores = match self.query_aggregation {
            QueryAggregation::Sum => best.mask_fill(excluded, 0.0).sum_dim(1),
            QueryAggregation::Mean => {
                let counted = query_mask.float().sum_dim(1).clamp_min(1.0);
                best.mask_fill(excluded, 0.0).sum_dim(1) / counted
            }
            QueryAggregation::Max => best.mask_fill(excluded, f32::NEG_INFINITY).max_dim(1),
        }
        .squeeze::<1>(1);

        Ok(ScoringOutput { scores, token_scores })
    }

    /// [N, Lq, D] x [N, Ld, D] → [N, Lq, Ld]
    fn similarity_matrix<B: Backend>(&self, query: Tensor<B, 3>, doc: Tensor<B, 3>) -> Tensor<B, 3> {
        match self.similarity {
            SimilarityFunction::Dot => query.matmul(doc.swap_dims(1, 2)),
            SimilarityFunction::Cosine => {
                l2_normalize(query).matmul(l2_normalize(doc).swap_dims(1, 2))
            }
            SimilarityFunction::L2 => {
                // |q - d|^2 = |q|^2 + |d|^2 - 2 q.d
                let q_sq = query.clone().powf_scalar(2.0).sum_dim(2);              // [N, Lq, 1]
                let d_sq = doc.clone().powf_scalar(2.0).sum_dim(2).swap_dims(1, 2); // [N, 1, Ld]
                let cross = query.matmul(doc.swap_dims(1, 2));                      // [N, Lq, Ld]
                let dist_sq = (q_sq + d_sq - cross.mul_scalar(2.0)).clamp_min(EPS);
                dist_sq.sqrt().neg()
            }
        }
    }
}

/// Scale every vector along the last dim to unit length.
pub fn l2_normalize<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(2).sqrt().clamp_min(EPS);
    x / norm
}
