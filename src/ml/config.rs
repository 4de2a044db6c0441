use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::error::{RankingError, RankingResult};

/// Token-to-token similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityFunction {
    Dot,
    Cosine,
    /// Negative Euclidean distance
    L2,
}

/// Reduction of per-query-token best matches to one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryAggregation {
    Sum,
    Mean,
    Max,
}

/// How token embeddings are pooled into a fixed number of vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// Keep the first `num_viewer_tokens` positions
    First,
    Mean,
    Max,
    Sum,
}

macro_rules! str_enum {
    ($ty:ident, $kind:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = RankingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(RankingError::config(format!(
                        concat!("unknown ", $kind, " '{}'"), other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }
    };
}

str_enum!(SimilarityFunction, "similarity function", {
    "dot" => Dot, "cosine" => Cosine, "l2" => L2,
});
str_enum!(QueryAggregation, "query aggregation", {
    "sum" => Sum, "mean" => Mean, "max" => Max,
});
str_enum!(PoolingStrategy, "pooling strategy", {
    "first" => First, "mean" => Mean, "max" => Max, "sum" => Sum,
});

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct MvrConfig {
    #[config(default = 30522)]
    pub vocab_size: usize,
    #[config(default = 128)]
    pub hidden_size: usize,
    /// Longest encodable sequence (position embedding rows)
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 128)]
    pub embedding_dim: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = "SimilarityFunction::Dot")]
    pub similarity: SimilarityFunction,
    #[config(default = "QueryAggregation::Sum")]
    pub query_aggregation: QueryAggregation,
    /// L2-normalise embeddings after pooling
    #[config(default = false)]
    pub normalize: bool,
    pub query_pooling: Option<PoolingStrategy>,
    pub doc_pooling: Option<PoolingStrategy>,
    /// Vectors kept per text when pooling (1 when unset)
    pub num_viewer_tokens: Option<usize>,
    /// Token ids never scored (e.g. punctuation)
    #[config(default = "Vec::new()")]
    pub mask_scoring_input_ids: Vec<i64>,
}

impl MvrConfig {
    /// Vectors produced per text under a pooling strategy.
    pub fn pooled_vectors(&self) -> usize {
        self.num_viewer_tokens.unwrap_or(1)
    }

    /// Reject combinations the encoder cannot produce.
    pub fn validate(&self) -> RankingResult<()> {
        if self.num_viewer_tokens == Some(0) {
            return Err(RankingError::config("num_viewer_tokens must be at least 1"));
        }
        if self.vocab_size == 0
            || self.hidden_size == 0
            || self.embedding_dim == 0
            || self.max_position_embeddings == 0
        {
            return Err(RankingError::config(
                "vocab_size, hidden_size, embedding_dim and max_position_embeddings must be positive",
            ));
        }
        for pooling in [self.query_pooling, self.doc_pooling].into_iter().flatten() {
            if pooling != PoolingStrategy::First && self.pooled_vectors() > 1 {
                return Err(RankingError::config(format!(
                    "{pooling} pooling yields a single vector but num_viewer_tokens is {}",
                    self.pooled_vectors()
                )));
            }
        }
        Ok(())
    }
}
