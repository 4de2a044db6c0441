use burn::prelude::*;

use crate::domain::error::{RankingError, RankingResult};

/// Encoder output for a batch of texts: one vector per (pooled) token
/// plus a mask telling the scorer which vectors take part.
#[derive(Debug, Clone)]
pub struct BiEncoderEmbedding<B: Backend> {
    /// [batch, seq_len, embedding_dim]
    pub embeddings: Tensor<B, 3>,
    /// [batch, seq_len], true = scored
    pub scoring_mask: Tensor<B, 2, Bool>,
}

impl<B: Backend> BiEncoderEmbedding<B> {
    /// Pair embeddings with their mask, checking the shapes agree.
    pub fn new(embeddings: Tensor<B, 3>, scoring_mask: Tensor<B, 2, Bool>) -> RankingResult<Self> {
        let [batch, seq_len, _] = embeddings.dims();
        let [mask_batch, mask_len] = scoring_mask.dims();
        if batch != mask_batch || seq_len != mask_len {
            return Err(RankingError::config(format!(
                "scoring mask [{mask_batch}, {mask_len}] does not match embeddings [{batch}, {seq_len}, _]"
            )));
        }
        Ok(Self { embeddings, scoring_mask })
    }

    /// Number of texts in the batch
    pub fn batch_size(&self) -> usize {
        self.embeddings.dims()[0]
    }
}
