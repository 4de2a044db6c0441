// ============================================================
// Layer 5 — MVR Model
// ============================================================
// A shared text encoder plus the multi-vector scorer.
//
//   input_ids [b, s]
//     → token + position embedding  [b, s, hidden]
//     → LayerNorm → dropout
//     → GELU feed-forward + residual
//     → projection                  [b, s, embedding_dim]
//     → pooling (optional)          [b, n, embedding_dim]
//     → L2 normalisation (optional)
//
// Pooling turns a token sequence into a fixed number of vectors:
//   first  the first num_viewer_tokens positions (viewer tokens)
//   mean   masked mean over real tokens      → 1 vector
//   max    masked max over real tokens       → 1 vector
//   sum    masked sum over real tokens       → 1 vector
//
// Queries and documents use the same encoder but may pool
// differently (query_pooling / doc_pooling).

use burn::{
    module::AutodiffModule,
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation::gelu, backend::AutodiffBackend},
};

use crate::data::batcher::BatchEncoding;
use crate::domain::error::{RankingError, RankingResult};
use crate::ml::config::{MvrConfig, PoolingStrategy};
use crate::ml::embedding::BiEncoderEmbedding;
use crate::ml::scoring::{l2_normalize, MultiVectorScorer, NumDocs, ScoringOutput};

impl MvrConfig {
    /// Fresh encoder weights for this configuration.
    pub fn init_encoder<B: Backend>(&self, device: &B::Device) -> MvrEncoder<B> {
        MvrEncoder {
            token_embedding:    EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            position_embedding: EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size).init(device),
            norm:               LayerNormConfig::new(self.hidden_size).init(device),
            feed_forward:       LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            projection:         LinearConfig::new(self.hidden_size, self.embedding_dim).init(device),
            dropout:            DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct MvrEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub norm:               LayerNorm<B>,
    pub feed_forward:       Linear<B>,
    pub projection:         Linear<B>,
    pub dropout:            Dropout,
}

impl<B: Backend> MvrEncoder<B> {
    /// input_ids: [batch, seq_len] → [batch, seq_len, embedding_dim]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let tok_emb = self.token_embedding.forward(input_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let x = self.dropout.forward(self.norm.forward(tok_emb + pos_emb));
        let x = x.clone() + self.dropout.forward(gelu(self.feed_forward.forward(x)));
        self.projection.forward(x)
    }
}

/// Output of one forward pass; absent parts mean the matching input was absent.
#[derive(Debug, Clone)]
pub struct MvrOutput<B: Backend> {
    /// [total_docs]
    pub scores:              Option<Tensor<B, 1>>,
    pub query_embeddings:    Option<BiEncoderEmbedding<B>>,
    pub doc_embeddings:      Option<BiEncoderEmbedding<B>>,
    /// Per query-vector / doc-vector similarities: [total_docs, Lq, Ld]
    pub viewer_token_scores: Option<Tensor<B, 3>>,
}

/// Encoder weights with the configuration and scorer they are used with.
#[derive(Debug, Clone)]
pub struct MvrModel<B: Backend> {
    pub encoder: MvrEncoder<B>,
    config:      MvrConfig,
    scorer:      MultiVectorScorer,
}

impl<B: Backend> MvrModel<B> {
    pub fn new(config: MvrConfig, encoder: MvrEncoder<B>) -> RankingResult<Self> {
        config.validate()?;
        let scorer = MultiVectorScorer::from_config(&config);
        Ok(Self { encoder, config, scorer })
    }

    /// Model with freshly initialised weights.
    pub fn init(config: MvrConfig, device: &B::Device) -> RankingResult<Self> {
        config.validate()?;
        let encoder = config.init_encoder(device);
        Self::new(config, encoder)
    }

    pub fn config(&self) -> &MvrConfig {
        &self.config
    }

    pub fn scorer(&self) -> &MultiVectorScorer {
        &self.scorer
    }

    pub fn encode_query(&self, encoding: &BatchEncoding<B>) -> RankingResult<BiEncoderEmbedding<B>> {
        self.encode(encoding, self.config.query_pooling)
    }

    pub fn encode_doc(&self, encoding: &BatchEncoding<B>) -> RankingResult<BiEncoderEmbedding<B>> {
        self.encode(encoding, self.config.doc_pooling)
    }

    fn encode(
        &self,
        encoding: &BatchEncoding<B>,
        pooling:  Option<PoolingStrategy>,
    ) -> RankingResult<BiEncoderEmbedding<B>> {
        let seq_len = encoding.seq_len();
        if seq_len > self.config.max_position_embeddings {
            return Err(RankingError::config(format!(
                "sequence length {seq_len} exceeds max_position_embeddings {}",
                self.config.max_position_embeddings
            )));
        }

        let embeddings = self.encoder.forward(encoding.input_ids.clone());
        let embeddings = self.pool(embeddings, encoding, pooling)?;
        let embeddings = if self.config.normalize {
            l2_normalize(embeddings)
        } else {
            embeddings
        };
        let scoring_mask = self.config.scoring_mask(encoding, pooling);
        BiEncoderEmbedding::new(embeddings, scoring_mask)
    }

    fn pool(
        &self,
        embeddings: Tensor<B, 3>,
        encoding:   &BatchEncoding<B>,
        pooling:    Option<PoolingStrategy>,
    ) -> RankingResult<Tensor<B, 3>> {
        let Some(pooling) = pooling else {
            return Ok(embeddings);
        };
        let [batch_size, seq_len, dim] = embeddings.dims();
        let real = encoding.attention_mask.clone().float().unsqueeze_dim::<3>(2); // [b, s, 1]

        let pooled = match pooling {
            PoolingStrategy::First => {
                // Always exactly n vectors; short batches get zero rows.
                let n = self.config.pooled_vectors();
                if seq_len < n {
                    let padding = Tensor::zeros([batch_size, n - seq_len, dim], &embeddings.device());
                    Tensor::cat(vec![embeddings, padding], 1)
                } else {
                    embeddings.slice([0..batch_size, 0..n, 0..dim])
                }
            }
            PoolingStrategy::Sum => (embeddings * real).sum_dim(1),
            PoolingStrategy::Mean => {
                let counts = real.clone().sum_dim(1).clamp_min(1.0); // [b, 1, 1]
                (embeddings * real).sum_dim(1) / counts
            }
            PoolingStrategy::Max => {
                let padding = encoding
                    .attention_mask
                    .clone()
                    .equal_elem(0)
                    .unsqueeze_dim::<3>(2)
                    .expand([batch_size, seq_len, dim]);
                embeddings.mask_fill(padding, f32::NEG_INFINITY).max_dim(1)
            }
        };
        Ok(pooled)
    }

    /// Score documents against their queries.
    pub fn score(
        &self,
        query:    &BiEncoderEmbedding<B>,
        doc:      &BiEncoderEmbedding<B>,
        num_docs: impl Into<NumDocs>,
    ) -> RankingResult<ScoringOutput<B>> {
        self.scorer.score(query, doc, num_docs)
    }

    /// Encode whichever sides are given; score when both are.
    pub fn forward(
        &self,
        query_encoding: Option<&BatchEncoding<B>>,
        doc_encoding:   Option<&BatchEncoding<B>>,
        num_docs:       impl Into<NumDocs>,
    ) -> RankingResult<MvrOutput<B>> {
        let query_embeddings = query_encoding.map(|e| self.encode_query(e)).transpose()?;
        let doc_embeddings = doc_encoding.map(|e| self.encode_doc(e)).transpose()?;

        let (scores, viewer_token_scores) = match (&query_embeddings, &doc_embeddings) {
            (Some(q), Some(d)) => {
                let out = self.score(q, d, num_docs)?;
                (Some(out.scores), Some(out.token_scores))
            }
            _ => (None, None),
        };

        Ok(MvrOutput { scores, query_embeddings, doc_embeddings, viewer_token_scores })
    }
}

impl<B: AutodiffBackend> MvrModel<B> {
    /// Same weights on the inner backend, dropout disabled.
    pub fn valid(&self) -> MvrModel<B::InnerBackend> {
        MvrModel {
            encoder: self.encoder.valid(),
            config:  self.config.clone(),
            scorer:  self.scorer,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::config::SimilarityFunction;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> MvrConfig {
        MvrConfig::new()
            .with_vocab_size(32)
            .with_hidden_size(8)
            .with_embedding_dim(4)
            .with_max_position_embeddings(16)
    }

    fn queries() -> BatchEncoding<TestBackend> {
        BatchEncoding::from_rows(&[vec![2, 4, 10, 11], vec![2, 4, 12]], &Default::default())
    }

    fn docs() -> BatchEncoding<TestBackend> {
        BatchEncoding::from_rows(
            &[vec![2, 5, 10], vec![2, 5, 13, 14, 15], vec![2, 5, 11], vec![2, 5, 16, 17]],
            &Default::default(),
        )
    }

    #[test]
    fn test_forward_scores_every_document() {
        let model = MvrModel::<TestBackend>::init(small_config(), &Default::default()).unwrap();
        let out = model.forward(Some(&queries()), Some(&docs()), vec![3, 1]).unwrap();
        let scores = out.scores.unwrap();
        assert_eq!(scores.dims(), [4]);
        assert_eq!(out.viewer_token_scores.unwrap().dims(), [4, 4, 5]);
        assert_eq!(out.query_embeddings.unwrap().embeddings.dims(), [2, 4, 4]);
    }

    #[test]
    fn test_one_sided_forward_only_encodes() {
        let model = MvrModel::<TestBackend>::init(small_config(), &Default::default()).unwrap();
        let out = model.forward(None, Some(&docs()), NumDocs::Infer).unwrap();
        assert!(out.scores.is_none());
        assert!(out.query_embeddings.is_none());
        assert_eq!(out.doc_embeddings.unwrap().batch_size(), 4);
    }

    #[test]
    fn test_viewer_token_pooling_keeps_first_positions() {
        let config = small_config()
            .with_num_viewer_tokens(Some(2))
            .with_doc_pooling(Some(PoolingStrategy::First));
        let model = MvrModel::<TestBackend>::init(config, &Default::default()).unwrap();
        let doc = model.encode_doc(&docs()).unwrap();
        assert_eq!(doc.embeddings.dims(), [4, 2, 4]);
        assert_eq!(doc.scoring_mask.dims(), [4, 2]);

        let out = model.forward(Some(&queries()), Some(&docs()), 2usize).unwrap();
        assert_eq!(out.viewer_token_scores.unwrap().dims(), [4, 4, 2]);
    }

    #[test]
    fn test_viewer_tokens_pad_sequences_shorter_than_the_pool() {
        let config = small_config()
            .with_num_viewer_tokens(Some(4))
            .with_doc_pooling(Some(PoolingStrategy::First));
        let model = MvrModel::<TestBackend>::init(config, &Default::default()).unwrap();
        let short_docs = BatchEncoding::from_rows(&[vec![2, 5, 8], vec![2, 5, 9]], &Default::default());

        let doc = model.encode_doc(&short_docs).unwrap();
        assert_eq!(doc.embeddings.dims(), [2, 4, 4]);
        assert_eq!(doc.scoring_mask.dims(), [2, 4]);
        let mask = doc.scoring_mask.clone().into_data().to_vec::<bool>().unwrap();
        assert!(mask.iter().all(|&m| m));
        let padded = doc
            .embeddings
            .clone()
            .slice([0..2, 3..4, 0..4])
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(padded.iter().all(|&v| v == 0.0));

        let out = model.forward(Some(&queries()), Some(&short_docs), 1usize).unwrap();
        assert_eq!(out.scores.unwrap().dims(), [2]);
        assert_eq!(out.viewer_token_scores.unwrap().dims(), [2, 4, 4]);
    }

    #[test]
    fn test_mean_pooling_with_normalisation_gives_unit_vectors() {
        let config = small_config()
            .with_normalize(true)
            .with_similarity(SimilarityFunction::Cosine)
            .with_query_pooling(Some(PoolingStrategy::Mean));
        let model = MvrModel::<TestBackend>::init(config, &Default::default()).unwrap();
        let query = model.encode_query(&queries()).unwrap();
        assert_eq!(query.embeddings.dims(), [2, 1, 4]);
        let norms = query
            .embeddings
            .powf_scalar(2.0)
            .sum_dim(2)
            .sqrt()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(norms.iter().all(|n| (n - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_too_long_sequences_are_rejected() {
        let config = small_config().with_max_position_embeddings(3);
        let model = MvrModel::<TestBackend>::init(config, &Default::default()).unwrap();
        assert!(matches!(model.encode_query(&queries()), Err(RankingError::Config(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = small_config().with_num_viewer_tokens(Some(0));
        assert!(MvrModel::<TestBackend>::init(config, &Default::default()).is_err());
    }
}
