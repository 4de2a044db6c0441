// ============================================================
// Layer 5 — Reranker
// ============================================================
// Scores the candidates of an inference run dataset with a trained
// model and turns the scores into a new run:
//
//   BatchLoader ──iter──▶ RankingBatch ──forward──▶ scores [N]
//                             │                          │
//                             └─ query_ids, doc_ids ──┬──┘
//                                                     ▼
//                                          create_run_from_scores
use anyhow::Result;
use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::data::batcher::{RankingBatch, RankingBatcher};
use crate::domain::error::{RankingError, RankingResult};
use crate::domain::sample::{RunRecord, Sample};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::run_writer::create_run_from_scores;
use crate::ml::model::MvrModel;

pub type InferBackend = burn::backend::Wgpu;

pub struct Reranker<B: Backend> {
    model:   MvrModel<B>,
    batcher: RankingBatcher<B>,
}

impl Reranker<InferBackend> {
    /// Load the latest checkpoint on the default WGPU device.
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        tokenizer:    Tokenizer,
        query_length: usize,
        doc_length:   usize,
    ) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let model = ckpt_manager.load_model::<InferBackend>(&device)?;
        let batcher = RankingBatcher::new(tokenizer, query_length, doc_length, device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self::new(model, batcher))
    }
}

impl<B: Backend> Reranker<B> {
    pub fn new(model: MvrModel<B>, batcher: RankingBatcher<B>) -> Self {
        Self { model, batcher }
    }

    /// Batcher to hand to `DataModule::inference_loader`.
    pub fn batcher(&self) -> &RankingBatcher<B> {
        &self.batcher
    }

    /// One score per document, flattened in sample order.
    pub fn score_samples(&self, samples: &[Sample]) -> RankingResult<Vec<f32>> {
        self.score_batch(&self.batcher.collate(samples)?)
    }

    /// One score per document row of a collated batch.
    pub fn score_batch(&self, batch: &RankingBatch<B>) -> RankingResult<Vec<f32>> {
        let output = self.model.forward(
            Some(&batch.query_encoding),
            Some(&batch.doc_encoding),
            batch.num_docs(),
        )?;
        let scores = output
            .scores
            .ok_or_else(|| RankingError::config("model produced no scores"))?;
        scores
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| RankingError::config(format!("cannot read scores: {e:?}")))
    }

    /// Score every batch and rank each query's documents.
    pub fn rerank<I>(&self, batches: I) -> RankingResult<Vec<RunRecord>>
    where
        I: IntoIterator<Item = RankingResult<RankingBatch<B>>>,
    {
        let mut query_ids = Vec::new();
        let mut doc_ids = Vec::new();
        let mut scores = Vec::new();

        for batch in batches {
            let batch = batch?;
            scores.extend(self.score_batch(&batch)?);
            query_ids.extend(batch.query_ids);
            doc_ids.extend(batch.doc_ids);
        }
        tracing::debug!("Scored {} documents for {} queries", scores.len(), query_ids.len());
        create_run_from_scores(&query_ids, &doc_ids, &scores)
    }
}
