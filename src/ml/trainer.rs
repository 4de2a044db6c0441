// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Adam training over ranking batches with per-epoch validation.
//
// The train and validation loaders are built once; the train
// loader reshuffles on every pass.
//
// Per epoch:
//   1. pull collated batches from the train loader
//   2. forward → ranking loss → backward → Adam step
//   3. model.valid() on the inner backend, loss over every
//      inference (validation) run dataset
//   4. metrics CSV row + checkpoint
//
// Only the encoder is a burn Module; the scorer is stateless, so
// the optimizer steps `model.encoder` directly.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::{RankingBatch, RankingBatcher};
use crate::data::datamodule::DataModule;
use crate::domain::error::{RankingError, RankingResult};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
    registry::ModelRegistry,
};
use crate::ml::loss::LossFunction;
use crate::ml::model::MvrModel;

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Build the model from its preset and train it on the WGPU device.
pub fn run_training(
    cfg:          &TrainConfig,
    datamodule:   &DataModule,
    tokenizer:    Tokenizer,
    ckpt_manager: &CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    let registry = ModelRegistry::<MyBackend>::with_defaults();
    let vocab_size = tokenizer.get_vocab_size(true);
    let model = registry
        .build_with(&cfg.preset, |config| cfg.customize(config, vocab_size), &device)
        .with_context(|| format!("Cannot build model preset '{}'", cfg.preset))?;
    ckpt_manager.save_model_config(model.config())?;

    let metrics = MetricsLogger::new(ckpt_manager.dir().clone())?;
    train_loop(cfg, model, datamodule, tokenizer, ckpt_manager, &metrics, &device)?;
    Ok(())
}

/// Ranking loss of one collated batch.
fn batch_loss<B: Backend>(
    model: &MvrModel<B>,
    batch: RankingBatch<B>,
    loss:  LossFunction,
) -> RankingResult<Tensor<B, 1>> {
    let num_docs = batch.num_docs();
    let output = model.forward(
        Some(&batch.query_encoding),
        Some(&batch.doc_encoding),
        num_docs.clone(),
    )?;
    let scores = output
        .scores
        .ok_or_else(|| RankingError::config("model produced no scores"))?;
    loss.compute(scores, batch.targets, &num_docs)
}

/// Train for `cfg.epochs` epochs and return the final model.
pub fn train_loop<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    mut model:    MvrModel<B>,
    datamodule:   &DataModule,
    tokenizer:    Tokenizer,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
    device:       &B::Device,
) -> Result<MvrModel<B>> {
    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher =
        RankingBatcher::<B>::new(tokenizer.clone(), cfg.query_length, cfg.doc_length, device.clone())?;
    let train_loader = datamodule.train_loader(train_batcher)?;

    // ── Validation data loaders (InnerBackend, no autodiff overhead) ──────────
    let val_batcher = RankingBatcher::<B::InnerBackend>::new(
        tokenizer,
        cfg.query_length,
        cfg.doc_length,
        device.clone(),
    )?;
    let val_loaders = (0..datamodule.inference_datasets().len())
        .map(|index| datamodule.inference_loader(index, val_batcher.clone()))
        .collect::<RankingResult<Vec<_>>>()?;

    let mut best_val_loss = f64::INFINITY;

    for epoch in 1..=cfg.epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches = 0usize;

        for batch in train_loader.iter() {
            let loss = batch_loss(&model, batch?, cfg.loss)?;

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model.encoder);
            model.encoder = optim.step(cfg.lr, model.encoder, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else {
            f64::NAN
        };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let mut val_loss_sum = 0.0f64;
        let mut val_batches = 0usize;

        for val_loader in &val_loaders {
            for batch in val_loader.iter() {
                let loss = batch_loss(&model_valid, batch?, cfg.loss)?;
                val_loss_sum += loss.into_scalar().elem::<f64>();
                val_batches += 1;
            }
        }

        let avg_val_loss = if val_batches > 0 {
            val_loss_sum / val_batches as f64
        } else {
            f64::NAN
        };

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | batches={}",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss, train_batches,
        );

        let row = EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, train_batches);
        if row.is_improvement(best_val_loss) {
            tracing::info!("Validation loss improved to {:.4}", avg_val_loss);
            best_val_loss = avg_val_loss;
        }
        metrics.log(&row)?;

        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Training complete!");
    Ok(model)
}
