// ============================================================
// Layer 2 — RerankUseCase
// ============================================================
// Re-scores first-stage runs with a trained checkpoint:
//
//   Step 1: Load saved training config + tokenizer   (Layer 6 - infra)
//   Step 2: Load queries and documents               (Layer 4 - data)
//   Step 3: Set up inference datasets                (Layer 4 - data)
//   Step 4: Load the model                           (Layer 5 - ml)
//   Step 5: Rerank each run, write <stem>.run        (Layer 5 + 6)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::datamodule::{DataModule, DataModuleConfig, Stage};
use crate::data::loader::{read_docs, read_queries};
use crate::domain::config::{RunDatasetConfig, SamplingStrategy};
use crate::domain::corpus::Corpus;
use crate::infra::{
    checkpoint::CheckpointManager,
    run_writer::write_run,
    tokenizer_store::TokenizerStore,
};
use crate::ml::inferencer::Reranker;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub checkpoint_dir: PathBuf,
    pub docs:           PathBuf,
    pub queries:        PathBuf,
    pub qrels:          Option<PathBuf>,
    pub run_files:      Vec<PathBuf>,
    pub save_dir:       PathBuf,
    pub depth:          Option<usize>,
    pub batch_size:     usize,
    /// Tag written in the last column of every output line
    pub system:         String,
}

pub struct RerankUseCase {
    config: RerankConfig,
}

/// `<save_dir>/<stem of run_file>.run`
pub fn output_path(save_dir: &Path, run_file: &Path) -> PathBuf {
    let stem = run_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reranked".to_string());
    save_dir.join(format!("{stem}.run"))
}

impl RerankUseCase {
    pub fn new(config: RerankConfig) -> Self {
        Self { config }
    }

    /// Returns the paths of the written runs, in input order.
    pub fn execute(&self) -> Result<Vec<PathBuf>> {
        let cfg = &self.config;
        if cfg.run_files.is_empty() {
            anyhow::bail!("No run files to rerank");
        }

        // ── Step 1: Saved config and tokenizer ───────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let train_cfg = ckpt_manager.load_train_config()?;
        let tokenizer = TokenizerStore::new(&cfg.checkpoint_dir).load()?;

        // ── Step 2: Queries and documents ────────────────────────────────────
        let queries = read_queries(&cfg.queries)
            .with_context(|| format!("Cannot load queries from '{}'", cfg.queries.display()))?;
        let docs = read_docs(&cfg.docs)
            .with_context(|| format!("Cannot load documents from '{}'", cfg.docs.display()))?;
        let corpus = Arc::new(Corpus::new(queries, docs));

        // ── Step 3: Inference datasets ───────────────────────────────────────
        // Top sampling with sample_size = depth keeps every candidate.
        let run_config = RunDatasetConfig::new(
            train_cfg.targets,
            cfg.depth,
            cfg.depth.unwrap_or(usize::MAX).max(1),
            SamplingStrategy::Top,
        )?;
        let dm_config = DataModuleConfig {
            train_dataset:        None,
            inference_datasets:   cfg.run_files.clone(),
            train_run_config:     None,
            inference_run_config: Some(run_config),
            qrels:                cfg.qrels.clone(),
            batch_size:           cfg.batch_size,
            num_workers:          1,
            seed:                 train_cfg.seed,
        };
        let mut datamodule = DataModule::new(dm_config, corpus)?;
        datamodule.setup(Stage::Inference)?;

        // ── Step 4: Model ────────────────────────────────────────────────────
        let reranker = Reranker::from_checkpoint(
            &ckpt_manager,
            tokenizer,
            train_cfg.query_length,
            train_cfg.doc_length,
        )?;

        // ── Step 5: Rerank and write ─────────────────────────────────────────
        std::fs::create_dir_all(&cfg.save_dir)
            .with_context(|| format!("Cannot create '{}'", cfg.save_dir.display()))?;

        let mut written = Vec::with_capacity(cfg.run_files.len());
        for (index, run_file) in datamodule.inference_paths().iter().enumerate() {
            let loader = datamodule.inference_loader(index, reranker.batcher().clone())?;
            let run = reranker
                .rerank(loader.iter())
                .with_context(|| format!("Cannot rerank '{}'", run_file.display()))?;
            let out = output_path(&cfg.save_dir, run_file);
            write_run(&out, &run, &cfg.system)?;
            tracing::info!("Wrote {} records to '{}'", run.len(), out.display());
            written.push(out);
        }
        Ok(written)
    }
}
