// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the training pipeline in order:
//
//   Step 1: Load queries and documents        (Layer 4 - data)
//   Step 2: Build / load tokenizer            (Layer 6 - infra)
//   Step 3: Set up datasets                   (Layer 4 - data)
//   Step 4: Save config                       (Layer 6 - infra)
//   Step 5: Run training loop                 (Layer 5 - ml)

use std::path::PathBuf;
use std::sync::Arc;

use tokenizers::Tokenizer;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::datamodule::{DataModule, DataModuleConfig, Stage};
use crate::data::loader::{read_docs, read_queries};
use crate::domain::config::{RunDatasetConfig, SamplingStrategy, TargetField};
use crate::domain::corpus::{Corpus, InMemoryDocStore, QueryTable};
use crate::domain::error::{RankingError, RankingResult};
use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::TokenizerStore};
use crate::ml::config::MvrConfig;
use crate::ml::loss::LossFunction;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// Saved next to the checkpoints so `rerank` can rebuild the same
// batcher (query/doc lengths) later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub docs:              PathBuf,
    pub queries:           PathBuf,
    pub qrels:             Option<PathBuf>,
    pub train_dataset:     PathBuf,
    pub val_datasets:      Vec<PathBuf>,
    pub checkpoint_dir:    PathBuf,

    // run-file sampling
    pub targets:           TargetField,
    pub depth:             Option<usize>,
    pub sample_size:       usize,
    pub sampling_strategy: SamplingStrategy,
    pub val_depth:         Option<usize>,
    pub val_sample_size:   usize,

    // optimisation
    pub batch_size:        usize,
    pub epochs:            usize,
    pub lr:                f64,
    pub loss:              LossFunction,
    pub seed:              u64,
    pub num_workers:       usize,

    // model
    pub preset:            String,
    pub query_length:      usize,
    pub doc_length:        usize,
    pub hidden_size:       usize,
    pub embedding_dim:     usize,
    pub dropout:           f64,
    /// Cap on the word-level tokenizer vocabulary, special tokens
    /// included. The model's own vocab_size follows the built tokenizer.
    pub max_vocab:         usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            docs:              PathBuf::from("data/docs.tsv"),
            queries:           PathBuf::from("data/queries.tsv"),
            qrels:             None,
            train_dataset:     PathBuf::from("data/triples.tsv"),
            val_datasets:      Vec::new(),
            checkpoint_dir:    PathBuf::from("checkpoints"),
            targets:           TargetField::Relevance,
            depth:             None,
            sample_size:       8,
            sampling_strategy: SamplingStrategy::SingleRelevant,
            val_depth:         Some(100),
            val_sample_size:   100,
            batch_size:        8,
            epochs:            3,
            lr:                1e-4,
            loss:              LossFunction::RankNet,
            seed:              42,
            num_workers:       1,
            preset:            "mvr-viewer-4".to_string(),
            query_length:      32,
            doc_length:        256,
            hidden_size:       128,
            embedding_dim:     128,
            dropout:           0.1,
            max_vocab:         30522,
        }
    }
}

impl TrainConfig {
    /// Apply this run's sizes to a model preset.
    pub fn customize(&self, config: MvrConfig, tokenizer_vocab: usize) -> MvrConfig {
        config
            .with_vocab_size(tokenizer_vocab)
            .with_hidden_size(self.hidden_size)
            .with_embedding_dim(self.embedding_dim)
            .with_dropout(self.dropout)
            .with_max_position_embeddings(self.query_length.max(self.doc_length))
    }

    pub fn train_run_config(&self) -> RankingResult<RunDatasetConfig> {
        RunDatasetConfig::new(self.targets, self.depth, self.sample_size, self.sampling_strategy)
    }

    /// Validation runs always use top sampling.
    pub fn val_run_config(&self) -> RankingResult<RunDatasetConfig> {
        RunDatasetConfig::new(self.targets, self.val_depth, self.val_sample_size, SamplingStrategy::Top)
    }

    /// Reject settings that would only fail mid-training.
    pub fn validate(&self) -> RankingResult<()> {
        if self.epochs == 0 {
            return Err(RankingError::config("epochs must be at least 1"));
        }
        if self.loss == LossFunction::MarginMse {
            let run_training = self.train_dataset.extension().is_some_and(|e| e == "run");
            if run_training && self.sample_size != 2 {
                return Err(RankingError::config(
                    "margin_mse on a run file needs --sample-size 2",
                ));
            }
            if !self.val_datasets.is_empty() && self.val_sample_size != 2 {
                return Err(RankingError::config(
                    "margin_mse with validation runs needs --val-sample-size 2",
                ));
            }
        }
        Ok(())
    }
}

/// Load the checkpoint's tokenizer, or build one over every query and
/// document text capped at `cfg.max_vocab` entries.
fn build_tokenizer(cfg: &TrainConfig, queries: &QueryTable, docs: &InMemoryDocStore) -> Result<Tokenizer> {
    let texts: Vec<String> = queries
        .iter()
        .map(|(_, text)| text.to_string())
        .chain(docs.iter().map(|(_, text)| text.to_string()))
        .collect();
    TokenizerStore::new(&cfg.checkpoint_dir).load_or_build(&texts, cfg.max_vocab)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load queries and documents ───────────────────────────────
        let queries = read_queries(&cfg.queries)
            .with_context(|| format!("Cannot load queries from '{}'", cfg.queries.display()))?;
        let docs = read_docs(&cfg.docs)
            .with_context(|| format!("Cannot load documents from '{}'", cfg.docs.display()))?;

        // ── Step 2: Build / load tokenizer ────────────────────────────────────
        let tokenizer = build_tokenizer(cfg, &queries, &docs)?;

        // ── Step 3: Set up datasets ──────────────────────────────────────────
        let corpus = Arc::new(Corpus::new(queries, docs));
        let dm_config = DataModuleConfig {
            train_dataset:        Some(cfg.train_dataset.clone()),
            inference_datasets:   cfg.val_datasets.clone(),
            train_run_config:     Some(cfg.train_run_config()?),
            inference_run_config: Some(cfg.val_run_config()?),
            qrels:                cfg.qrels.clone(),
            batch_size:           cfg.batch_size,
            num_workers:          cfg.num_workers,
            seed:                 cfg.seed,
        };
        let mut datamodule = DataModule::new(dm_config, corpus)?;
        datamodule.setup(Stage::Fit)?;

        // ── Step 4: Save config for reranking ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_train_config(cfg)?;

        // ── Step 5: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, &datamodule, tokenizer, &ckpt_manager)?;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customize_sizes_the_preset() {
        let cfg = TrainConfig { query_length: 16, doc_length: 64, hidden_size: 32, ..TrainConfig::default() };
        let config = cfg.customize(MvrConfig::new().with_num_viewer_tokens(Some(4)), 500);
        assert_eq!(config.vocab_size, 500);
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.max_position_embeddings, 64);
        assert_eq!(config.num_viewer_tokens, Some(4));
    }

    #[test]
    fn test_margin_mse_needs_pairs() {
        let cfg = TrainConfig {
            loss: LossFunction::MarginMse,
            train_dataset: PathBuf::from("train.run"),
            sample_size: 8,
            ..TrainConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RankingError::Config(_))));

        let triples = TrainConfig { loss: LossFunction::MarginMse, ..TrainConfig::default() };
        assert!(triples.validate().is_ok());
    }

    #[test]
    fn test_validation_runs_use_top_sampling() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.val_run_config().unwrap().sampling_strategy(), SamplingStrategy::Top);
        assert_eq!(cfg.val_run_config().unwrap().depth(), Some(100));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = TrainConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.preset, cfg.preset);
        assert_eq!(back.loss, cfg.loss);
        assert_eq!(back.val_depth, cfg.val_depth);
    }

    #[test]
    fn test_max_vocab_caps_the_built_tokenizer() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = TrainConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            max_vocab: 9,
            ..TrainConfig::default()
        };
        let queries: QueryTable = [("q1", "alpha beta")].into_iter().collect();
        let docs: InMemoryDocStore =
            [("d1", "gamma delta epsilon"), ("d2", "zeta eta")].into_iter().collect();

        // six special tokens plus three of the seven words
        let tokenizer = build_tokenizer(&cfg, &queries, &docs).unwrap();
        assert_eq!(tokenizer.get_vocab_size(true), 9);
        assert!(dir.path().join("tokenizer.json").exists());

        let roomy = TrainConfig { max_vocab: 100, ..cfg.clone() };
        let reloaded = build_tokenizer(&roomy, &queries, &docs).unwrap();
        assert_eq!(reloaded.get_vocab_size(true), 9);
    }
}
