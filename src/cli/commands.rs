// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `rerank`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, and the ranking
//     enums through their FromStr impls)
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::rerank_use_case::RerankConfig;
use crate::application::train_use_case::TrainConfig;
use crate::domain::config::{depth_from_cli, SamplingStrategy, TargetField};
use crate::domain::error::RankingError;
use crate::ml::loss::LossFunction;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a multi-vector ranker on a run file or training triples
    Train(TrainArgs),

    /// Rerank first-stage run files with a trained checkpoint
    Rerank(RerankArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// TSV file of `doc_id<TAB>text`
    #[arg(long)]
    pub docs: PathBuf,

    /// TSV file of `query_id<TAB>text`
    #[arg(long)]
    pub queries: PathBuf,

    /// TREC qrels joined into every run dataset
    #[arg(long)]
    pub qrels: Option<PathBuf>,

    /// Training data: a `.run` file or a triples file
    #[arg(long)]
    pub train_dataset: PathBuf,

    /// Run files scored for validation after every epoch
    #[arg(long = "val-dataset")]
    pub val_datasets: Vec<PathBuf>,

    /// Directory to save model checkpoints and tokenizer
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Which run/qrels column becomes the training target
    /// (relevance, rank, score)
    #[arg(long, default_value = "relevance")]
    pub targets: TargetField,

    /// Ranked rows kept per query; -1 keeps all of them
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub depth: i64,

    /// Documents per query in one training sample
    #[arg(long, default_value_t = 8)]
    pub sample_size: usize,

    /// single_relevant or top
    #[arg(long, default_value = "single_relevant")]
    pub sampling_strategy: SamplingStrategy,

    /// Depth of the validation runs; -1 keeps all rows
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub val_depth: i64,

    /// Documents per query in one validation sample
    #[arg(long, default_value_t = 100)]
    pub val_sample_size: usize,

    /// Queries processed together in one forward pass
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// ranknet or margin_mse
    #[arg(long, default_value = "ranknet")]
    pub loss: LossFunction,

    /// Seeds document sampling and the training shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Threads collating training batches
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Model preset name (mvr-viewer-4, colbert-small, bi-encoder-mean)
    #[arg(long, default_value = "mvr-viewer-4")]
    pub preset: String,

    /// Query tokens after truncation / padding
    #[arg(long, default_value_t = 32)]
    pub query_length: usize,

    /// Document tokens after truncation / padding
    #[arg(long, default_value_t = 256)]
    pub doc_length: usize,

    /// Hidden dimension of the token encoder
    #[arg(long, default_value_t = 128)]
    pub hidden_size: usize,

    /// Size of every output embedding vector
    #[arg(long, default_value_t = 128)]
    pub embedding_dim: usize,

    /// Dropout probability applied after embedding normalisation
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Tokenizer vocabulary cap, special tokens included
    #[arg(long, default_value_t = 30522)]
    pub max_vocab: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = RankingError;

    fn try_from(a: TrainArgs) -> Result<Self, Self::Error> {
        Ok(TrainConfig {
            docs:              a.docs,
            queries:           a.queries,
            qrels:             a.qrels,
            train_dataset:     a.train_dataset,
            val_datasets:      a.val_datasets,
            checkpoint_dir:    a.checkpoint_dir,
            targets:           a.targets,
            depth:             depth_from_cli(a.depth)?,
            sample_size:       a.sample_size,
            sampling_strategy: a.sampling_strategy,
            val_depth:         depth_from_cli(a.val_depth)?,
            val_sample_size:   a.val_sample_size,
            batch_size:        a.batch_size,
            epochs:            a.epochs,
            lr:                a.lr,
            loss:              a.loss,
            seed:              a.seed,
            num_workers:       a.num_workers,
            preset:            a.preset,
            query_length:      a.query_length,
            doc_length:        a.doc_length,
            hidden_size:       a.hidden_size,
            embedding_dim:     a.embedding_dim,
            dropout:           a.dropout,
            max_vocab:         a.max_vocab,
        })
    }
}

/// All arguments for the `rerank` command
#[derive(Args, Debug)]
pub struct RerankArgs {
    /// First-stage run files to rerank
    #[arg(long = "dataset", required = true)]
    pub run_files: Vec<PathBuf>,

    #[arg(long)]
    pub docs: PathBuf,

    #[arg(long)]
    pub queries: PathBuf,

    /// Optional qrels; judged but unranked documents are scored too
    #[arg(long)]
    pub qrels: Option<PathBuf>,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Output directory; each input run becomes `<stem>.run`
    #[arg(long, default_value = "reranked")]
    pub save_dir: PathBuf,

    /// Candidates reranked per query; -1 reranks all of them
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub depth: i64,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// System tag written to the output runs
    #[arg(long, default_value = "mvr-rank")]
    pub system: String,
}

impl TryFrom<RerankArgs> for RerankConfig {
    type Error = RankingError;

    fn try_from(a: RerankArgs) -> Result<Self, Self::Error> {
        Ok(RerankConfig {
            checkpoint_dir: a.checkpoint_dir,
            docs:           a.docs,
            queries:        a.queries,
            qrels:          a.qrels,
            run_files:      a.run_files,
            save_dir:       a.save_dir,
            depth:          depth_from_cli(a.depth)?,
            batch_size:     a.batch_size,
            system:         a.system,
        })
    }
}
