// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`  — trains a multi-vector ranker and checkpoints it
//   2. `rerank` — loads a checkpoint and rewrites run files
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, RerankArgs, TrainArgs};

use crate::application::rerank_use_case::{RerankConfig, RerankUseCase};
use crate::application::train_use_case::{TrainConfig, TrainUseCase};

/// The main CLI struct; clap generates the parser from its fields.
#[derive(Parser, Debug)]
#[command(
    name = "mvr-rank",
    version = "0.1.0",
    about = "Train multi-vector neural rankers, then rerank first-stage runs."
)]
pub struct Cli {
    /// The subcommand to run (train or rerank)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => run_train(args),
            Commands::Rerank(args) => run_rerank(args),
        }
    }
}

/// Handles the `train` subcommand.
fn run_train(args: TrainArgs) -> Result<()> {
    tracing::info!("Starting training on: {}", args.train_dataset.display());

    let config = TrainConfig::try_from(args)?;
    let checkpoint_dir = config.checkpoint_dir.clone();
    TrainUseCase::new(config).execute()?;

    println!("Training complete. Checkpoints saved to {}", checkpoint_dir.display());
    Ok(())
}

/// Handles the `rerank` subcommand.
fn run_rerank(args: RerankArgs) -> Result<()> {
    let config = RerankConfig::try_from(args)?;
    let written = RerankUseCase::new(config).execute()?;

    for path in written {
        println!("Reranked run written to {}", path.display());
    }
    Ok(())
}
