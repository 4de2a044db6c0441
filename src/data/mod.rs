// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from ranking files on disk
// all the way to tensor batches.
//
// The pipeline flows in this order:
//
//   queries.tsv / docs.tsv / *.run / qrels / triples
//       │
//       ▼
//   loader            → parses the text formats
//       │
//       ▼
//   RunDataset        → joins run + qrels, samples per query
//   TriplesDataset    → streams (query, pos, neg) triples
//       │
//       ▼
//   DataModule        → picks datasets per stage, builds
//       │               burn DataLoaders over them
//       ▼
//   RankingBatcher    → tokenizes and stacks tensors
//       │               (burn Batcher, runs in loader workers)
//       ▼
//   training loop / reranker
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Parsers for query, document, run, qrels and triples files
pub mod loader;

/// Graded run dataset with per-query sampling
pub mod run_dataset;

/// Streaming training triples
pub mod triples_dataset;

/// Collates Samples into tokenized tensor batches
pub mod batcher;

/// Stage-aware dataset setup and batch loaders
pub mod datamodule;
