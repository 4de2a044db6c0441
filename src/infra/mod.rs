// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles all cross-cutting concerns that don't belong in
// any specific business layer:
//
//   checkpoint.rs      — Saving and loading encoder weights with
//                        Burn's CompactRecorder, plus the model
//                        and training configs so reranking can
//                        rebuild the model.
//
//   tokenizer_store.rs — Tokenizer persistence. Builds a word-level
//                        tokenizer (with [Q]/[D] markers) over the
//                        corpus if none exists, or loads the saved one.
//
//   metrics.rs         — Epoch-level losses written to a CSV file.
//
//   registry.rs        — Named model presets and post-load callbacks.
//
//   run_writer.rs      — Scores → ranked run records → TREC run file.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;

/// Model presets and post-load callbacks
pub mod registry;

/// Run construction and TREC output
pub mod run_writer;
