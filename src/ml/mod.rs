// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The tensor side of ranking. Batching (Layer 4) and
// checkpointing (Layer 6) also touch Burn types, but every
// piece of model math lives here.
//
// What's in this layer:
//
//   config.rs      — MvrConfig: similarity, aggregation, pooling,
//                    viewer tokens, masked scoring ids
//
//   embedding.rs   — BiEncoderEmbedding: vectors + scoring mask
//
//   mask.rs        — Scoring mask builder (padding, masked ids,
//                    viewer-token truncation)
//
//   scoring.rs     — Multi-vector late-interaction scorer
//                    (Dot / Cosine / L2, Sum / Mean / Max over
//                    query vectors, ragged docs per query)
//
//   aggregation.rs — Sparse min-per-document aggregation of
//                    scattered token scores
//
//   model.rs       — Token encoder, pooling, MvrModel forward
//
//   loss.rs        — RankNet and margin-MSE ranking losses
//
//   trainer.rs     — Adam training loop with validation and
//                    checkpointing per epoch
//
//   inferencer.rs  — Reranker: loads a checkpoint, scores
//                    run candidates, builds the new run
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Khattab & Zaharia (2020) ColBERT

/// Model configuration and its enums
pub mod config;

/// Embeddings paired with their scoring mask
pub mod embedding;

/// Scoring mask construction
pub mod mask;

/// Late-interaction scoring
pub mod scoring;

/// Sparse per-document min aggregation
pub mod aggregation;

/// Encoder and MvrModel
pub mod model;

/// Ranking losses
pub mod loss;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Reranking with a trained checkpoint
pub mod inferencer;
