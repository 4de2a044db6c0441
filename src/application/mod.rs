// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training a ranker or reranking runs).
//
// Rules for this layer:
//   - No tensor math or model code here
//   - No argument parsing or printing here (that's Layer 1)
//   - File access goes through Layer 4 and 6
//   - Only workflow coordination

// The training workflow
pub mod train_use_case;

// The run reranking workflow
pub mod rerank_use_case;
