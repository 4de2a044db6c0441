// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types and traits that describe ranking supervision:
// what a run record, a judgment, a training triple and a Sample
// ARE, independent of how they are loaded or turned into tensors.
//
// Rules for this layer:
//   - NO Burn tensor types
//   - NO file I/O
//   - Only plain structs, enums, traits and the error type
//
// Everything here is unit-testable without a device.

/// Errors shared by the library layers
pub mod error;

/// Run records, judgments, doc pairs and Samples
pub mod sample;

/// RunDatasetConfig and its enums
pub mod config;

/// Query table and document store
pub mod corpus;

/// DocumentStore and SampleStream
pub mod traits;
