// ============================================================
// Layer 6 — Model Registry
// ============================================================
// Named model presets plus optional post-load callbacks that patch
// freshly built weights (e.g. seeding marker token embeddings).
//
// The registry is assembled once at startup, then only read:
//
//   let registry = ModelRegistry::with_defaults();
//   let model    = registry.build("mvr-viewer-4", &device)?;
//
// No global state; the caller owns and passes the registry.

use std::collections::BTreeMap;

use burn::{module::Param, prelude::*};

use crate::domain::error::{RankingError, RankingResult};
use crate::infra::tokenizer_store::{CLS_ID, DOC_MARKER_ID, QUERY_MARKER_ID};
use crate::ml::config::{MvrConfig, PoolingStrategy, QueryAggregation, SimilarityFunction};
use crate::ml::model::MvrModel;

pub type PostLoadCallback<B> =
    Box<dyn Fn(MvrModel<B>) -> RankingResult<MvrModel<B>> + Send + Sync>;

pub struct ModelRegistry<B: Backend> {
    presets:   BTreeMap<String, MvrConfig>,
    callbacks: BTreeMap<String, PostLoadCallback<B>>,
}

impl<B: Backend> Default for ModelRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ModelRegistry<B> {
    /// Empty registry.
    pub fn new() -> Self {
        Self { presets: BTreeMap::new(), callbacks: BTreeMap::new() }
    }

    /// Registry with the built-in presets.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_preset(
            "mvr-viewer-4",
            MvrConfig::new()
                .with_num_viewer_tokens(Some(4))
                .with_doc_pooling(Some(PoolingStrategy::First))
                .with_normalize(true),
        );
        registry.register_preset(
            "colbert-small",
            MvrConfig::new().with_normalize(true),
        );
        registry.register_callback("colbert-small", Box::new(seed_marker_embeddings));
        registry.register_preset(
            "bi-encoder-mean",
            MvrConfig::new()
                .with_query_pooling(Some(PoolingStrategy::Mean))
                .with_doc_pooling(Some(PoolingStrategy::Mean))
                .with_similarity(SimilarityFunction::Cosine)
                .with_query_aggregation(QueryAggregation::Sum),
        );
        registry
    }

    pub fn register_preset(&mut self, name: impl Into<String>, config: MvrConfig) {
        self.presets.insert(name.into(), config);
    }

    pub fn register_callback(&mut self, name: impl Into<String>, callback: PostLoadCallback<B>) {
        self.callbacks.insert(name.into(), callback);
    }

    /// Registered preset names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    pub fn preset(&self, name: &str) -> RankingResult<&MvrConfig> {
        self.presets.get(name).ok_or_else(|| RankingError::NotFound {
            kind: "model preset",
            id:   name.to_string(),
        })
    }

    /// Run the callback registered for `name`, if any.
    pub fn post_load(&self, name: &str, model: MvrModel<B>) -> RankingResult<MvrModel<B>> {
        match self.callbacks.get(name) {
            Some(callback) => {
                tracing::debug!("Applying post-load callback for '{}'", name);
                callback(model)
            }
            None => Ok(model),
        }
    }

    /// Build a model from a preset, adjusted by `customize`, then post-load.
    pub fn build_with(
        &self,
        name:      &str,
        customize: impl FnOnce(MvrConfig) -> MvrConfig,
        device:    &B::Device,
    ) -> RankingResult<MvrModel<B>> {
        let config = customize(self.preset(name)?.clone());
        let model = MvrModel::init(config, device)?;
        self.post_load(name, model)
    }

    pub fn build(&self, name: &str, device: &B::Device) -> RankingResult<MvrModel<B>> {
        self.build_with(name, |config| config, device)
    }
}

/// Start the [Q] and [D] marker rows from the [CLS] embedding.
fn seed_marker_embeddings<B: Backend>(mut model: MvrModel<B>) -> RankingResult<MvrModel<B>> {
    let weight = model.encoder.token_embedding.weight.val();
    let [vocab, hidden] = weight.dims();
    if vocab <= DOC_MARKER_ID as usize {
        return Err(RankingError::config(format!(
            "vocabulary of {vocab} has no room for marker tokens"
        )));
    }
    let cls = CLS_ID as usize;
    let source = weight.clone().slice([cls..cls + 1, 0..hidden]);
    let mut seeded = weight;
    for marker in [QUERY_MARKER_ID as usize, DOC_MARKER_ID as usize] {
        seeded = seeded.slice_assign([marker..marker + 1, 0..hidden], source.clone());
    }
    // `seeded` is a graph node on autodiff backends; the parameter must be a leaf.
    let id = model.encoder.token_embedding.weight.id.clone();
    model.encoder.token_embedding.weight = Param::initialized(id, seeded.detach().require_grad());
    Ok(model)
}
