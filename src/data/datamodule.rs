// ============================================================
// Layer 4 — Data Module
// ============================================================
// Owns the datasets of one run and hands out batch loaders:
//
//   setup(Fit)        train dataset  (+ inference datasets)
//   setup(Inference)  inference datasets only
//
// The training dataset type follows the file extension:
//
//   *.run   → RunDataset      (needs a train RunDatasetConfig)
//   other   → TriplesDataset  (supervision triples)
//
// Inference datasets are always run files and must use the top
// strategy: single_relevant sampling would score a random subset
// of each query's candidates.
//
// Run datasets go through burn's DataLoader: shuffled with a
// seed and collated by `num_workers` threads during fit, read in
// order on the calling thread for inference. Triples have no
// random access, so they are chunked from the stream instead.
// The caller supplies the RankingBatcher, so one DataModule can
// feed any backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::prelude::*;

use crate::data::batcher::{RankingBatch, RankingBatcher};
use crate::data::run_dataset::RunDataset;
use crate::data::triples_dataset::TriplesDataset;
use crate::domain::config::{RunDatasetConfig, SamplingStrategy};
use crate::domain::corpus::Corpus;
use crate::domain::error::{RankingError, RankingResult};
use crate::domain::sample::Sample;
use crate::domain::traits::SampleStream;

/// One collated batch, or the first error met while building it.
pub type BatchResult<B> = RankingResult<RankingBatch<B>>;

pub type BatchIter<'a, B> = Box<dyn Iterator<Item = BatchResult<B>> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fit,
    Inference,
}

/// Dataset paths, sampling and loader settings.
#[derive(Debug, Clone)]
pub struct DataModuleConfig {
    pub train_dataset:        Option<PathBuf>,
    pub inference_datasets:   Vec<PathBuf>,
    pub train_run_config:     Option<RunDatasetConfig>,
    pub inference_run_config: Option<RunDatasetConfig>,
    /// Judgments joined into every run dataset
    pub qrels:                Option<PathBuf>,
    pub batch_size:           usize,
    /// Collation threads of the training loader
    pub num_workers:          usize,
    /// Seeds document sampling and the training shuffle
    pub seed:                 u64,
}

/// The training dataset, indexable or streamed.
pub enum TrainDataset {
    Run(Arc<RunDataset>),
    Triples(Arc<TriplesDataset>),
}

// ─── BatchLoader ──────────────────────────────────────────────────────────────
/// Re-iterable source of collated batches. Every `iter()` call is
/// one pass over the dataset; the shuffled loader draws a new order
/// on each pass.
pub enum BatchLoader<B: Backend> {
    Indexed(Arc<dyn DataLoader<BatchResult<B>>>),
    Streamed {
        dataset:    Arc<TriplesDataset>,
        batcher:    RankingBatcher<B>,
        batch_size: usize,
    },
}

impl<B: Backend> BatchLoader<B> {
    pub fn iter(&self) -> BatchIter<'_, B> {
        match self {
            Self::Indexed(loader) => Box::new(loader.iter()),
            Self::Streamed { dataset, batcher, batch_size } => Box::new(
                SampleBatches::new(dataset.stream(), *batch_size)
                    .map(move |samples| batcher.collate(&samples?)),
            ),
        }
    }
}

pub struct DataModule {
    config:             DataModuleConfig,
    corpus:             Arc<Corpus>,
    train_dataset:      Option<TrainDataset>,
    inference_datasets: Vec<Arc<RunDataset>>,
}

fn is_run_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "run")
}

impl DataModule {
    pub fn new(config: DataModuleConfig, corpus: Arc<Corpus>) -> RankingResult<Self> {
        if config.batch_size == 0 {
            return Err(RankingError::config("batch_size must be at least 1"));
        }
        Ok(Self { config, corpus, train_dataset: None, inference_datasets: Vec::new() })
    }

    /// Build the datasets needed for `stage`.
    pub fn setup(&mut self, stage: Stage) -> RankingResult<()> {
        if stage == Stage::Fit {
            self.train_dataset = Some(self.build_train_dataset()?);
        }
        self.inference_datasets = self.build_inference_datasets()?;
        tracing::info!(
            "Data module ready for {:?}: train={}, inference datasets={}",
            stage,
            self.train_dataset.is_some(),
            self.inference_datasets.len()
        );
        Ok(())
    }

    fn build_train_dataset(&self) -> RankingResult<TrainDataset> {
        let path = self
            .config
            .train_dataset
            .as_ref()
            .ok_or_else(|| RankingError::config("A training dataset must be provided"))?;

        if is_run_file(path) {
            let run_config = self.config.train_run_config.clone().ok_or_else(|| {
                RankingError::config(
                    "A train run dataset config must be provided when training on a run file",
                )
            })?;
            let dataset = RunDataset::from_files(
                path,
                self.config.qrels.as_deref(),
                Arc::clone(&self.corpus),
                run_config,
            )?
            .with_seed(self.config.seed);
            Ok(TrainDataset::Run(Arc::new(dataset)))
        } else {
            tracing::info!("Streaming training triples from '{}'", path.display());
            let dataset = TriplesDataset::from_path(path, Arc::clone(&self.corpus));
            Ok(TrainDataset::Triples(Arc::new(dataset)))
        }
    }

    fn build_inference_datasets(&self) -> RankingResult<Vec<Arc<RunDataset>>> {
        if self.config.inference_datasets.is_empty() {
            return Ok(Vec::new());
        }
        let run_config = self.config.inference_run_config.clone().ok_or_else(|| {
            RankingError::config(
                "An inference run dataset config must be provided with inference datasets",
            )
        })?;
        if run_config.sampling_strategy() == SamplingStrategy::SingleRelevant {
            return Err(RankingError::config(
                "Inference run datasets cannot use the single_relevant sampling strategy",
            ));
        }
        self.config
            .inference_datasets
            .iter()
            .map(|path| {
                RunDataset::from_files(
                    path,
                    self.config.qrels.as_deref(),
                    Arc::clone(&self.corpus),
                    run_config.clone(),
                )
                .map(Arc::new)
            })
            .collect()
    }

    pub fn train_dataset(&self) -> Option<&TrainDataset> {
        self.train_dataset.as_ref()
    }

    pub fn inference_datasets(&self) -> &[Arc<RunDataset>] {
        &self.inference_datasets
    }

    pub fn inference_paths(&self) -> &[PathBuf] {
        &self.config.inference_datasets
    }

    /// Loader over the training data. Run datasets are shuffled with
    /// the configured seed; triples keep file order.
    pub fn train_loader<B: Backend>(&self, batcher: RankingBatcher<B>) -> RankingResult<BatchLoader<B>> {
        let dataset = self
            .train_dataset
            .as_ref()
            .ok_or_else(|| RankingError::config("No training dataset found; call setup(Fit) first"))?;

        let loader = match dataset {
            TrainDataset::Run(run) => BatchLoader::Indexed(
                DataLoaderBuilder::new(batcher)
                    .batch_size(self.config.batch_size)
                    .shuffle(self.config.seed)
                    .num_workers(self.config.num_workers)
                    .build(Arc::clone(run)),
            ),
            TrainDataset::Triples(triples) => BatchLoader::Streamed {
                dataset:    Arc::clone(triples),
                batcher,
                batch_size: self.config.batch_size,
            },
        };
        Ok(loader)
    }

    /// Loader over one inference dataset, in query order.
    pub fn inference_loader<B: Backend>(
        &self,
        index:   usize,
        batcher: RankingBatcher<B>,
    ) -> RankingResult<BatchLoader<B>> {
        let dataset = self.inference_datasets.get(index).ok_or(RankingError::IndexOutOfBounds {
            index,
            len: self.inference_datasets.len(),
        })?;
        // No worker threads: batches come back in run order.
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.config.batch_size)
            .build(Arc::clone(dataset));
        Ok(BatchLoader::Indexed(loader))
    }
}

// ─── SampleBatches ────────────────────────────────────────────────────────────
/// Groups a sample iterator into batches of `batch_size`; the last
/// batch may be shorter. The first error ends the batch it occurs in.
pub struct SampleBatches<I> {
    inner:      I,
    batch_size: usize,
}

impl<I> SampleBatches<I> {
    pub fn new(inner: I, batch_size: usize) -> Self {
        Self { inner, batch_size: batch_size.max(1) }
    }
}

impl<I: Iterator<Item = RankingResult<Sample>>> Iterator for SampleBatches<I> {
    type Item = RankingResult<Vec<Sample>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.inner.next() {
                Some(Ok(sample)) => batch.push(sample),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::TargetField;
    use crate::domain::corpus::InMemoryDocStore;
    use crate::infra::tokenizer_store::build_word_level;
    use burn::backend::NdArray;
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    struct Fixture {
        dir:    TempDir,
        corpus: Arc<Corpus>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(
                dir.path().join("train.run"),
                "q1 Q0 d1 1 9.0 bm25\nq1 Q0 d2 2 8.0 bm25\nq1 Q0 d3 3 7.0 bm25\n\
                 q2 Q0 d2 1 5.0 bm25\nq2 Q0 d3 2 4.0 bm25\n\
                 q3 Q0 d1 1 3.0 bm25\nq3 Q0 d3 2 2.0 bm25\n",
            )
            .unwrap();
            fs::write(dir.path().join("qrels.txt"), "q1 0 d1 1\nq2 0 d3 2\nq3 0 d1 1\n").unwrap();
            fs::write(dir.path().join("triples.tsv"), "q1 d1 d2\nq2 d3 d2\nq3 d1 d3\n").unwrap();

            let corpus = Corpus::new(
                [("q1", "first"), ("q2", "second"), ("q3", "third")].into_iter().collect(),
                [("d1", "one"), ("d2", "two"), ("d3", "three")]
                    .into_iter()
                    .collect::<InMemoryDocStore>(),
            );
            Self { dir, corpus: Arc::new(corpus) }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn config(&self, train: &str) -> DataModuleConfig {
            DataModuleConfig {
                train_dataset:        Some(self.path(train)),
                inference_datasets:   Vec::new(),
                train_run_config:     Some(run_config(SamplingStrategy::SingleRelevant)),
                inference_run_config: None,
                qrels:                Some(self.path("qrels.txt")),
                batch_size:           2,
                num_workers:          2,
                seed:                 7,
            }
        }
    }

    fn run_config(strategy: SamplingStrategy) -> RunDatasetConfig {
        RunDatasetConfig::new(TargetField::Relevance, None, 2, strategy).unwrap()
    }

    fn batcher() -> RankingBatcher<TestBackend> {
        let texts: Vec<String> = ["first second third", "one two three"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let tokenizer = build_word_level(&texts, 100).unwrap();
        RankingBatcher::new(tokenizer, 8, 8, Default::default()).unwrap()
    }

    fn collect(loader: &BatchLoader<TestBackend>) -> Vec<RankingBatch<TestBackend>> {
        loader.iter().collect::<RankingResult<Vec<_>>>().unwrap()
    }

    fn query_order(batches: &[RankingBatch<TestBackend>]) -> Vec<String> {
        batches.iter().flat_map(|b| b.query_ids.clone()).collect()
    }

    #[test]
    fn test_run_file_trains_on_shuffled_queries() {
        let fx = Fixture::new();
        let mut dm = DataModule::new(fx.config("train.run"), Arc::clone(&fx.corpus)).unwrap();
        dm.setup(Stage::Fit).unwrap();
        assert!(matches!(dm.train_dataset(), Some(TrainDataset::Run(_))));

        let loader = dm.train_loader(batcher()).unwrap();
        for _epoch in 0..2 {
            let batches = collect(&loader);
            let mut sizes: Vec<usize> = batches.iter().map(|b| b.query_ids.len()).collect();
            sizes.sort();
            assert_eq!(sizes, vec![1, 2]);

            let mut seen = query_order(&batches);
            seen.sort();
            assert_eq!(seen, vec!["q1", "q2", "q3"]);
            for batch in &batches {
                let targets = batch.targets.clone().into_data().to_vec::<f32>().unwrap();
                let positives = targets.iter().filter(|&&t| t > 0.0).count();
                assert_eq!(positives, batch.query_ids.len());
            }
        }
    }

    #[test]
    fn test_other_extensions_stream_triples() {
        let fx = Fixture::new();
        let mut dm = DataModule::new(fx.config("triples.tsv"), Arc::clone(&fx.corpus)).unwrap();
        dm.setup(Stage::Fit).unwrap();
        assert!(matches!(dm.train_dataset(), Some(TrainDataset::Triples(_))));

        let loader = dm.train_loader(batcher()).unwrap();
        let batches = collect(&loader);
        assert_eq!(batches.len(), 2);
        assert_eq!(query_order(&batches), vec!["q1", "q2", "q3"]);
        assert_eq!(batches[0].num_docs(), vec![2, 2]);
        // a second pass re-reads the file
        assert_eq!(query_order(&collect(&loader)), vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn test_train_loader_needs_setup() {
        let fx = Fixture::new();
        let dm = DataModule::new(fx.config("train.run"), Arc::clone(&fx.corpus)).unwrap();
        assert!(matches!(dm.train_loader(batcher()), Err(RankingError::Config(_))));
    }

    #[test]
    fn test_fit_without_train_dataset_is_a_config_error() {
        let fx = Fixture::new();
        let mut config = fx.config("train.run");
        config.train_dataset = None;
        let mut dm = DataModule::new(config, Arc::clone(&fx.corpus)).unwrap();
        assert!(matches!(dm.setup(Stage::Fit), Err(RankingError::Config(_))));
    }

    #[test]
    fn test_run_file_without_run_config_is_a_config_error() {
        let fx = Fixture::new();
        let mut config = fx.config("train.run");
        config.train_run_config = None;
        let mut dm = DataModule::new(config, Arc::clone(&fx.corpus)).unwrap();
        assert!(matches!(dm.setup(Stage::Fit), Err(RankingError::Config(_))));
    }

    #[test]
    fn test_inference_rejects_single_relevant() {
        let fx = Fixture::new();
        let mut config = fx.config("train.run");
        config.inference_datasets = vec![fx.path("train.run")];
        config.inference_run_config = Some(run_config(SamplingStrategy::SingleRelevant));
        let mut dm = DataModule::new(config, Arc::clone(&fx.corpus)).unwrap();
        assert!(matches!(dm.setup(Stage::Inference), Err(RankingError::Config(_))));
    }

    #[test]
    fn test_inference_datasets_need_a_run_config() {
        let fx = Fixture::new();
        let mut config = fx.config("train.run");
        config.inference_datasets = vec![fx.path("train.run")];
        let mut dm = DataModule::new(config, Arc::clone(&fx.corpus)).unwrap();
        assert!(matches!(dm.setup(Stage::Inference), Err(RankingError::Config(_))));
    }

    #[test]
    fn test_inference_loader_follows_run_order() {
        let fx = Fixture::new();
        let mut config = fx.config("train.run");
        config.train_dataset = None;
        config.inference_datasets = vec![fx.path("train.run")];
        config.inference_run_config = Some(run_config(SamplingStrategy::Top));
        let mut dm = DataModule::new(config, Arc::clone(&fx.corpus)).unwrap();
        dm.setup(Stage::Inference).unwrap();

        let batches = collect(&dm.inference_loader(0, batcher()).unwrap());
        assert_eq!(query_order(&batches), vec!["q1", "q2", "q3"]);
        assert_eq!(batches[0].doc_ids, vec![vec!["d1", "d2"], vec!["d2", "d3"]]);
        assert!(batches.iter().all(|b| b.relevance.is_some()));
        assert!(dm.inference_loader(1, batcher()).is_err());
    }

    #[test]
    fn test_sample_errors_surface_in_batches() {
        let fx = Fixture::new();
        fs::write(fx.path("bad.tsv"), "q1 d1 d2\nq1 d1 d404\n").unwrap();
        let mut dm = DataModule::new(fx.config("bad.tsv"), Arc::clone(&fx.corpus)).unwrap();
        dm.setup(Stage::Fit).unwrap();
        let loader = dm.train_loader(batcher()).unwrap();
        let result: RankingResult<Vec<_>> = loader.iter().collect();
        assert!(matches!(result, Err(RankingError::NotFound { kind: "document", .. })));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let fx = Fixture::new();
        let mut config = fx.config("train.run");
        config.batch_size = 0;
        assert!(DataModule::new(config, Arc::clone(&fx.corpus)).is_err());
    }
}
