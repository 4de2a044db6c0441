// ============================================================
// Layer 4 — Graded-Run Dataset
// ============================================================
// Turns a run file plus relevance judgments into one Sample per
// query.
//
// Construction (once):
//   1. Drop run rows ranked deeper than `depth`
//   2. Keep only judgments for queries that appear in the run
//   3. Outer-join run rows and judgments on (query_id, doc_id)
//        → ranked docs without a judgment have relevance None
//        → judged docs outside the run have rank None
//   4. Sort each query's list by rank, unranked docs last
//
// The result is an index query_id → Vec<RunEntry>, so building
// a sample is a HashMap lookup plus some sampling.
//
// Sampling strategies:
//   single_relevant  one random doc with relevance > 0, then up to
//                    sample_size - 1 ranked non-relevant docs
//   top              the first sample_size docs in rank order,
//                    with their relevance grades attached
//
// The dataset only takes &self once built, so several loader
// workers can share it. Sampling draws from one seeded StdRng
// behind a Mutex.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::data::loader::{read_qrels, read_run_file};
use crate::domain::config::{RunDatasetConfig, SamplingStrategy, TargetField};
use crate::domain::corpus::Corpus;
use crate::domain::error::{RankingError, RankingResult};
use crate::domain::sample::{QrelRecord, RunRecord, Sample};

/// One candidate of a query after the run/qrels join.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub doc_id:    String,
    pub rank:      Option<u32>,
    pub score:     Option<f32>,
    pub relevance: Option<i32>,
}

impl RunEntry {
    fn target(&self, field: TargetField) -> f32 {
        match field {
            TargetField::Relevance => self.relevance.map(|r| r as f32).unwrap_or(0.0),
            TargetField::Rank      => self.rank.map(|r| r as f32).unwrap_or(0.0),
            TargetField::Score     => self.score.unwrap_or(0.0),
        }
    }

    fn is_relevant(&self) -> bool {
        self.relevance.map_or(false, |r| r > 0)
    }

    /// Ranked and judged non-relevant (or not judged at all)
    fn is_ranked_non_relevant(&self) -> bool {
        self.rank.is_some() && self.relevance.unwrap_or(0) == 0
    }
}

/// Rank ascending, unranked entries last ordered by doc_id.
fn entry_order(a: &RunEntry, b: &RunEntry) -> Ordering {
    match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None)    => Ordering::Less,
        (None, Some(_))    => Ordering::Greater,
        (None, None)       => a.doc_id.cmp(&b.doc_id),
    }
}

/// Indexable dataset over a graded run.
pub struct RunDataset {
    config:    RunDatasetConfig,
    corpus:    Arc<Corpus>,
    query_ids: Vec<String>,
    groups:    HashMap<String, Vec<RunEntry>>,
    rng:       Mutex<StdRng>,
}

impl RunDataset {
    /// Build the per-query index from in-memory run rows and judgments.
    pub fn new(
        run:    Vec<RunRecord>,
        qrels:  impl IntoIterator<Item = QrelRecord>,
        corpus: Arc<Corpus>,
        config: RunDatasetConfig,
    ) -> RankingResult<Self> {
        config.validate()?;

        // ── Step 1: depth cutoff ──────────────────────────────────────────────
        let run: Vec<RunRecord> = match config.depth() {
            Some(depth) => run.into_iter().filter(|r| r.rank as usize <= depth).collect(),
            None => run,
        };

        // ── Step 2: group ranked rows, remembering first-seen query order ─────
        let mut query_ids: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<RunEntry>> = HashMap::new();
        let mut positions: HashMap<(String, String), usize> = HashMap::new();

        for record in run {
            let group = groups.entry(record.query_id.clone()).or_insert_with(|| {
                query_ids.push(record.query_id.clone());
                Vec::new()
            });
            let key = (record.query_id, record.doc_id.clone());
            if positions.contains_key(&key) {
                tracing::warn!(
                    "Duplicate run row for query '{}' doc '{}', keeping the first",
                    key.0, key.1
                );
                continue;
            }
            positions.insert(key, group.len());
            group.push(RunEntry {
                doc_id:    record.doc_id,
                rank:      Some(record.rank),
                score:     Some(record.score),
                relevance: None,
            });
        }

        // ── Step 3: outer join with judgments of run queries ──────────────────
        let mut seen_judgments: HashSet<(String, String)> = HashSet::new();
        for qrel in qrels {
            let Some(group) = groups.get_mut(&qrel.query_id) else {
                continue;
            };
            let key = (qrel.query_id, qrel.doc_id);
            if !seen_judgments.insert(key.clone()) {
                continue;
            }
            match positions.get(&key) {
                Some(&pos) => group[pos].relevance = Some(qrel.relevance),
                None => group.push(RunEntry {
                    doc_id:    key.1,
                    rank:      None,
                    score:     None,
                    relevance: Some(qrel.relevance),
                }),
            }
        }

        // ── Step 4: rank order inside each query ──────────────────────────────
        for group in groups.values_mut() {
            group.sort_by(entry_order);
        }

        let dataset = Self {
            config,
            corpus,
            query_ids,
            groups,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        };
        dataset.warn_on_data_quality();
        tracing::info!(
            "Run dataset ready: {} queries, {} candidates",
            dataset.query_ids.len(),
            dataset.groups.values().map(Vec::len).sum::<usize>()
        );
        Ok(dataset)
    }

    /// Load a run file and a qrels file, then build the dataset.
    pub fn from_files(
        run_path:   impl AsRef<Path>,
        qrels_path: Option<&Path>,
        corpus:     Arc<Corpus>,
        config:     RunDatasetConfig,
    ) -> RankingResult<Self> {
        let run = read_run_file(run_path)?;
        let qrels = match qrels_path {
            Some(path) => read_qrels(path)?,
            None => Vec::new(),
        };
        Self::new(run, qrels, corpus, config)
    }

    fn warn_on_data_quality(&self) {
        let Some(depth) = self.config.depth() else {
            return;
        };
        let max_rank = self
            .groups
            .values()
            .flatten()
            .filter_map(|e| e.rank)
            .max()
            .unwrap_or(0) as usize;
        if max_rank < depth {
            tracing::warn!(
                "Depth {} is greater than the maximum rank {} in the run file",
                depth, max_rank
            );
        }
        if self.config.sampling_strategy() == SamplingStrategy::Top
            && self.config.sample_size() > depth
        {
            tracing::warn!(
                "Sample size {} is greater than depth {} with top sampling; judged documents \
                 outside the run file can end up in samples",
                self.config.sample_size(), depth
            );
        }
    }

    /// Reseed the sampler used by `item` and the burn `Dataset` impl.
    pub fn with_seed(self, seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)), ..self }
    }

    pub fn config(&self) -> &RunDatasetConfig {
        &self.config
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.query_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.query_ids.is_empty()
    }

    /// Build the sample at `index` with the dataset's own sampler.
    pub fn item(&self, index: usize) -> RankingResult<Sample> {
        // A poisoned lock still holds a usable generator.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.item_with_rng(index, &mut *rng)
    }

    /// Query ids in first-seen run order
    pub fn query_ids(&self) -> &[String] {
        &self.query_ids
    }

    /// Joined candidate list of one query.
    pub fn candidates(&self, query_id: &str) -> RankingResult<&[RunEntry]> {
        self.groups
            .get(query_id)
            .map(Vec::as_slice)
            .ok_or_else(|| RankingError::unknown_query(query_id))
    }

    /// Build the sample at `index` drawing randomness from `rng`.
    pub fn item_with_rng<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> RankingResult<Sample> {
        let query_id = self.query_ids.get(index).ok_or(RankingError::IndexOutOfBounds {
            index,
            len: self.query_ids.len(),
        })?;
        let group = self.candidates(query_id)?;
        let query = self.corpus.query_text(query_id)?.to_string();

        let (entries, relevance): (Vec<&RunEntry>, Option<Vec<f32>>) =
            match self.config.sampling_strategy() {
                SamplingStrategy::SingleRelevant => {
                    (self.sample_single_relevant(query_id, group, rng)?, None)
                }
                SamplingStrategy::Top => {
                    let entries: Vec<&RunEntry> =
                        group.iter().take(self.config.sample_size()).collect();
                    let relevance = entries
                        .iter()
                        .map(|e| e.relevance.unwrap_or(0) as f32)
                        .collect();
                    (entries, Some(relevance))
                }
            };

        let doc_ids: Vec<String> = entries.iter().map(|e| e.doc_id.clone()).collect();
        let docs = doc_ids
            .iter()
            .map(|id| self.corpus.doc_text(id).map(str::to_string))
            .collect::<RankingResult<Vec<_>>>()?;
        let targets = entries.iter().map(|e| e.target(self.config.targets())).collect();

        Ok(Sample {
            query_id: query_id.clone(),
            query,
            doc_ids,
            docs,
            targets,
            relevance,
        })
    }

    fn sample_single_relevant<'a, R: Rng + ?Sized>(
        &self,
        query_id: &str,
        group:    &'a [RunEntry],
        rng:      &mut R,
    ) -> RankingResult<Vec<&'a RunEntry>> {
        let relevant: Vec<&RunEntry> = group.iter().filter(|e| e.is_relevant()).collect();
        let positive = *relevant.choose(rng).ok_or_else(|| RankingError::NoRelevantDocument {
            query_id: query_id.to_string(),
        })?;

        let pool: Vec<&RunEntry> = group.iter().filter(|e| e.is_ranked_non_relevant()).collect();
        let wanted = self.config.sample_size() - 1;
        let take = wanted.min(pool.len());
        if take < wanted {
            tracing::warn!(
                "Query '{}' has only {} ranked non-relevant documents, sampling {} instead of {}",
                query_id, pool.len(), take, wanted
            );
        }

        let mut entries = Vec::with_capacity(take + 1);
        entries.push(positive);
        entries.extend(pool.choose_multiple(rng, take).copied());
        Ok(entries)
    }
}

// ─── burn Dataset ─────────────────────────────────────────────────────────────
// Sample errors (unknown ids, no relevant document) travel inside the
// item so the batcher can surface them instead of panicking a worker.
impl Dataset<RankingResult<Sample>> for RunDataset {
    fn get(&self, index: usize) -> Option<RankingResult<Sample>> {
        (index < self.len()).then(|| self.item(index))
    }

    fn len(&self) -> usize {
        self.query_ids.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::corpus::InMemoryDocStore;
    use std::io::Write;

    /// Log sink for the warnings emitted while building or sampling.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a WARN-level subscriber and return what it logged.
    fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        (out, logs)
    }

    fn corpus() -> Arc<Corpus> {
        let docs: InMemoryDocStore = (1..=8)
            .map(|i| (format!("d{i}"), format!("document {i}")))
            .collect();
        Arc::new(Corpus::new(
            [("q1", "first query"), ("q2", "second query")].into_iter().collect(),
            docs,
        ))
    }

    fn run(query_id: &str, n: u32) -> Vec<RunRecord> {
        (1..=n)
            .map(|rank| RunRecord {
                query_id: query_id.into(),
                doc_id:   format!("d{rank}"),
                rank,
                score:    100.0 - rank as f32,
            })
            .collect()
    }

    fn config(strategy: SamplingStrategy, depth: Option<usize>, sample_size: usize) -> RunDatasetConfig {
        RunDatasetConfig::new(TargetField::Relevance, depth, sample_size, strategy).unwrap()
    }

    /// Grades [1, 0, 0, 2, 0] in rank order for q1.
    fn graded_qrels() -> Vec<QrelRecord> {
        vec![
            QrelRecord::new("q1", "d1", 1),
            QrelRecord::new("q1", "d2", 0),
            QrelRecord::new("q1", "d3", 0),
            QrelRecord::new("q1", "d4", 2),
            QrelRecord::new("q1", "d5", 0),
        ]
    }

    #[test]
    fn test_top_sampling_returns_first_docs_in_rank_order() {
        let dataset = RunDataset::new(
            run("q1", 5),
            graded_qrels(),
            corpus(),
            config(SamplingStrategy::Top, None, 3),
        ).unwrap();

        let sample = dataset.item(0).unwrap();
        assert_eq!(sample.doc_ids, vec!["d1", "d2", "d3"]);
        assert_eq!(sample.targets, vec![1.0, 0.0, 0.0]);
        assert_eq!(sample.relevance, Some(vec![1.0, 0.0, 0.0]));
        assert_eq!(sample.docs[0], "document 1");
        assert_eq!(sample.query, "first query");
    }

    #[test]
    fn test_single_relevant_has_exactly_one_positive() {
        let dataset = RunDataset::new(
            run("q1", 5),
            graded_qrels(),
            corpus(),
            config(SamplingStrategy::SingleRelevant, None, 3),
        ).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let sample = dataset.item_with_rng(0, &mut rng).unwrap();
            assert_eq!(sample.num_docs(), 3);
            assert!(sample.relevance.is_none());
            let positives = sample.targets.iter().filter(|&&t| t > 0.0).count();
            assert_eq!(positives, 1);
            assert!(sample.targets[0] > 0.0);
            let unique: HashSet<&String> = sample.doc_ids.iter().collect();
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn test_single_relevant_without_positive_is_an_error() {
        let dataset = RunDataset::new(
            run("q2", 4),
            Vec::new(),
            corpus(),
            config(SamplingStrategy::SingleRelevant, None, 2),
        ).unwrap();
        let err = dataset.item(0).unwrap_err();
        assert!(matches!(err, RankingError::NoRelevantDocument { ref query_id } if query_id == "q2"));
    }

    #[test]
    fn test_single_relevant_clamps_small_negative_pool() {
        let dataset = RunDataset::new(
            run("q1", 5),
            graded_qrels(),
            corpus(),
            config(SamplingStrategy::SingleRelevant, None, 10),
        ).unwrap();
        let sample = dataset.item_with_rng(0, &mut StdRng::seed_from_u64(1)).unwrap();
        // three ranked non-relevant docs exist (d2, d3, d5)
        assert_eq!(sample.num_docs(), 4);
    }

    #[test]
    fn test_depth_cutoff_turns_deep_judgments_into_unranked_entries() {
        let dataset = RunDataset::new(
            run("q1", 5),
            graded_qrels(),
            corpus(),
            config(SamplingStrategy::Top, Some(2), 5),
        ).unwrap();
        let candidates = dataset.candidates("q1").unwrap();
        let ranked: Vec<&str> = candidates
            .iter()
            .filter(|e| e.rank.is_some())
            .map(|e| e.doc_id.as_str())
            .collect();
        assert_eq!(ranked, vec!["d1", "d2"]);
        // d3, d4, d5 come back from the qrels without a rank, after ranked docs
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[2].doc_id, "d3");
        assert_eq!(candidates[3].relevance, Some(2));
        assert!(candidates[3].rank.is_none());
    }

    #[test]
    fn test_queries_keep_run_order_and_ignore_foreign_qrels() {
        let mut rows = run("q2", 2);
        rows.extend(run("q1", 2));
        let mut qrels = graded_qrels();
        qrels.push(QrelRecord::new("q9", "d1", 1));
        let dataset = RunDataset::new(
            rows,
            qrels,
            corpus(),
            config(SamplingStrategy::Top, None, 2),
        ).unwrap();
        assert_eq!(dataset.query_ids(), &["q2".to_string(), "q1".to_string()]);
        assert!(dataset.candidates("q9").is_err());
    }

    #[test]
    fn test_rank_targets_and_missing_documents() {
        let mut rows = run("q1", 2);
        rows.push(RunRecord { query_id: "q1".into(), doc_id: "missing".into(), rank: 3, score: 1.0 });
        let cfg = RunDatasetConfig::new(TargetField::Rank, None, 2, SamplingStrategy::Top).unwrap();
        let dataset = RunDataset::new(rows, Vec::new(), corpus(), cfg).unwrap();
        let sample = dataset.item(0).unwrap();
        assert_eq!(sample.targets, vec![1.0, 2.0]);

        let cfg = RunDatasetConfig::new(TargetField::Rank, None, 3, SamplingStrategy::Top).unwrap();
        let mut rows = run("q1", 2);
        rows.push(RunRecord { query_id: "q1".into(), doc_id: "missing".into(), rank: 3, score: 1.0 });
        let dataset = RunDataset::new(rows, Vec::new(), corpus(), cfg).unwrap();
        assert!(matches!(dataset.item(0), Err(RankingError::NotFound { kind: "document", .. })));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let dataset = RunDataset::new(
            run("q1", 2),
            Vec::new(),
            corpus(),
            config(SamplingStrategy::Top, None, 2),
        ).unwrap();
        assert_eq!(dataset.len(), 1);
        assert!(matches!(dataset.item(3), Err(RankingError::IndexOutOfBounds { index: 3, len: 1 })));
    }

    #[test]
    fn test_depth_past_the_run_is_logged() {
        let (dataset, logs) = capture_warnings(|| {
            RunDataset::new(
                run("q1", 5),
                graded_qrels(),
                corpus(),
                config(SamplingStrategy::Top, Some(10), 3),
            )
        });
        assert!(dataset.is_ok());
        assert!(logs.contains("greater than the maximum rank"), "logs: {logs}");
    }

    #[test]
    fn test_top_sample_size_past_depth_is_logged() {
        let (dataset, logs) = capture_warnings(|| {
            RunDataset::new(
                run("q1", 5),
                graded_qrels(),
                corpus(),
                config(SamplingStrategy::Top, Some(2), 5),
            )
        });
        assert!(dataset.is_ok());
        assert!(logs.contains("with top sampling"), "logs: {logs}");
        assert!(!logs.contains("maximum rank"));
    }

    #[test]
    fn test_clamped_negative_pool_is_logged() {
        let dataset = RunDataset::new(
            run("q1", 5),
            graded_qrels(),
            corpus(),
            config(SamplingStrategy::SingleRelevant, None, 10),
        ).unwrap();
        let (sample, logs) = capture_warnings(|| dataset.item(0));
        assert_eq!(sample.unwrap().num_docs(), 4);
        assert!(logs.contains("ranked non-relevant documents"), "logs: {logs}");
        assert!(logs.contains("sampling 3 instead of 9"), "logs: {logs}");
    }

    #[test]
    fn test_seeded_datasets_sample_the_same_documents() {
        let build = |seed| {
            RunDataset::new(
                run("q1", 8),
                graded_qrels(),
                corpus(),
                config(SamplingStrategy::SingleRelevant, None, 3),
            )
            .unwrap()
            .with_seed(seed)
        };
        let (a, b) = (build(11), build(11));
        for _ in 0..5 {
            assert_eq!(a.item(0).unwrap().doc_ids, b.item(0).unwrap().doc_ids);
        }
    }

    #[test]
    fn test_burn_dataset_get_stops_at_len() {
        let dataset = RunDataset::new(
            run("q1", 3),
            graded_qrels(),
            corpus(),
            config(SamplingStrategy::Top, None, 2),
        ).unwrap();
        assert_eq!(Dataset::len(&dataset), 1);
        let first = Dataset::get(&dataset, 0).unwrap().unwrap();
        assert_eq!(first.doc_ids, vec!["d1", "d2"]);
        assert!(Dataset::get(&dataset, 1).is_none());
    }
}
