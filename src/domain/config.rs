// ============================================================
// Layer 3 — Run Dataset Configuration
// ============================================================
// Immutable, validated settings attached to a RunDataset:
//
//   targets            which column becomes the training target
//   depth              rank cutoff applied before the qrels join
//   sample_size        documents per sample
//   sampling_strategy  how documents are drawn per query
//
// The enums implement FromStr / Display so clap can parse them
// straight from the command line and so they read naturally
// in the JSON config saved next to a checkpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::{RankingError, RankingResult};

/// Field used as the per-document training target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
    /// Graded relevance judgment (missing → 0)
    Relevance,
    /// Rank in the run file (missing → 0)
    Rank,
    /// Retrieval score in the run file (missing → 0)
    Score,
}

/// How documents are drawn for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// One relevant document plus ranked non-relevant negatives
    SingleRelevant,
    /// The first `sample_size` candidates in rank order
    Top,
}

impl FromStr for TargetField {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "rank"      => Ok(Self::Rank),
            "score"     => Ok(Self::Score),
            other => Err(RankingError::config(format!(
                "unknown targets field '{other}' (expected relevance, rank or score)"
            ))),
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relevance => "relevance",
            Self::Rank      => "rank",
            Self::Score     => "score",
        };
        f.write_str(name)
    }
}

impl FromStr for SamplingStrategy {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_relevant" => Ok(Self::SingleRelevant),
            "top"             => Ok(Self::Top),
            other => Err(RankingError::config(format!(
                "unknown sampling strategy '{other}' (expected single_relevant or top)"
            ))),
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SingleRelevant => "single_relevant",
            Self::Top            => "top",
        };
        f.write_str(name)
    }
}

/// Settings for a RunDataset. Build with [`RunDatasetConfig::new`],
/// which rejects a zero sample size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDatasetConfig {
    targets:           TargetField,
    depth:             Option<usize>,
    sample_size:       usize,
    sampling_strategy: SamplingStrategy,
}

impl RunDatasetConfig {
    /// `depth = None` keeps every ranked row.
    pub fn new(
        targets:           TargetField,
        depth:             Option<usize>,
        sample_size:       usize,
        sampling_strategy: SamplingStrategy,
    ) -> RankingResult<Self> {
        let config = Self { targets, depth, sample_size, sampling_strategy };
        config.validate()?;
        Ok(config)
    }

    /// Re-check invariants, e.g. after deserialising a saved config.
    pub fn validate(&self) -> RankingResult<()> {
        if self.sample_size == 0 {
            return Err(RankingError::config("sample_size must be at least 1"));
        }
        Ok(())
    }

    pub fn targets(&self) -> TargetField { self.targets }

    pub fn depth(&self) -> Option<usize> { self.depth }

    pub fn sample_size(&self) -> usize { self.sample_size }

    pub fn sampling_strategy(&self) -> SamplingStrategy { self.sampling_strategy }
}

/// Convert the command-line depth convention (-1 = unlimited).
pub fn depth_from_cli(depth: i64) -> RankingResult<Option<usize>> {
    match depth {
        -1 => Ok(None),
        d if d >= 0 => Ok(Some(d as usize)),
        d => Err(RankingError::config(format!("depth must be -1 or non-negative, got {d}"))),
    }
}
