// ============================================================
// Layer 6 — Run Writer
// ============================================================
// Turns flat model scores back into a TREC run:
//
//   query_id  Q0  doc_id  rank  score  system
//
// Within a query, rank 1 is the highest score; equal scores keep
// their input order. Queries keep their input order too, so the
// written file lines up with the dataset that produced it.

use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};

use crate::domain::error::{RankingError, RankingResult};
use crate::domain::sample::RunRecord;

/// Rank every query's documents by descending score.
pub fn create_run_from_scores(
    query_ids: &[String],
    doc_ids:   &[Vec<String>],
    scores:    &[f32],
) -> RankingResult<Vec<RunRecord>> {
    if query_ids.len() != doc_ids.len() {
        return Err(RankingError::config(format!(
            "{} query ids but {} document groups",
            query_ids.len(),
            doc_ids.len()
        )));
    }
    let total: usize = doc_ids.iter().map(Vec::len).sum();
    if total != scores.len() {
        return Err(RankingError::config(format!(
            "{total} documents but {} scores",
            scores.len()
        )));
    }

    let mut run = Vec::with_capacity(total);
    let mut offset = 0;
    for (query_id, docs) in query_ids.iter().zip(doc_ids) {
        let group = &scores[offset..offset + docs.len()];
        let mut order: Vec<usize> = (0..docs.len()).collect();
        // stable sort keeps input order among ties
        order.sort_by(|&a, &b| group[b].total_cmp(&group[a]));
        run.extend(order.into_iter().enumerate().map(|(position, i)| RunRecord {
            query_id: query_id.clone(),
            doc_id:   docs[i].clone(),
            rank:     position as u32 + 1,
            score:    group[i],
        }));
        offset += docs.len();
    }
    Ok(run)
}

/// Write `run` in TREC format, creating parent directories.
pub fn write_run(path: &Path, run: &[RunRecord], system: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create run file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for r in run {
        writeln!(out, "{} Q0 {} {} {} {}", r.query_id, r.doc_id, r.rank, r.score, system)?;
    }
    out.flush()?;
    tracing::info!("Wrote {} run lines to '{}'", run.len(), path.display());
    Ok(())
}
