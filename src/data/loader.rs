// ============================================================
// Layer 4 — Supervision File Loaders
// ============================================================
// Reads the plain-text formats of an IR collection:
//
//   queries.tsv   query_id <TAB> text
//   docs.tsv      doc_id   <TAB> text
//   *.run         query_id iteration doc_id rank score system
//   qrels         query_id iteration doc_id relevance
//   triples       pos_score neg_score query_id doc_id_a doc_id_b
//                 (or just: query_id doc_id_a doc_id_b)
//
// Run, qrels and triples files are whitespace-delimited with no
// header. Of the run columns only 0, 2, 3 and 4 are used.
//
// Queries, documents, runs and qrels are small enough to load
// eagerly. Triples files can be tens of millions of lines, so
// DocPairReader streams them lazily one line at a time.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::domain::corpus::{InMemoryDocStore, QueryTable};
use crate::domain::error::{RankingError, RankingResult};
use crate::domain::sample::{DocPair, QrelRecord, RunRecord};

fn open(path: &Path) -> RankingResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| RankingError::io(path, e))
}

/// Iterate over (line_number, non-empty trimmed line).
fn read_lines(path: &Path) -> RankingResult<Vec<(usize, String)>> {
    let reader = open(path)?;
    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RankingError::io(path, e))?;
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            lines.push((idx + 1, trimmed.to_string()));
        }
    }
    Ok(lines)
}

/// Split `id<TAB>text` lines into a map.
fn read_tsv_map(path: &Path) -> RankingResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for (line_no, line) in read_lines(path)? {
        let (id, text) = line
            .split_once('\t')
            .ok_or_else(|| RankingError::parse(path, line_no, "expected id<TAB>text"))?;
        map.insert(id.to_string(), text.to_string());
    }
    Ok(map)
}

fn parse_field<T: std::str::FromStr>(
    path:    &Path,
    line_no: usize,
    name:    &str,
    value:   &str,
) -> RankingResult<T> {
    value.parse::<T>().map_err(|_| {
        RankingError::parse(path, line_no, format!("invalid {name} '{value}'"))
    })
}

/// Load the query table from `query_id<TAB>text` lines.
pub fn read_queries(path: impl AsRef<Path>) -> RankingResult<QueryTable> {
    let path = path.as_ref();
    let queries = read_tsv_map(path)?;
    tracing::info!("Loaded {} queries from '{}'", queries.len(), path.display());
    Ok(QueryTable::new(queries))
}

/// Load the document store from `doc_id<TAB>text` lines.
pub fn read_docs(path: impl AsRef<Path>) -> RankingResult<InMemoryDocStore> {
    let path = path.as_ref();
    let docs = read_tsv_map(path)?;
    tracing::info!("Loaded {} documents from '{}'", docs.len(), path.display());
    Ok(InMemoryDocStore::new(docs))
}

/// Load a TREC run file. The iteration and system columns are skipped.
pub fn read_run_file(path: impl AsRef<Path>) -> RankingResult<Vec<RunRecord>> {
    let path = path.as_ref();
    let mut records = Vec::new();
    for (line_no, line) in read_lines(path)? {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 5 {
            return Err(RankingError::parse(
                path,
                line_no,
                format!("expected at least 5 columns, found {}", cols.len()),
            ));
        }
        records.push(RunRecord {
            query_id: cols[0].to_string(),
            doc_id:   cols[2].to_string(),
            rank:     parse_field(path, line_no, "rank", cols[3])?,
            score:    parse_field(path, line_no, "score", cols[4])?,
        });
    }
    tracing::debug!("Read {} run rows from '{}'", records.len(), path.display());
    Ok(records)
}

/// Load TREC qrels (`query_id iteration doc_id relevance`).
pub fn read_qrels(path: impl AsRef<Path>) -> RankingResult<Vec<QrelRecord>> {
    let path = path.as_ref();
    let mut records = Vec::new();
    for (line_no, line) in read_lines(path)? {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 4 {
            return Err(RankingError::parse(
                path,
                line_no,
                format!("expected 4 columns, found {}", cols.len()),
            ));
        }
        records.push(QrelRecord {
            query_id:  cols[0].to_string(),
            doc_id:    cols[2].to_string(),
            relevance: parse_field(path, line_no, "relevance", cols[3])?,
        });
    }
    tracing::debug!("Read {} judgments from '{}'", records.len(), path.display());
    Ok(records)
}

/// Parse one supervision line (5 columns with scores, or 3 without).
pub fn parse_doc_pair(path: &Path, line_no: usize, line: &str) -> RankingResult<DocPair> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    match cols.as_slice() {
        [pos, neg, qid, a, b] => {
            let pos: f32 = parse_field(path, line_no, "pos_score", pos)?;
            let neg: f32 = parse_field(path, line_no, "neg_score", neg)?;
            Ok(DocPair::new(*qid, *a, *b, Some((pos, neg))))
        }
        [qid, a, b] => Ok(DocPair::new(*qid, *a, *b, None)),
        _ => Err(RankingError::parse(
            path,
            line_no,
            format!("expected 3 or 5 columns, found {}", cols.len()),
        )),
    }
}

// ─── DocPairReader ────────────────────────────────────────────────────────────
/// Lazy line-by-line reader over a triples file.
pub struct DocPairReader {
    path:    PathBuf,
    lines:   Lines<BufReader<File>>,
    line_no: usize,
}

impl DocPairReader {
    pub fn open(path: impl Into<PathBuf>) -> RankingResult<Self> {
        let path = path.into();
        let lines = open(&path)?.lines();
        Ok(Self { path, lines, line_no: 0 })
    }
}

impl Iterator for DocPairReader {
    type Item = RankingResult<DocPair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(RankingError::io(&self.path, e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_doc_pair(&self.path, self.line_no, &line));
        }
    }
}
