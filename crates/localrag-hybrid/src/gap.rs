//! Gap tracking: low-confidence queries appended for corpus curation.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use localrag_core::traits::GapSink;
use localrag_core::types::{ConfidenceAssessment, ConfidenceLevel, GapRecord};

pub fn gap_record(query: &str, confidence: &ConfidenceAssessment) -> GapRecord {
    GapRecord {
        timestamp: Utc::now(),
        query: query.to_string(),
        level: confidence.level,
        top_score: confidence.top_score,
        num_results: confidence.num_results,
        sources: confidence.sources.clone(),
    }
}

/// One JSON object per line, appended. Writers in this process are serialized.
pub struct JsonlGapSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlGapSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl GapSink for JsonlGapSink {
    fn append(&self, record: &GapRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open gap tracker {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        debug!(path = %self.path.display(), query = %record.query, "gap logged");
        Ok(())
    }
}

/// Keeps records in memory; useful for tests and embedding callers.
#[derive(Default)]
pub struct MemoryGapSink {
    records: Mutex<Vec<GapRecord>>,
}

impl MemoryGapSink {
    pub fn new() -> Self { Self::default() }

    pub fn records(&self) -> Vec<GapRecord> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl GapSink for MemoryGapSink {
    fn append(&self, record: &GapRecord) -> Result<()> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(record.clone());
        Ok(())
    }
}

/// One distinct query (case-insensitive) from the gap tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct GapSummary {
    pub query: String,
    pub level: ConfidenceLevel,
    pub top_score: f32,
    pub num_results: usize,
    pub last_seen: DateTime<Utc>,
    pub asked: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapReport {
    pub total: usize,
    /// Most recent first; each entry reflects the latest record for that query.
    pub entries: Vec<GapSummary>,
}

/// Summarise a JSONL gap tracker. A missing file is an empty report.
/// Lines that do not parse are skipped with a warning.
pub fn gap_report(path: &Path) -> Result<GapReport> {
    if !path.exists() {
        return Ok(GapReport::default());
    }
    let file = std::fs::File::open(path).with_context(|| format!("open gap tracker {}", path.display()))?;
    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        match serde_json::from_str::<GapRecord>(&line) {
            Ok(r) => records.push(r),
            Err(e) => warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping malformed gap record"),
        }
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in &records {
        *counts.entry(r.query.to_lowercase()).or_default() += 1;
    }
    let mut seen = std::collections::HashSet::new();
    let entries = records
        .iter()
        .rev()
        .filter(|r| seen.insert(r.query.to_lowercase()))
        .map(|r| GapSummary {
            query: r.query.clone(),
            level: r.level,
            top_score: r.top_score,
            num_results: r.num_results,
            last_seen: r.timestamp,
            asked: counts.get(&r.query.to_lowercase()).copied().unwrap_or(1),
        })
        .collect();
    Ok(GapReport { total: records.len(), entries })
}
