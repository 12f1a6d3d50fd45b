//! Session-wide tracking of rejected inputs.
//!
//! Three classes accumulate over a run: invalid points, invalid
//! clusters, and processing errors. Appends are mutex-guarded so any
//! worker can record; the report is written once at the end of the
//! pipeline if anything accumulated.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// One rejected record with its stage and reason.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidRecord {
    /// The rejected input, as close to raw as practical.
    pub data: serde_json::Value,
    /// Why it was rejected.
    pub reason: String,
    /// Pipeline stage that rejected it.
    pub stage: String,
}

/// Counts per class, for the final report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSummary {
    /// Rejected POI/point records.
    pub total_invalid_points: usize,
    /// Rejected clusters.
    pub total_invalid_clusters: usize,
    /// Processing errors.
    pub total_processing_errors: usize,
}

impl TrackerSummary {
    /// Returns `true` when nothing was rejected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_invalid_points == 0
            && self.total_invalid_clusters == 0
            && self.total_processing_errors == 0
    }
}

/// Thread-safe accumulator for rejected records.
#[derive(Debug, Default)]
pub struct InvalidDataTracker {
    invalid_points: Mutex<Vec<InvalidRecord>>,
    invalid_clusters: Mutex<Vec<InvalidRecord>>,
    processing_errors: Mutex<Vec<InvalidRecord>>,
}

impl InvalidDataTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an invalid point (POI, coordinate row, address).
    pub fn add_invalid_point(&self, data: serde_json::Value, reason: &str, stage: &str) {
        Self::push(&self.invalid_points, data, reason, stage);
    }

    /// Records a failed cluster.
    pub fn add_invalid_cluster(&self, data: serde_json::Value, reason: &str, stage: &str) {
        Self::push(&self.invalid_clusters, data, reason, stage);
    }

    /// Records a processing error on an individual item.
    pub fn add_processing_error(&self, data: serde_json::Value, reason: &str, stage: &str) {
        Self::push(&self.processing_errors, data, reason, stage);
    }

    /// Clears every class (called at the start of each run).
    pub fn reset(&self) {
        Self::lock(&self.invalid_points).clear();
        Self::lock(&self.invalid_clusters).clear();
        Self::lock(&self.processing_errors).clear();
    }

    /// Current counts per class.
    #[must_use]
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            total_invalid_points: Self::lock(&self.invalid_points).len(),
            total_invalid_clusters: Self::lock(&self.invalid_clusters).len(),
            total_processing_errors: Self::lock(&self.processing_errors).len(),
        }
    }

    /// Writes the session report (CSV + JSON) when anything
    /// accumulated. Returns the files written.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when a report file cannot be
    /// written.
    pub fn write_report(&self, directory: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
        let summary = self.summary();
        if summary.is_empty() {
            return Ok(Vec::new());
        }

        std::fs::create_dir_all(directory)?;
        let records = self.all_records();
        let mut written = Vec::new();

        let json_path = directory.join(format!("{prefix}_invalid_data.json"));
        let report = serde_json::json!({
            "summary": summary,
            "records": records,
        });
        std::fs::write(&json_path, serde_json::to_string_pretty(&report)?)?;
        written.push(json_path);

        let csv_path = directory.join(format!("{prefix}_invalid_data.csv"));
        let mut writer = csv::Writer::from_path(&csv_path).map_err(std::io::Error::other)?;
        writer
            .write_record(["stage", "reason", "data"])
            .map_err(std::io::Error::other)?;
        for record in &records {
            writer
                .write_record([
                    record.stage.as_str(),
                    record.reason.as_str(),
                    &record.data.to_string(),
                ])
                .map_err(std::io::Error::other)?;
        }
        writer.flush()?;
        written.push(csv_path);

        Ok(written)
    }

    fn all_records(&self) -> Vec<InvalidRecord> {
        let mut records = Vec::new();
        records.extend(Self::lock(&self.invalid_points).iter().cloned());
        records.extend(Self::lock(&self.invalid_clusters).iter().cloned());
        records.extend(Self::lock(&self.processing_errors).iter().cloned());
        records
    }

    fn push(target: &Mutex<Vec<InvalidRecord>>, data: serde_json::Value, reason: &str, stage: &str) {
        Self::lock(target).push(InvalidRecord {
            data,
            reason: reason.to_string(),
            stage: stage.to_string(),
        });
    }

    fn lock(target: &Mutex<Vec<InvalidRecord>>) -> MutexGuard<'_, Vec<InvalidRecord>> {
        match target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
