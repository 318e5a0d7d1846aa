//! Per-estimator model snapshots.
//!
//! A snapshot is a self-contained JSON file holding the best trial of one
//! estimator: its configuration, tracked metrics and the full fitted estimate.
//! Files are named `{estimator}_{time_budget}_{timestamp}.json`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::causal::CausalEstimate;
use crate::domain::Config;
use crate::error::AppError;
use crate::fit::TrialRecord;
use crate::registry::EstimatorId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub estimator: EstimatorId,
    pub config: Config,
    /// Tracked metrics; undefined scores are stored as `null`.
    pub metrics: BTreeMap<String, Option<f64>>,
    pub estimate: CausalEstimate,
}

impl ModelSnapshot {
    pub fn from_record(record: &TrialRecord) -> Self {
        Self {
            tool: "autocausal".to_string(),
            created_at: Utc::now(),
            estimator: record.estimator,
            config: record.config.clone(),
            metrics: record
                .metrics
                .iter()
                .map(|(k, v)| (k.clone(), v.is_finite().then_some(*v)))
                .collect(),
            estimate: record.estimate.clone(),
        }
    }
}

pub fn snapshot_file_name(estimator: EstimatorId, time_budget: Option<f64>, at: DateTime<Local>) -> String {
    let budget = match time_budget {
        Some(b) => format!("{b}"),
        None => "unlimited".to_string(),
    };
    format!("{}_{budget}_{}.json", estimator.as_str(), at.format("%Y%m%d-%H%M%S"))
}

/// Write the snapshot of `record` into `dir` (created if missing).
pub fn write_snapshot(dir: &Path, record: &TrialRecord, time_budget: Option<f64>) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create snapshot directory '{}': {e}", dir.display())))?;
    let path = dir.join(snapshot_file_name(record.estimator, time_budget, Local::now()));
    let file = File::create(&path)
        .map_err(|e| AppError::io(format!("Failed to create snapshot '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &ModelSnapshot::from_record(record))
        .map_err(|e| AppError::io(format!("Failed to write snapshot '{}': {e}", path.display())))?;
    Ok(path)
}

pub fn read_snapshot(path: &Path) -> Result<ModelSnapshot, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open snapshot '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::io(format!("Invalid snapshot '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_carries_estimator_and_budget() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            snapshot_file_name(EstimatorId::TLearner, Some(60.0), at),
            "backdoor.econml.metalearners.TLearner_60_20240301-123005.json"
        );
        assert!(snapshot_file_name(EstimatorId::Dummy, None, at).contains("_unlimited_"));
    }

    #[test]
    fn missing_snapshot_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_snapshot(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
