//! Export search results to CSV/JSON.
//!
//! Undefined (NaN) scores are written as empty CSV cells and JSON `null`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::data::Frame;
use crate::domain::{Config, Metric};
use crate::error::AppError;
use crate::fit::{AutoCausality, TuneEntry};
use crate::registry::EstimatorId;
use crate::scoring::{PolicyTable, Scores};

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Every evaluated trial, one CSV row each.
pub fn write_history_csv(path: &Path, history: &[TuneEntry]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create history CSV '{}': {e}", path.display())))?;
    let io_err = |e: csv::Error| AppError::io(format!("Failed to write history CSV: {e}"));

    writer
        .write_record(["estimator", "trial", "score", "error", "config"])
        .map_err(io_err)?;
    for entry in history {
        let config = serde_json::to_string(&entry.config)
            .map_err(|e| AppError::io(format!("Failed to encode trial config: {e}")))?;
        writer
            .write_record([
                entry.estimator.as_str().to_string(),
                entry.trial.to_string(),
                entry.score.and_then(finite).map(|s| s.to_string()).unwrap_or_default(),
                entry.error.clone().unwrap_or_default(),
                config,
            ])
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| AppError::io(format!("Failed to flush history CSV: {e}")))?;
    Ok(())
}

/// Write a frame as CSV with a header row. NaN cells are left empty.
pub fn write_frame_csv(path: &Path, frame: &Frame) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create CSV '{}': {e}", path.display())))?;
    let io_err = |e: csv::Error| AppError::io(format!("Failed to write CSV: {e}"));

    let names = frame.column_names();
    let columns: Vec<&[f64]> = names.iter().map(|n| frame.column(n)).collect::<Result<_, _>>()?;
    writer.write_record(names).map_err(io_err)?;
    for r in 0..frame.n_rows() {
        writer
            .write_record(columns.iter().map(|c| if c[r].is_nan() { String::new() } else { c[r].to_string() }))
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| AppError::io(format!("Failed to flush CSV: {e}")))?;
    Ok(())
}

/// Per-row ERUPT diagnostics.
pub fn write_policy_csv(path: &Path, table: &PolicyTable) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create policy CSV '{}': {e}", path.display())))?;
    let io_err = |e: csv::Error| AppError::io(format!("Failed to write policy CSV: {e}"));

    writer
        .write_record(["treated", "outcome", "propensity", "policy", "weight"])
        .map_err(io_err)?;
    for i in 0..table.len() {
        writer
            .write_record([
                table.treated[i].to_string(),
                table.outcome[i].to_string(),
                format!("{:.6}", table.propensity[i]),
                u8::from(table.policy[i]).to_string(),
                format!("{:.6}", table.weights[i]),
            ])
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| AppError::io(format!("Failed to flush policy CSV: {e}")))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSet {
    pub erupt: Option<f64>,
    pub qini: Option<f64>,
    pub auc: Option<f64>,
    pub r_score: Option<f64>,
    pub ate: Option<f64>,
}

impl From<&Scores> for MetricSet {
    fn from(s: &Scores) -> Self {
        Self {
            erupt: finite(s.get(Metric::Erupt)),
            qini: finite(s.get(Metric::Qini)),
            auc: finite(s.get(Metric::Auc)),
            r_score: finite(s.get(Metric::RScore)),
            ate: finite(s.get(Metric::Ate)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimatorExport {
    pub config: Config,
    pub train: MetricSet,
    pub test: MetricSet,
    pub interpretation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoresExport {
    pub metric: Metric,
    pub best_estimator: EstimatorId,
    pub best_config: Config,
    pub best_score: Option<f64>,
    pub estimators: BTreeMap<EstimatorId, EstimatorExport>,
}

impl ScoresExport {
    pub fn from_search(ac: &AutoCausality) -> Result<Self, AppError> {
        let configs = ac.best_config_per_estimator();
        let estimators = ac
            .full_scores()
            .into_iter()
            .map(|(id, s)| {
                let export = EstimatorExport {
                    config: configs.get(&id).cloned().unwrap_or_default(),
                    train: MetricSet::from(&s.train),
                    test: MetricSet::from(&s.test),
                    interpretation: s.train.interpretation.to_string(),
                };
                (id, export)
            })
            .collect();
        Ok(Self {
            metric: ac.config().metric,
            best_estimator: ac.best_estimator()?,
            best_config: ac.best_config()?.clone(),
            best_score: finite(ac.best_score()?),
            estimators,
        })
    }
}

pub fn write_scores_json(path: &Path, ac: &AutoCausality) -> Result<(), AppError> {
    let export = ScoresExport::from_search(ac)?;
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create scores JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &export)
        .map_err(|e| AppError::io(format!("Failed to write scores JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamValue;

    #[test]
    fn history_csv_leaves_failed_scores_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let history = vec![
            TuneEntry {
                estimator: EstimatorId::LinearDml,
                trial: 0,
                config: Config::from([("cv".to_string(), ParamValue::Int(3))]),
                score: Some(0.25),
                error: None,
            },
            TuneEntry {
                estimator: EstimatorId::LinearDml,
                trial: 1,
                config: Config::new(),
                score: None,
                error: Some("boom".into()),
            },
        ];
        write_history_csv(&path, &history).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "0.25");
        assert_eq!(&rows[0][4], r#"{"cv":3}"#);
        assert_eq!(&rows[1][2], "");
        assert_eq!(&rows[1][3], "boom");
    }

    #[test]
    fn frame_csv_reads_back_through_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.csv");
        let frame = Frame::new(vec![
            ("t".into(), vec![0.0, 1.0, 1.0]),
            ("y".into(), vec![1.5, f64::NAN, -2.0]),
        ])
        .unwrap();
        write_frame_csv(&path, &frame).unwrap();
        let back = crate::io::load_csv(&path).unwrap().frame;
        assert_eq!(back.column("t").unwrap(), frame.column("t").unwrap());
        assert!(back.column("y").unwrap()[1].is_nan());
        assert_eq!(back.column("y").unwrap()[2], -2.0);
    }

    #[test]
    fn policy_csv_has_one_row_per_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.csv");
        let table = PolicyTable::new(
            2,
            vec![1.0, 0.0],
            vec![3.0, 1.0],
            vec![0.5, 0.5],
            vec![true, false],
            vec![1.0, 1.0],
        )
        .unwrap();
        write_policy_csv(&path, &table).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().ends_with(",1,1.000000"));
    }
}
