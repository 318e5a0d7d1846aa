//! CSV ingest.
//!
//! Turns a CSV file into a numeric [`Frame`]:
//! - a column whose non-empty cells all parse as numbers stays numeric
//!   (empty cells become NaN)
//! - any other column is dummy-encoded into `{name}_{level}` 0/1 columns,
//!   dropping the first level in sorted order
//! - records with the wrong number of fields are skipped and reported
//!
//! Missing values are left as NaN; [`preprocess_dataset`](crate::data::preprocess_dataset)
//! drops those rows.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::data::Frame;
use crate::error::AppError;

/// A record that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedFrame {
    pub frame: Frame,
    /// Source columns that were dummy-encoded.
    pub encoded: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

pub fn load_csv(path: &Path) -> Result<IngestedFrame, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    let ingested = read_csv(file)?;
    if !ingested.row_errors.is_empty() {
        warn!(
            path = %path.display(),
            skipped = ingested.row_errors.len(),
            "skipped malformed CSV records"
        );
    }
    Ok(ingested)
}

pub fn read_csv<R: Read>(reader: R) -> Result<IngestedFrame, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::data(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();
    if headers.is_empty() || headers.iter().any(|h| h.is_empty()) {
        return Err(AppError::data("CSV header has empty column names."));
    }
    let mut seen = BTreeSet::new();
    if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(AppError::data(format!("Duplicate CSV column '{dup}'.")));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        if record.len() != headers.len() {
            row_errors.push(RowError {
                line,
                message: format!("expected {} fields, found {}", headers.len(), record.len()),
            });
            continue;
        }
        for (col, value) in cells.iter_mut().zip(record.iter()) {
            col.push(value.to_string());
        }
    }
    if cells[0].is_empty() {
        return Err(AppError::data("CSV contains no usable rows."));
    }

    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    let mut encoded = Vec::new();
    for (name, values) in headers.iter().zip(&cells) {
        match parse_numeric(values) {
            Some(numeric) => columns.push((name.clone(), numeric)),
            None => {
                debug!(column = %name, "dummy-encoding non-numeric column");
                columns.extend(dummy_encode(name, values));
                encoded.push(name.clone());
            }
        }
    }

    Ok(IngestedFrame {
        frame: Frame::new(columns)?,
        encoded,
        row_errors,
        rows_read,
    })
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn parse_numeric(values: &[String]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| if v.is_empty() { Some(f64::NAN) } else { v.parse::<f64>().ok() })
        .collect()
}

fn dummy_encode(name: &str, values: &[String]) -> Vec<(String, Vec<f64>)> {
    let levels: BTreeSet<&str> = values.iter().map(String::as_str).filter(|v| !v.is_empty()).collect();
    levels
        .into_iter()
        .skip(1)
        .map(|level| {
            let column = values
                .iter()
                .map(|v| match v.as_str() {
                    "" => f64::NAN,
                    v if v == level => 1.0,
                    _ => 0.0,
                })
                .collect();
            (format!("{name}_{level}"), column)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_categorical_columns() {
        let csv = "\u{feff}treatment,y,city\n1,2.5,paris\n0,1.0,oslo\n1,,rome\n";
        let out = read_csv(csv.as_bytes()).unwrap();
        let f = &out.frame;
        assert_eq!(f.column_names(), &["treatment", "y", "city_paris", "city_rome"]);
        assert!(f.column("y").unwrap()[2].is_nan());
        assert_eq!(f.column("city_paris").unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(f.column("city_rome").unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(out.encoded, vec!["city"]);
    }

    #[test]
    fn short_records_are_reported_and_skipped() {
        let csv = "a,b\n1,2\n3\n4,5\n";
        let out = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(out.rows_read, 3);
        assert_eq!(out.frame.n_rows(), 2);
        assert_eq!(out.row_errors.len(), 1);
        assert_eq!(out.row_errors[0].line, 3);
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        assert!(read_csv("a,a\n1,2\n".as_bytes()).is_err());
    }

    #[test]
    fn load_csv_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "t,y\n0,1\n1,3\n").unwrap();
        let out = load_csv(&path).unwrap();
        assert_eq!(out.frame.n_rows(), 2);
        assert_eq!(load_csv(&dir.path().join("missing.csv")).unwrap_err().kind(), crate::error::ErrorKind::Io);
    }
}
