//! A small column-oriented numeric frame.
//!
//! The AutoML loop only needs: column lookup by name, dense feature matrices
//! for a list of columns, row subsetting, and a shuffled train/test split.

use std::collections::HashMap;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
    n_rows: usize,
}

impl Frame {
    /// Build a frame from `(name, values)` pairs. All columns must have the same length.
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self, AppError> {
        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        let mut index = HashMap::with_capacity(columns.len());

        for (name, values) in columns {
            if values.len() != n_rows {
                return Err(AppError::data(format!(
                    "Column '{name}' has {} rows, expected {n_rows}.",
                    values.len()
                )));
            }
            if index.insert(name.clone(), names.len()).is_some() {
                return Err(AppError::data(format!("Duplicate column '{name}'.")));
            }
            names.push(name);
            data.push(values);
        }

        Ok(Self {
            names,
            columns: data,
            index,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&[f64], AppError> {
        self.index
            .get(name)
            .map(|&i| self.columns[i].as_slice())
            .ok_or_else(|| AppError::data(format!("Missing column '{name}'.")))
    }

    /// Dense `n_rows × names.len()` matrix of the requested columns, in order.
    ///
    /// An empty `names` list yields an `n_rows × 0` matrix.
    pub fn matrix(&self, names: &[String]) -> Result<DMatrix<f64>, AppError> {
        let cols: Vec<&[f64]> = names.iter().map(|n| self.column(n)).collect::<Result<_, _>>()?;
        Ok(DMatrix::from_fn(self.n_rows, cols.len(), |r, c| cols[c][r]))
    }

    /// Append or replace a column.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, AppError> {
        let name = name.into();
        if values.len() != self.n_rows && !self.names.is_empty() {
            return Err(AppError::data(format!(
                "Column '{name}' has {} rows, expected {}.",
                values.len(),
                self.n_rows
            )));
        }
        if self.names.is_empty() {
            self.n_rows = values.len();
        }
        match self.index.get(&name) {
            Some(&i) => self.columns[i] = values,
            None => {
                self.index.insert(name.clone(), self.names.len());
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(self)
    }

    /// Rows at `rows`, in that order.
    pub fn take(&self, rows: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|col| rows.iter().map(|&r| col[r]).collect())
            .collect();
        Frame {
            names: self.names.clone(),
            columns,
            index: self.index.clone(),
            n_rows: rows.len(),
        }
    }

    /// Shuffled split into `(train, test)` with `round(train_size * n)` training rows.
    ///
    /// Both parts are guaranteed at least one row when `n >= 2`.
    pub fn train_test_split(&self, train_size: f64, seed: u64) -> Result<(Frame, Frame), AppError> {
        if !(train_size > 0.0 && train_size < 1.0) {
            return Err(AppError::config(format!("train_size must be in (0, 1), got {train_size}.")));
        }
        if self.n_rows < 2 {
            return Err(AppError::data(format!(
                "Need at least 2 rows to split into train/test, got {}.",
                self.n_rows
            )));
        }
        let mut rows: Vec<usize> = (0..self.n_rows).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);

        let n_train = ((train_size * self.n_rows as f64).round() as usize).clamp(1, self.n_rows - 1);
        let (train, test) = rows.split_at(n_train);
        Ok((self.take(train), self.take(test)))
    }

    /// Random subsample of `n` rows without replacement.
    pub fn sample(&self, n: usize, seed: u64) -> Result<Frame, AppError> {
        if n > self.n_rows {
            return Err(AppError::config(format!(
                "Cannot sample {n} rows from a frame with {} rows.",
                self.n_rows
            )));
        }
        let mut rows: Vec<usize> = (0..self.n_rows).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);
        rows.truncate(n);
        Ok(self.take(&rows))
    }
}
