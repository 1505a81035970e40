//! Training table loader
//!
//! The reference set is a CSV file with a header row. The first column holds
//! the class label, every other column one feature, named by its feature
//! identifier.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read training table: {0}")]
    Csv(#[from] csv::Error),

    #[error("training table needs a label column and at least one feature column, found {0} column(s)")]
    TooFewColumns(usize),

    #[error("label column '{0}' has no data rows")]
    NoData(String),

    #[error("row {row}: label '{value}' is not a non-negative integer")]
    InvalidLabel { row: usize, value: String },

    #[error("row {row}, column '{column}': '{value}' is not a number")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("training table does not match the {profile} feature profile: {detail}")]
    ProfileMismatch { profile: String, detail: String },

    #[error("reference matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("a reference model is already installed")]
    AlreadyInstalled,
}

/// Parsed training table, columns in file order
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub label_column: String,
    pub feature_columns: Vec<String>,
    pub labels: Vec<u32>,
    pub rows: Vec<Vec<f64>>,
}

impl TrainingTable {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Load a training table from a CSV file
pub fn load_table(path: impl AsRef<Path>) -> Result<TrainingTable, ModelError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }

    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let table = parse_table(reader)?;
    tracing::info!(
        "Loaded training table {} ({} rows, {} features)",
        path.display(),
        table.len(),
        table.feature_columns.len()
    );
    Ok(table)
}

/// Parse a training table from any reader, e.g. an in-memory string
pub fn read_table<R: std::io::Read>(input: R) -> Result<TrainingTable, ModelError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    parse_table(reader)
}

fn parse_table<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<TrainingTable, ModelError> {
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(ModelError::TooFewColumns(headers.len()));
    }

    let label_column = headers[0].to_string();
    let feature_columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut labels = Vec::new();
    let mut rows = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // 1-based data row number, header excluded
        let row = i + 1;

        let raw_label = record.get(0).unwrap_or_default();
        let label = parse_label(raw_label).ok_or_else(|| ModelError::InvalidLabel {
            row,
            value: raw_label.to_string(),
        })?;

        let values = feature_columns
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let raw = record.get(col + 1).unwrap_or_default();
                raw.parse::<f64>().map_err(|_| ModelError::InvalidValue {
                    row,
                    column: name.clone(),
                    value: raw.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        labels.push(label);
        rows.push(values);
    }

    if labels.is_empty() {
        return Err(ModelError::NoData(label_column));
    }

    Ok(TrainingTable {
        label_column,
        feature_columns,
        labels,
        rows,
    })
}

/// Largest class code the `samples.classification` column can hold
pub const MAX_LABEL: u32 = i32::MAX as u32;

/// Labels are integer class codes in `0..=MAX_LABEL`; `3.0` style floats
/// from spreadsheet exports are accepted when integral.
fn parse_label(raw: &str) -> Option<u32> {
    let label = match raw.parse::<u32>() {
        Ok(v) => v,
        Err(_) => {
            let v = raw.parse::<f64>().ok()?;
            if v.fract() != 0.0 || v < 0.0 || v > MAX_LABEL as f64 {
                return None;
            }
            v as u32
        }
    };
    (label <= MAX_LABEL).then_some(label)
}
