//! CSV ingest.
//!
//! Turns a policy CSV into `RawRecord`s plus the optional target label per row.
//!
//! Design goals:
//! - **Strict header check** for columns that have no imputation default
//!   (clear errors + exit code 2)
//! - **Row-level validation** (skip unreadable rows and bad targets, but report
//!   what happened)
//! - **No feature logic here**: cells are only typed, never encoded

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{ClassLabel, RawRecord, RawValue, normalize_column_name};
use crate::error::AppError;
use crate::schema::{self, LABEL_SPACE, TARGET_COLUMN};

/// A row-level problem encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Ingest output.
#[derive(Debug, Clone)]
pub struct IngestedData {
    /// Header names as they appear in the file.
    pub headers: Vec<String>,
    /// One record per accepted row, without the target column.
    pub records: Vec<RawRecord>,
    /// Target per accepted row (`None` when the cell was empty or the column absent).
    pub labels: Vec<Option<ClassLabel>>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedData {
    pub fn has_target(&self) -> bool {
        self.headers
            .iter()
            .any(|h| normalize_column_name(h) == normalize_column_name(TARGET_COLUMN))
    }

    /// Records and labels for training. Every accepted row must carry a target.
    pub fn labeled(&self) -> Result<(Vec<RawRecord>, Vec<ClassLabel>), AppError> {
        if !self.has_target() {
            return Err(AppError::new(
                2,
                format!("Missing required column for training: `{TARGET_COLUMN}`"),
            ));
        }
        let mut labels = Vec::with_capacity(self.labels.len());
        for (row, label) in self.labels.iter().enumerate() {
            match label {
                Some(l) => labels.push(*l),
                None => {
                    return Err(AppError::new(
                        2,
                        format!("record {row}: missing `{TARGET_COLUMN}` value"),
                    ));
                }
            }
        }
        Ok((self.records.clone(), labels))
    }
}

/// Load a CSV file.
pub fn load_records(path: &Path) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_records(file)
}

/// Read CSV from any reader (the header row is required).
pub fn read_records<R: Read>(input: R) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(&header_map)?;
    let target_idx = header_map.get(&normalize_column_name(TARGET_COLUMN)).copied();
    let id_idx = header_map.get(&normalize_column_name(schema::ID_COLUMN)).copied();

    let mut records = Vec::new();
    let mut labels = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based lines, plus the header line.
        let line = idx + 2;
        rows_read += 1;

        let row = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let label = match target_idx.map(|i| row.get(i).unwrap_or("")) {
            None => None,
            Some(cell) => match parse_label(cell) {
                Ok(label) => label,
                Err(message) => {
                    row_errors.push(RowError {
                        line,
                        id: id_idx.and_then(|i| row.get(i)).map(str::to_string),
                        message,
                    });
                    continue;
                }
            },
        };

        let mut record = RawRecord::new();
        for (i, name) in headers.iter().enumerate() {
            if Some(i) == target_idx {
                continue;
            }
            record.insert(name, RawValue::parse(row.get(i).unwrap_or("")));
        }
        records.push(record);
        labels.push(label);
    }

    if records.is_empty() {
        return Err(AppError::new(3, "No valid rows in the CSV."));
    }

    Ok(IngestedData {
        headers: headers.iter().map(str::to_string).collect(),
        records,
        labels,
        row_errors,
        rows_read,
    })
}

/// Parse a target cell. Empty cells are `Ok(None)`.
pub fn parse_label(cell: &str) -> Result<Option<ClassLabel>, String> {
    let value = match RawValue::parse(cell) {
        RawValue::Missing => return Ok(None),
        RawValue::Number(v) => v,
        RawValue::Text(s) => return Err(format!("invalid `{TARGET_COLUMN}` value '{s}'")),
    };
    if value.fract() != 0.0 || value < 0.0 || value >= LABEL_SPACE as f64 {
        return Err(format!(
            "`{TARGET_COLUMN}` value {value} is outside 0..={}",
            LABEL_SPACE - 1
        ));
    }
    Ok(Some(value as ClassLabel))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_column_name(name), idx))
        .collect()
}

fn ensure_required_columns_exist(header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    let missing: Vec<&str> = schema::required_columns()
        .into_iter()
        .filter(|c| !header_map.contains_key(&normalize_column_name(c)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::new(
            2,
            format!("Missing required column(s): {}", missing.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::required_columns;

    fn header() -> String {
        let mut cols = vec!["User_ID".to_string()];
        cols.extend(required_columns().into_iter().map(str::to_string));
        cols.push(TARGET_COLUMN.to_string());
        cols.join(",")
    }

    fn row(id: &str, target: &str) -> String {
        // Every required column gets a plausible value; the month is a name.
        let mut cells = vec![id.to_string()];
        for col in required_columns() {
            cells.push(match col {
                "Policy_Start_Month" => "March".to_string(),
                "Broker_Agency_Type" => "Direct".to_string(),
                "Payment_Schedule" => "Monthly".to_string(),
                "Employment_Status" => "Employed".to_string(),
                _ => "1".to_string(),
            });
        }
        cells.push(target.to_string());
        cells.join(",")
    }

    #[test]
    fn reads_records_and_targets() {
        let csv = format!("\u{feff}{}\n{}\n{}\n", header(), row("a", "3"), row("b", ""));
        let data = read_records(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_read, 2);
        assert_eq!(data.labels, vec![Some(3), None]);
        assert!(data.has_target());
        // The target never leaks into the feature record.
        assert!(!data.records[0].contains(TARGET_COLUMN));
        assert_eq!(data.records[0].get("user_id"), &RawValue::Text("a".to_string()));
        // Training needs every target.
        assert!(data.labeled().is_err());
    }

    #[test]
    fn bad_targets_become_row_errors() {
        let csv = format!("{}\n{}\n{}\n{}\n", header(), row("a", "12"), row("b", "x"), row("c", "7"));
        let data = read_records(csv.as_bytes()).unwrap();
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 2);
        assert_eq!(data.row_errors[1].id.as_deref(), Some("b"));
        let (_, labels) = data.labeled().unwrap();
        assert_eq!(labels, vec![7]);
    }

    #[test]
    fn missing_required_column_is_an_input_error() {
        let err = read_records("User_ID,Policy_Start_Year\nx,2024\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("Employment_Status"));
    }

    #[test]
    fn label_parsing() {
        assert_eq!(parse_label("0"), Ok(Some(0)));
        assert_eq!(parse_label("9.0"), Ok(Some(9)));
        assert_eq!(parse_label(" "), Ok(None));
        assert!(parse_label("10").is_err());
        assert!(parse_label("2.5").is_err());
        assert!(parse_label("-1").is_err());
    }
}
