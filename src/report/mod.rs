//! Reporting utilities: dataset profiles, label distributions, formatted output.

pub mod format;

pub use format::*;

use crate::domain::{ClassLabel, RawValue, normalize_column_name};
use crate::io::ingest::IngestedData;
use crate::schema::{ColumnRole, TARGET_COLUMN, column_role};

/// Missing-value count for one input column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub missing: usize,
    /// At least one non-missing cell is not numeric.
    pub textual: bool,
    /// `None` for columns the registry does not know.
    pub role: Option<ColumnRole>,
}

impl ColumnProfile {
    /// The column never reaches the model.
    pub fn is_ignored(&self) -> bool {
        matches!(self.role, None | Some(ColumnRole::Drop))
    }
}

/// What `bundle profile` prints about a CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    pub target: Vec<ClassShare>,
    /// Rows without a target value.
    pub unlabeled: usize,
    pub rejected_rows: usize,
}

/// Count and percentage of one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassShare {
    pub label: ClassLabel,
    pub count: usize,
    pub percent: f64,
}

/// Class counts sorted by label, with percentages of the total.
pub fn distribution(labels: &[ClassLabel]) -> Vec<ClassShare> {
    let mut counts = [0usize; 256];
    for &l in labels {
        counts[usize::from(l)] += 1;
    }
    let total = labels.len().max(1) as f64;
    counts
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .map(|(label, &count)| ClassShare {
            label: label as ClassLabel,
            count,
            percent: 100.0 * count as f64 / total,
        })
        .collect()
}

/// Profile an ingested CSV (missing values per column, target distribution).
pub fn profile(data: &IngestedData) -> DatasetProfile {
    let target = normalize_column_name(TARGET_COLUMN);
    let columns = data
        .headers
        .iter()
        .filter(|h| normalize_column_name(h) != target)
        .map(|name| {
            let mut missing = 0;
            let mut textual = false;
            for record in &data.records {
                match record.get(name) {
                    RawValue::Missing => missing += 1,
                    RawValue::Text(_) => textual = true,
                    RawValue::Number(_) => {}
                }
            }
            ColumnProfile {
                name: name.trim_start_matches('\u{feff}').to_string(),
                missing,
                textual,
                role: column_role(name),
            }
        })
        .collect();

    let labeled: Vec<ClassLabel> = data.labels.iter().flatten().copied().collect();
    DatasetProfile {
        rows: data.records.len(),
        columns,
        target: distribution(&labeled),
        unlabeled: data.labels.len() - labeled.len(),
        rejected_rows: data.row_errors.len(),
    }
}
