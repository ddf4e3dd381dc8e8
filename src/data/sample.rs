//! Synthetic policy dataset generation.
//!
//! Produces raw records shaped like the historical policy export, with a
//! bundle label that is learnable from a handful of features:
//!
//! - income bracket sets the base bundle (0..=3)
//! - households with two or more dependents move up four bundles (4..=7)
//! - a small share of rows get a random bundle (label noise)
//! - a fixed number of rows are tagged with the rare bundles 8 and 9
//!
//! Missing cells are injected into the imputable columns and the dropped
//! identifier columns, so ingest and imputation are exercised too.

use std::fs::File;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ClassLabel, RawRecord, RawValue};
use crate::error::AppError;
use crate::schema::{self, TARGET_COLUMN};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Knobs for `generate_sample`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub rows: usize,
    pub seed: u64,
    /// Rows labelled 8 and 9 respectively.
    pub rare_rows: (usize, usize),
    /// Share of rows whose label is replaced by a random bundle.
    pub label_noise: f64,
    /// Share of imputable cells left empty.
    pub missing_rate: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            rows: 2_000,
            seed: 42,
            rare_rows: (6, 5),
            label_noise: 0.05,
            missing_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleData {
    pub records: Vec<RawRecord>,
    pub labels: Vec<ClassLabel>,
}

pub fn generate_sample(config: &SampleConfig) -> Result<SampleData, AppError> {
    let rare = config.rare_rows.0 + config.rare_rows.1;
    if config.rows == 0 {
        return Err(AppError::new(2, "Sample row count must be > 0."));
    }
    if rare > config.rows {
        return Err(AppError::new(2, "More rare-class rows than sample rows."));
    }
    if !(0.0..1.0).contains(&config.label_noise) || !(0.0..1.0).contains(&config.missing_rate) {
        return Err(AppError::new(2, "Noise and missing rates must be in [0, 1)."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let log_income = Normal::<f64>::new(11.0, 0.5)
        .map_err(|e| AppError::new(4, format!("Income distribution error: {e}")))?;
    let epoch = NaiveDate::from_ymd_opt(2022, 1, 1)
        .ok_or_else(|| AppError::new(4, "Invalid sample epoch."))?;

    let mut records = Vec::with_capacity(config.rows);
    let mut labels = Vec::with_capacity(config.rows);

    for i in 0..config.rows {
        let start = epoch + Duration::days(rng.gen_range(0..3 * 365));
        let income: f64 = log_income.sample(&mut rng).exp().round();
        let adults: i64 = rng.gen_range(0..=2);
        let children: i64 = rng.gen_range(0..=2);
        let existing = rng.gen_bool(0.4);
        let claims: i64 = if rng.gen_bool(0.7) { 0 } else { rng.gen_range(1..=4) };

        let bracket: ClassLabel = match income {
            x if x < 40_000.0 => 0,
            x if x < 60_000.0 => 1,
            x if x < 90_000.0 => 2,
            _ => 3,
        };
        let mut label = if adults + children >= 2 { bracket + 4 } else { bracket };
        if rng.gen_bool(config.label_noise) {
            label = rng.gen_range(0..=7);
        }
        // Rare bundles take the last rows so their counts are exact.
        if i >= config.rows - rare {
            label = if i >= config.rows - config.rare_rows.1 { 9 } else { 8 };
        }

        let missing = config.missing_rate;
        let child_cell = maybe(&mut rng, missing, children);
        let deductible = pick(&mut rng, schema::DEDUCTIBLE_TIER.values);
        let deductible_cell = maybe(&mut rng, missing, deductible);
        let channel = pick(&mut rng, schema::ACQUISITION_CHANNEL.values);
        let channel_cell = maybe(&mut rng, missing, channel);
        let employer = format!("E{}", rng.gen_range(1..=500));
        let employer_cell = maybe(&mut rng, 0.8, employer);
        let broker: i64 = rng.gen_range(1..=200);
        let broker_cell = maybe(&mut rng, 0.5, broker);

        let record = RawRecord::new()
            .with("User_ID", format!("U{:06}", i + 1))
            .with("Policy_Cancelled_Post_Purchase", i64::from(rng.gen_bool(0.05)))
            .with("Policy_Start_Year", i64::from(start.year()))
            .with("Policy_Start_Month", MONTH_NAMES[start.month0() as usize])
            .with("Policy_Start_Week", i64::from(start.iso_week().week()))
            .with("Policy_Start_Day", i64::from(start.day()))
            .with("Grace_Period_Extensions", rng.gen_range(0..=2i64))
            .with(
                "Previous_Policy_Duration_Months",
                if existing { rng.gen_range(6..=120i64) } else { 0 },
            )
            .with("Adult_Dependents", adults)
            .with("Child_Dependents", child_cell)
            .with("Infant_Dependents", rng.gen_range(0..=1i64))
            .with("Existing_Policyholder", i64::from(existing))
            .with("Previous_Claims_Filed", claims)
            .with("Years_Without_Claims", if claims == 0 { rng.gen_range(1..=10i64) } else { 0 })
            .with("Policy_Amendments_Count", rng.gen_range(0..=3i64))
            .with("Underwriting_Processing_Days", rng.gen_range(1..=30i64))
            .with("Vehicles_on_Policy", rng.gen_range(0..=3i64))
            .with("Custom_Riders_Requested", rng.gen_range(0..=2i64))
            .with("Broker_Agency_Type", pick(&mut rng, schema::BROKER_AGENCY_TYPE.values))
            .with("Deductible_Tier", deductible_cell)
            .with("Acquisition_Channel", channel_cell)
            .with("Payment_Schedule", pick(&mut rng, schema::PAYMENT_SCHEDULE.values))
            .with("Employment_Status", pick(&mut rng, schema::EMPLOYMENT_STATUS.values))
            .with("Estimated_Annual_Income", income)
            .with("Days_Since_Quote", rng.gen_range(0..=60i64))
            .with("Employer_ID", employer_cell)
            .with("Broker_ID", broker_cell)
            .with("Region_Code", format!("R{:02}", rng.gen_range(1..=20)));

        records.push(record);
        labels.push(label);
    }

    Ok(SampleData { records, labels })
}

/// Pick a real category (never the reserved `Unknown` at index 0).
fn pick(rng: &mut StdRng, values: &'static [&'static str]) -> &'static str {
    values[rng.gen_range(1..values.len())]
}

fn maybe<T: Into<RawValue>>(rng: &mut StdRng, missing_rate: f64, value: T) -> RawValue {
    if rng.gen_bool(missing_rate) {
        RawValue::Missing
    } else {
        value.into()
    }
}

/// Write a sample as a training CSV (raw columns + target).
pub fn write_sample_csv(path: &Path, sample: &SampleData) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create sample CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = schema::raw_columns();
    header.push(TARGET_COLUMN);
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write sample CSV header: {e}")))?;

    for (record, label) in sample.records.iter().zip(&sample.labels) {
        let mut row: Vec<String> = header[..header.len() - 1]
            .iter()
            .map(|col| record.get(col).display())
            .collect();
        row.push(label.to_string());
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write sample CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush sample CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::class_counts;
    use crate::features::transform;
    use crate::io::ingest::load_records;

    fn small() -> SampleConfig {
        SampleConfig {
            rows: 300,
            ..SampleConfig::default()
        }
    }

    #[test]
    fn same_seed_same_sample() {
        let a = generate_sample(&small()).unwrap();
        let b = generate_sample(&small()).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn rare_bundles_have_exact_counts() {
        let sample = generate_sample(&small()).unwrap();
        let counts = class_counts(&sample.labels);
        assert_eq!(counts.get(&8), Some(&6));
        assert_eq!(counts.get(&9), Some(&5));
        assert!(sample.labels.iter().all(|&l| l <= 9));
    }

    #[test]
    fn sample_records_transform_cleanly() {
        let sample = generate_sample(&small()).unwrap();
        let batch = transform(&sample.records).unwrap();
        assert_eq!(batch.len(), 300);
        assert_eq!(batch.unknown_categories, 0);
    }

    #[test]
    fn csv_round_trip_through_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let sample = generate_sample(&small()).unwrap();
        write_sample_csv(&path, &sample).unwrap();

        let data = load_records(&path).unwrap();
        assert!(data.row_errors.is_empty());
        let (records, labels) = data.labeled().unwrap();
        assert_eq!(labels, sample.labels);
        assert_eq!(transform(&records).unwrap(), transform(&sample.records).unwrap());
    }

    #[test]
    fn rejects_bad_settings() {
        let bad = SampleConfig {
            rows: 5,
            rare_rows: (6, 5),
            ..SampleConfig::default()
        };
        assert_eq!(generate_sample(&bad).unwrap_err().exit_code(), 2);
    }
}
