//! Feature engineering: raw records -> fixed-width feature vectors.
//!
//! This is the one transform shared by training and serving, so it is a pure
//! function of its input and the schema registry:
//! - dropped and unknown columns are ignored
//! - imputable cells get their registry default, other missing cells are errors
//! - the start month becomes a `(sin, cos)` pair
//! - categories outside their domain encode as `Unknown`
//! - output order is always `schema::FEATURES`

use std::f64::consts::PI;

use tracing::{debug, warn};

use crate::domain::{FeatureBatch, FeatureVector, RawRecord, RawValue};
use crate::error::SchemaError;
use crate::schema::{
    self, CategoricalDomain, ColumnRole, FEATURE_COUNT, FEATURES, FeatureKind, ID_COLUMN, MONTH_COLUMN,
    UNKNOWN_INDEX,
};

/// Cyclical encoding of a `1..=12` month index.
pub fn encode_month(month: u32) -> (f64, f64) {
    let angle = 2.0 * PI * f64::from(month) / 12.0;
    (angle.sin(), angle.cos())
}

/// Transform a batch of raw records.
///
/// Out-of-vocabulary categories are counted on the returned batch and logged
/// once per batch.
pub fn transform(records: &[RawRecord]) -> Result<FeatureBatch, SchemaError> {
    let mut rows = Vec::with_capacity(records.len());
    let mut user_ids = Vec::with_capacity(records.len());
    let mut unknown_categories = 0usize;

    for (row, record) in records.iter().enumerate() {
        let (vector, unknown) = transform_record(record, row)?;
        rows.push(vector);
        unknown_categories += unknown;
        user_ids.push(match record.get(ID_COLUMN) {
            RawValue::Missing => None,
            value => Some(value.display()),
        });
    }

    if let Some(first) = records.first() {
        let ignored = ignored_columns(first);
        if !ignored.is_empty() {
            debug!(?ignored, "columns not used by the model");
        }
    }
    if unknown_categories > 0 {
        warn!(
            unknown_categories,
            rows = records.len(),
            "categorical values outside the trained domain were encoded as Unknown"
        );
    }

    Ok(FeatureBatch {
        columns: schema::feature_names().into_iter().map(str::to_string).collect(),
        rows,
        user_ids,
        unknown_categories,
    })
}

/// Columns of `record` the registry drops or does not know.
pub fn ignored_columns(record: &RawRecord) -> Vec<&str> {
    record
        .column_names()
        .filter(|name| matches!(schema::column_role(name), None | Some(ColumnRole::Drop)))
        .collect()
}

/// Transform one record. Returns the vector and its count of unknown categories.
pub fn transform_record(record: &RawRecord, row: usize) -> Result<(FeatureVector, usize), SchemaError> {
    let mut out = [0.0; FEATURE_COUNT];
    let mut unknown = 0usize;

    // Parsed lazily: only the two month features need it.
    let mut month: Option<(f64, f64)> = None;

    for (slot, feature) in out.iter_mut().zip(FEATURES.iter()) {
        *slot = match feature.kind {
            FeatureKind::Numeric { impute } => numeric_value(record, row, feature.name, impute)?,
            FeatureKind::Categorical(domain) => {
                let (idx, is_unknown) = categorical_index(record, row, feature.name, domain)?;
                unknown += usize::from(is_unknown);
                f64::from(idx)
            }
            FeatureKind::MonthSin | FeatureKind::MonthCos => {
                let (sin, cos) = match month {
                    Some(pair) => pair,
                    None => {
                        let pair = month_pair(record, row)?;
                        month = Some(pair);
                        pair
                    }
                };
                if matches!(feature.kind, FeatureKind::MonthSin) { sin } else { cos }
            }
        };
    }

    Ok((out, unknown))
}

fn numeric_value(
    record: &RawRecord,
    row: usize,
    field: &'static str,
    impute: Option<f64>,
) -> Result<f64, SchemaError> {
    match record.get(field) {
        RawValue::Missing => impute.ok_or(SchemaError::MissingField { row, field }),
        RawValue::Number(v) if v.is_finite() => Ok(*v),
        RawValue::Number(v) => Err(SchemaError::InvalidValue {
            row,
            field,
            value: v.to_string(),
            reason: "not a finite number",
        }),
        RawValue::Text(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(SchemaError::InvalidValue {
                row,
                field,
                value: s.clone(),
                reason: "expected a number",
            }),
        },
    }
}

fn categorical_index(
    record: &RawRecord,
    row: usize,
    field: &'static str,
    domain: &CategoricalDomain,
) -> Result<(u32, bool), SchemaError> {
    let value = record.get(field);
    if value.is_missing() {
        return if domain.impute_unknown {
            Ok((UNKNOWN_INDEX, false))
        } else {
            Err(SchemaError::MissingField { row, field })
        };
    }

    match domain.index_of(&value.display()) {
        Some(idx) => Ok((idx, false)),
        None => Ok((UNKNOWN_INDEX, true)),
    }
}

fn month_pair(record: &RawRecord, row: usize) -> Result<(f64, f64), SchemaError> {
    let value = record.get(MONTH_COLUMN);
    if value.is_missing() {
        return Err(SchemaError::MissingField {
            row,
            field: MONTH_COLUMN,
        });
    }
    let month = schema::month_index(value).ok_or_else(|| SchemaError::InvalidValue {
        row,
        field: MONTH_COLUMN,
        value: value.display(),
        reason: "expected a month name or a number in 1..=12",
    })?;
    Ok(encode_month(month))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::{DROPPED_COLUMNS, feature_names};

    /// A complete raw record with every column the registry knows.
    pub(crate) fn full_record() -> RawRecord {
        RawRecord::new()
            .with("User_ID", "U0001")
            .with("Policy_Cancelled_Post_Purchase", 0i64)
            .with("Policy_Start_Year", 2025i64)
            .with("Policy_Start_Week", 23i64)
            .with("Policy_Start_Day", 4i64)
            .with("Policy_Start_Month", "June")
            .with("Grace_Period_Extensions", 0i64)
            .with("Previous_Policy_Duration_Months", 12i64)
            .with("Adult_Dependents", 1i64)
            .with("Child_Dependents", 1i64)
            .with("Infant_Dependents", 0i64)
            .with("Existing_Policyholder", 1i64)
            .with("Previous_Claims_Filed", 0i64)
            .with("Years_Without_Claims", 5i64)
            .with("Policy_Amendments_Count", 0i64)
            .with("Underwriting_Processing_Days", 5i64)
            .with("Vehicles_on_Policy", 2i64)
            .with("Custom_Riders_Requested", 0i64)
            .with("Broker_Agency_Type", "Direct")
            .with("Deductible_Tier", "Medium")
            .with("Acquisition_Channel", "Online")
            .with("Payment_Schedule", "Monthly")
            .with("Employment_Status", "Employed")
            .with("Estimated_Annual_Income", 75_000.0)
            .with("Days_Since_Quote", 3i64)
            .with("Employer_ID", "E-17")
            .with("Broker_ID", 88i64)
            .with("Region_Code", "NW")
    }

    fn position(name: &str) -> usize {
        feature_names().iter().position(|n| *n == name).unwrap()
    }

    #[test]
    fn month_encoding_lies_on_the_unit_circle() {
        for m in 1..=12 {
            let (s, c) = encode_month(m);
            assert!((s * s + c * c - 1.0).abs() < 1e-12, "month {m}");
        }
    }

    #[test]
    fn december_is_closer_to_january_than_june_is() {
        let dist = |a: u32, b: u32| {
            let (sa, ca) = encode_month(a);
            let (sb, cb) = encode_month(b);
            ((sa - sb).powi(2) + (ca - cb).powi(2)).sqrt()
        };
        assert!(dist(12, 1) < dist(1, 6));
    }

    #[test]
    fn output_has_registry_width_and_order() {
        let batch = transform(&[full_record()]).unwrap();
        assert_eq!(batch.columns, feature_names());
        assert_eq!(batch.rows[0].len(), FEATURE_COUNT);
        assert_eq!(batch.rows[0][position("Estimated_Annual_Income")], 75_000.0);
        assert_eq!(batch.rows[0][position("Employment_Status")], 1.0);
        assert_eq!(batch.user_ids, vec![Some("U0001".to_string())]);
    }

    #[test]
    fn transform_is_deterministic() {
        let records = vec![full_record(), full_record().with("Policy_Start_Month", 12i64)];
        let a = transform(&records).unwrap();
        let b = transform(&records).unwrap();
        assert_eq!(a, b);
        for (x, y) in a.rows.iter().flatten().zip(b.rows.iter().flatten()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn dropped_and_extra_columns_do_not_change_output() {
        let mut stripped = full_record();
        for col in DROPPED_COLUMNS {
            stripped.remove(col);
        }
        let noisy = full_record().with("Favourite_Colour", "teal").with("Region_Code", 999i64);

        let base = transform(&[full_record()]).unwrap();
        assert_eq!(transform(&[stripped]).unwrap().rows, base.rows);
        assert_eq!(transform(&[noisy]).unwrap().rows, base.rows);
    }

    #[test]
    fn ignored_columns_are_dropped_or_unknown_ones() {
        let record = full_record().with("Favourite_Colour", "teal");
        assert_eq!(
            ignored_columns(&record),
            vec!["broker_id", "employer_id", "favourite_colour", "region_code"]
        );
        assert!(ignored_columns(&full_record().with("User_ID", "U9")).iter().all(|c| *c != "user_id"));
    }

    #[test]
    fn imputable_fields_get_defaults() {
        let mut record = full_record();
        record.remove("Child_Dependents");
        record.insert("Deductible_Tier", RawValue::Missing);
        record.remove("Acquisition_Channel");

        let batch = transform(&[record]).unwrap();
        let row = batch.rows[0];
        assert_eq!(row[position("Child_Dependents")], 0.0);
        assert_eq!(row[position("Deductible_Tier")], f64::from(UNKNOWN_INDEX));
        assert_eq!(row[position("Acquisition_Channel")], f64::from(UNKNOWN_INDEX));
        // Imputed cells are not out-of-vocabulary.
        assert_eq!(batch.unknown_categories, 0);
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let mut record = full_record();
        record.remove("Employment_Status");
        let err = transform(&[full_record(), record]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                row: 1,
                field: "Employment_Status"
            }
        );

        let mut no_month = full_record();
        no_month.remove("Policy_Start_Month");
        assert!(matches!(
            transform(&[no_month]),
            Err(SchemaError::MissingField { field: MONTH_COLUMN, .. })
        ));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let record = full_record().with("Vehicles_on_Policy", "two");
        assert!(matches!(
            transform(&[record]),
            Err(SchemaError::InvalidValue { field: "Vehicles_on_Policy", .. })
        ));

        let record = full_record().with("Policy_Start_Month", "Smarch");
        assert!(matches!(
            transform(&[record]),
            Err(SchemaError::InvalidValue { field: MONTH_COLUMN, .. })
        ));
    }

    #[test]
    fn out_of_vocabulary_category_maps_to_unknown() {
        let record = full_record().with("Employment_Status", "Astronaut");
        let batch = transform(&[record]).unwrap();
        assert_eq!(batch.rows[0][position("Employment_Status")], f64::from(UNKNOWN_INDEX));
        assert_eq!(batch.unknown_categories, 1);
    }

    #[test]
    fn numeric_text_cells_are_accepted() {
        let record = full_record().with("Vehicles_on_Policy", " 3 ");
        let batch = transform(&[record]).unwrap();
        assert_eq!(batch.rows[0][position("Vehicles_on_Policy")], 3.0);
    }
}
