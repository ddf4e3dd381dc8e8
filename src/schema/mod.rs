//! The schema registry: column names, categorical domains, feature order.
//!
//! Everything that needs to agree between training and serving lives here as
//! frozen `static` tables. The feature transform reads these tables instead of
//! hardcoding names, and `SchemaSnapshot` records them inside every model
//! artifact so a loaded model can be checked against the running build.
//!
//! Conventions:
//! - categorical domains reserve index `0` for the `Unknown` sentinel
//! - months are indexed `1 = January ... 12 = December`

use serde::{Deserialize, Serialize};

use crate::domain::{ClassLabel, RawValue, normalize_column_name};

/// Bumped whenever the feature order, a domain, or an encoding rule changes.
pub const SCHEMA_VERSION: &str = "bundle-schema/1";

pub const TARGET_COLUMN: &str = "Purchased_Coverage_Bundle";
pub const ID_COLUMN: &str = "User_ID";
pub const MONTH_COLUMN: &str = "Policy_Start_Month";

pub const UNKNOWN_CATEGORY: &str = "Unknown";
pub const UNKNOWN_INDEX: u32 = 0;

pub const FEATURE_COUNT: usize = 25;

/// Size of the historical label space (`0..=9`).
pub const LABEL_SPACE: usize = 10;

/// Highest bundle a model may be trained on or serve (`0..=7`).
pub const MAX_SERVING_LABEL: ClassLabel = 7;

pub const MONTH_CONVENTION: &str = "1=January..12=December";

/// Columns present in the raw data that never reach the model.
pub const DROPPED_COLUMNS: [&str; 3] = ["Employer_ID", "Broker_ID", "Region_Code"];

/// An enumerated categorical domain.
#[derive(Debug)]
pub struct CategoricalDomain {
    /// Index `i` encodes `values[i]`; `values[0]` is always `Unknown`.
    pub values: &'static [&'static str],
    /// Whether a missing cell is imputed as `Unknown` (otherwise it is an error).
    pub impute_unknown: bool,
}

impl CategoricalDomain {
    /// Encode a raw category.
    ///
    /// Returns `None` when the value is outside the domain; callers map that to
    /// `UNKNOWN_INDEX`. Matching is exact (after trimming).
    pub fn index_of(&self, value: &str) -> Option<u32> {
        let value = value.trim();
        self.values
            .iter()
            .position(|v| *v == value)
            .map(|idx| idx as u32)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub static BROKER_AGENCY_TYPE: CategoricalDomain = CategoricalDomain {
    values: &[UNKNOWN_CATEGORY, "Direct", "Independent", "National_Corporate", "Urban_Boutique"],
    impute_unknown: false,
};

pub static DEDUCTIBLE_TIER: CategoricalDomain = CategoricalDomain {
    values: &[UNKNOWN_CATEGORY, "Low", "Medium", "High"],
    impute_unknown: true,
};

pub static ACQUISITION_CHANNEL: CategoricalDomain = CategoricalDomain {
    values: &[UNKNOWN_CATEGORY, "Online", "Agent", "Broker", "Phone", "Referral"],
    impute_unknown: true,
};

pub static PAYMENT_SCHEDULE: CategoricalDomain = CategoricalDomain {
    values: &[UNKNOWN_CATEGORY, "Monthly", "Quarterly", "Semi_Annual", "Annual"],
    impute_unknown: false,
};

pub static EMPLOYMENT_STATUS: CategoricalDomain = CategoricalDomain {
    values: &[UNKNOWN_CATEGORY, "Employed", "Self-Employed", "Retired", "Unemployed", "Student"],
    impute_unknown: false,
};

/// How a feature is derived from the raw record.
#[derive(Debug)]
pub enum FeatureKind {
    /// Copied from the raw column of the same name; `impute` fills missing cells.
    Numeric { impute: Option<f64> },
    /// Encoded against a domain; the raw column has the same name.
    Categorical(&'static CategoricalDomain),
    /// `sin(2π·m/12)` of the start month.
    MonthSin,
    /// `cos(2π·m/12)` of the start month.
    MonthCos,
}

#[derive(Debug)]
pub struct FeatureDef {
    pub name: &'static str,
    pub kind: FeatureKind,
}

impl FeatureDef {
    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FeatureKind::Categorical(_))
    }
}

const fn numeric(name: &'static str) -> FeatureDef {
    FeatureDef {
        name,
        kind: FeatureKind::Numeric { impute: None },
    }
}

/// The model's feature order. Never reordered within a schema version.
pub static FEATURES: [FeatureDef; FEATURE_COUNT] = [
    numeric("Policy_Cancelled_Post_Purchase"),
    numeric("Policy_Start_Year"),
    numeric("Policy_Start_Week"),
    numeric("Policy_Start_Day"),
    numeric("Grace_Period_Extensions"),
    numeric("Previous_Policy_Duration_Months"),
    numeric("Adult_Dependents"),
    FeatureDef {
        name: "Child_Dependents",
        kind: FeatureKind::Numeric { impute: Some(0.0) },
    },
    numeric("Infant_Dependents"),
    numeric("Existing_Policyholder"),
    numeric("Previous_Claims_Filed"),
    numeric("Years_Without_Claims"),
    numeric("Policy_Amendments_Count"),
    numeric("Underwriting_Processing_Days"),
    numeric("Vehicles_on_Policy"),
    numeric("Custom_Riders_Requested"),
    FeatureDef {
        name: "Broker_Agency_Type",
        kind: FeatureKind::Categorical(&BROKER_AGENCY_TYPE),
    },
    FeatureDef {
        name: "Deductible_Tier",
        kind: FeatureKind::Categorical(&DEDUCTIBLE_TIER),
    },
    FeatureDef {
        name: "Acquisition_Channel",
        kind: FeatureKind::Categorical(&ACQUISITION_CHANNEL),
    },
    FeatureDef {
        name: "Payment_Schedule",
        kind: FeatureKind::Categorical(&PAYMENT_SCHEDULE),
    },
    FeatureDef {
        name: "Employment_Status",
        kind: FeatureKind::Categorical(&EMPLOYMENT_STATUS),
    },
    numeric("Estimated_Annual_Income"),
    numeric("Days_Since_Quote"),
    FeatureDef {
        name: "month_sin",
        kind: FeatureKind::MonthSin,
    },
    FeatureDef {
        name: "month_cos",
        kind: FeatureKind::MonthCos,
    },
];

/// What happens to a raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Identifier,
    Drop,
    Numeric,
    Categorical,
    /// Replaced by derived features (the start month).
    Derived,
    Target,
}

/// Role of a raw column, or `None` for columns the registry does not know.
pub fn column_role(name: &str) -> Option<ColumnRole> {
    let key = normalize_column_name(name);
    let is = |candidate: &str| normalize_column_name(candidate) == key;

    if is(ID_COLUMN) {
        return Some(ColumnRole::Identifier);
    }
    if is(TARGET_COLUMN) {
        return Some(ColumnRole::Target);
    }
    if is(MONTH_COLUMN) {
        return Some(ColumnRole::Derived);
    }
    if DROPPED_COLUMNS.iter().any(|c| is(*c)) {
        return Some(ColumnRole::Drop);
    }
    FEATURES.iter().find(|f| is(f.name)).and_then(|f| match f.kind {
        FeatureKind::Numeric { .. } => Some(ColumnRole::Numeric),
        FeatureKind::Categorical(_) => Some(ColumnRole::Categorical),
        FeatureKind::MonthSin | FeatureKind::MonthCos => None,
    })
}

/// The raw columns the registry recognizes, in a stable order.
pub fn raw_columns() -> Vec<&'static str> {
    let mut out = vec![ID_COLUMN];
    out.extend(
        FEATURES
            .iter()
            .filter(|f| matches!(f.kind, FeatureKind::Numeric { .. } | FeatureKind::Categorical(_)))
            .map(|f| f.name),
    );
    out.push(MONTH_COLUMN);
    out.extend(DROPPED_COLUMNS);
    out
}

/// Raw columns that must be present (no imputation default exists for them).
pub fn required_columns() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = FEATURES
        .iter()
        .filter(|f| match f.kind {
            FeatureKind::Numeric { impute } => impute.is_none(),
            FeatureKind::Categorical(domain) => !domain.impute_unknown,
            FeatureKind::MonthSin | FeatureKind::MonthCos => false,
        })
        .map(|f| f.name)
        .collect();
    out.push(MONTH_COLUMN);
    out
}

pub fn feature_names() -> Vec<&'static str> {
    FEATURES.iter().map(|f| f.name).collect()
}

/// Mask of categorical positions in the feature order.
pub fn categorical_mask() -> [bool; FEATURE_COUNT] {
    let mut mask = [false; FEATURE_COUNT];
    for (slot, feature) in mask.iter_mut().zip(FEATURES.iter()) {
        *slot = feature.is_categorical();
    }
    mask
}

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Resolve a raw month cell to its `1..=12` index.
///
/// Accepts integral numbers (also when given as text, e.g. `"12.0"`), full
/// English names and abbreviations of at least three letters such as `Sep`
/// or `Sept` (case-insensitive). Returns `None` for anything else, including
/// missing.
pub fn month_index(value: &RawValue) -> Option<u32> {
    match value {
        RawValue::Missing => None,
        RawValue::Number(v) => month_from_number(*v),
        RawValue::Text(s) => {
            let s = s.trim().to_ascii_lowercase();
            if let Ok(v) = s.parse::<f64>() {
                return month_from_number(v);
            }
            if s.len() < 3 {
                return None;
            }
            MONTH_NAMES
                .iter()
                .position(|name| name.starts_with(s.as_str()))
                .map(|idx| idx as u32 + 1)
        }
    }
}

fn month_from_number(v: f64) -> Option<u32> {
    (v.fract() == 0.0 && (1.0..=12.0).contains(&v)).then_some(v as u32)
}

/// Serializable copy of a categorical domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    pub feature: String,
    pub values: Vec<String>,
    pub unknown_index: u32,
}

/// The registry contents a model was trained against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub version: String,
    pub features: Vec<String>,
    pub categorical: Vec<DomainSnapshot>,
    pub month_convention: String,
}

impl SchemaSnapshot {
    /// Snapshot of the registry compiled into this build.
    pub fn current() -> Self {
        let categorical = FEATURES
            .iter()
            .filter_map(|f| match f.kind {
                FeatureKind::Categorical(domain) => Some(DomainSnapshot {
                    feature: f.name.to_string(),
                    values: domain.values.iter().map(|v| v.to_string()).collect(),
                    unknown_index: UNKNOWN_INDEX,
                }),
                _ => None,
            })
            .collect();

        Self {
            version: SCHEMA_VERSION.to_string(),
            features: feature_names().into_iter().map(str::to_string).collect(),
            categorical,
            month_convention: MONTH_CONVENTION.to_string(),
        }
    }

    /// Check that a recorded snapshot matches this build's registry exactly.
    ///
    /// Returns a description of the first difference found.
    pub fn check_compatible(&self, other: &SchemaSnapshot) -> Result<(), String> {
        if self.version != other.version {
            return Err(format!(
                "schema version '{}' != '{}'",
                other.version, self.version
            ));
        }
        if self.features != other.features {
            return Err(format!(
                "feature order differs (artifact has {} features, registry has {})",
                other.features.len(),
                self.features.len()
            ));
        }
        if self.month_convention != other.month_convention {
            return Err("month convention differs".to_string());
        }
        for (ours, theirs) in self.categorical.iter().zip(other.categorical.iter()) {
            if ours != theirs {
                return Err(format!("categorical domain for `{}` differs", ours.feature));
            }
        }
        if self.categorical.len() != other.categorical.len() {
            return Err("number of categorical features differs".to_string());
        }
        Ok(())
    }
}
