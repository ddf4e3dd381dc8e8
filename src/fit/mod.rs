//! Training orchestration.
//!
//! Responsibilities:
//!
//! - stratified fold assignment
//! - per-fold boosting with early stopping (parallel)
//! - choosing the final round count and refitting on all rows
//! - macro-F1 reporting

pub mod folds;
pub mod metrics;
pub mod trainer;

pub use folds::*;
pub use metrics::*;
pub use trainer::*;
