//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw input rows (`RawRecord`, `RawValue`)
//! - engineered features (`FeatureVector`, `FeatureBatch`)
//! - labels and predictions (`ClassLabel`, `Prediction`)
//! - training configuration (`TrainConfig`, `BoosterParams`, `BalanceConfig`)

pub mod types;

pub use types::*;
