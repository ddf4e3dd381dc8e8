//! Gradient-boosted tree classifier.
//!
//! Training works on a binned copy of the feature matrix; the fitted
//! [`Ensemble`] only needs raw feature vectors, so serving never sees bins.

pub mod binning;
pub mod booster;
pub mod early_stopping;
pub mod grower;
pub mod tree;

pub use booster::{BoostOutcome, ClassifierTrainer, Ensemble, GbdtTrainer, TrainingSet, ValidationSet};
pub use tree::Tree;
