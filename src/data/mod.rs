//! Synthetic datasets for demos and end-to-end tests.

pub mod sample;

pub use sample::{SampleConfig, SampleData, generate_sample, write_sample_csv};
