//! Input/output helpers.
//!
//! - CSV ingest + row validation (`ingest`)
//! - model artifact JSON read/write (`artifact`)
//! - prediction CSV export (`export`)

pub mod artifact;
pub mod export;
pub mod ingest;

pub use artifact::*;
pub use export::*;
pub use ingest::*;
