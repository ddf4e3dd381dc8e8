//! `bundle-predictor` library crate.
//!
//! The binary (`bundle`) is a thin wrapper around this library so that:
//!
//! - training and serving are testable without spawning processes
//! - the serving contract (`inference`) can be embedded elsewhere
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod balance;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod fit;
pub mod inference;
pub mod intake;
pub mod io;
pub mod models;
pub mod report;
pub mod schema;
