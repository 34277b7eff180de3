#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial deduplication engine for backfilling pending addresses.
//!
//! Records whose address still points at the placeholder are snapped onto
//! a fixed-size coordinate grid ([`grid`]), grouped by cell
//! ([`cluster`]), and resolved once per cell ([`planner`]):
//!
//! 1. **Reuse**: the cell already holds a previously resolved address in
//!    the [`catalog`]. No external call.
//! 2. **Lookup**: one reverse-geocoding call using the first record's raw
//!    coordinate. The result is stored at the cell's snapped coordinate and
//!    registered in the catalog.
//!
//! The resolved address is then written onto every record of the cell
//! ([`fanout`]). [`run::run`] sequences the phases and their transaction
//! boundaries and produces a [`report::RunReport`].

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod fanout;
pub mod grid;
pub mod planner;
pub mod progress;
pub mod report;
pub mod run;

#[cfg(test)]
mod test_support;

use geofill_database::DbError;
use thiserror::Error;

pub use config::DedupConfig;
pub use report::RunReport;
pub use run::run;

/// Errors that abort a deduplication run.
///
/// Provider failures are not represented here; they only fail the cluster
/// they occurred in.
#[derive(Debug, Error)]
pub enum DedupError {
    /// Invalid or missing operating parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Store read or write failed.
    #[error(transparent)]
    Database(#[from] DbError),
}
