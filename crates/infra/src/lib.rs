//! Infrastructure layer: config, database, job records, report execution,
//! artifact storage, and the background dispatcher.

pub mod artifacts;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod reports;

pub use error::ReportError;
