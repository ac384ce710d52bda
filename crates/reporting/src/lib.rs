//! Report job domain module.
//!
//! This crate contains the rules of the report pipeline as deterministic domain
//! logic (no IO, no HTTP, no storage): what a report job is, which states it may
//! move through, how criteria are validated, and how artifacts are named.

pub mod artifact;
pub mod criteria;
pub mod job;
pub mod report_type;
pub mod result_set;

pub use artifact::ArtifactName;
pub use criteria::ReportCriteria;
pub use job::{
    truncate_error_message, JobOutcome, JobStatus, NewReportJob, ReportJob, ReportJobParts,
    DEFAULT_MAX_ERROR_LEN,
};
pub use report_type::ReportType;
pub use result_set::{ReportBody, ResultSet, Row};
