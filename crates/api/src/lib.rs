//! HTTP API: report submission, status and download endpoints.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
