use axum::Router;

pub mod common;
pub mod reports;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new().nest("/reports", reports::router())
}
