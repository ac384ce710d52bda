//! Completed report artifacts.

pub mod in_memory;
pub mod local;

use async_trait::async_trait;
use tracing::warn;

use minerep_reporting::ArtifactName;

pub use in_memory::InMemoryArtifactStore;
pub use local::LocalArtifactStore;

/// Write-then-publish storage for report bodies.
///
/// `publish` is all-or-nothing: until it returns `Ok`, `read` for that name
/// sees either nothing or a previous complete body, never a partial write.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn publish(&self, name: &ArtifactName, body: &[u8]) -> Result<(), ArtifactStoreError>;

    /// `Ok(None)` when no artifact has been published under `name`.
    async fn read(&self, name: &ArtifactName) -> Result<Option<Vec<u8>>, ArtifactStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactStoreError {
    /// The display form names the action and the error kind only; `path` is
    /// for logs and never reaches a job's stored message.
    #[error("failed to {action}: {}", .source.kind())]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact store rejected write: {0}")]
    Rejected(String),
}

impl ArtifactStoreError {
    pub(crate) fn io(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        warn!(action, path = %path.display(), error = %source, "artifact store io failure");
        Self::Io {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}
