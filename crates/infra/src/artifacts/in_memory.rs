use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use minerep_reporting::ArtifactName;

use super::{ArtifactStore, ArtifactStoreError};

/// In-memory artifact store for tests/dev. Writes can be made to fail.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<ArtifactName, Vec<u8>>>,
    reject_writes: AtomicBool,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn publish(&self, name: &ArtifactName, body: &[u8]) -> Result<(), ArtifactStoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(ArtifactStoreError::Rejected(format!("{name}: disk full")));
        }
        self.artifacts
            .write()
            .unwrap()
            .insert(name.clone(), body.to_vec());
        Ok(())
    }

    async fn read(&self, name: &ArtifactName) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        Ok(self.artifacts.read().unwrap().get(name).cloned())
    }
}
