//! Report job records and their background execution.

pub mod dispatcher;
pub mod postgres;
pub mod retry;
pub mod store;

pub use dispatcher::{
    DispatchError, DispatcherConfig, DispatcherHandle, DispatcherStats, JobDispatcher,
};
pub use postgres::PostgresJobRecordStore;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use store::{InMemoryJobRecordStore, JobRecordStore, JobStoreError};

use chrono::Utc;
use tracing::{info, warn};

/// Message recorded on jobs that were still running when the process stopped.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by server restart";

/// Fail jobs orphaned by a previous process. Call before the dispatcher starts.
pub async fn recover_orphaned(store: &dyn JobRecordStore) -> Result<u64, JobStoreError> {
    let failed = store.fail_orphaned(INTERRUPTED_MESSAGE, Utc::now()).await?;
    if failed > 0 {
        warn!(jobs = failed, "failed report jobs orphaned by previous run");
    } else {
        info!("no orphaned report jobs");
    }
    Ok(failed)
}
