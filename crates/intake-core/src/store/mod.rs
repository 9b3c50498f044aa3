//! Persistence for the staged generation and the typed projection tables.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{NewRawRequest, Projection, RawRequest, RequestType};

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Swaps the staged generation for `records` in one step. On error the
    /// previous generation is still in place. Returns the number of rows staged.
    async fn replace_all(&self, records: &[NewRawRequest]) -> Result<u64, StoreError>;

    /// Current generation in ascending `request_id` order.
    async fn list_all(&self) -> Result<Vec<RawRequest>, StoreError>;

    /// Appends one row to the projection's typed table and returns its id.
    async fn insert_projection(&self, projection: &Projection) -> Result<i64, StoreError>;

    async fn count_projections(&self, request_type: RequestType) -> Result<u64, StoreError>;

    /// Blocks until no other upload holds the writer lock.
    async fn lock_uploads(&self) -> Result<UploadGuard, StoreError>;
}

/// Held for the duration of one upload. Dropping it releases the lock too;
/// `release` only surfaces errors the drop path would log.
pub struct UploadGuard {
    inner: GuardKind,
}

enum GuardKind {
    Local(tokio::sync::OwnedMutexGuard<()>),
    // Field order matters: the advisory lock is released before the local
    // mutex lets the next in-process upload through.
    Advisory {
        lock: postgres::AdvisoryLock,
        local: tokio::sync::OwnedMutexGuard<()>,
    },
}

impl UploadGuard {
    pub async fn release(self) -> Result<(), StoreError> {
        match self.inner {
            GuardKind::Local(guard) => {
                drop(guard);
                Ok(())
            }
            GuardKind::Advisory { lock, local } => {
                let released = lock.release().await;
                drop(local);
                released
            }
        }
    }
}

impl std::fmt::Debug for UploadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            GuardKind::Local(_) => "local",
            GuardKind::Advisory { .. } => "advisory",
        };
        f.debug_struct("UploadGuard").field("kind", &kind).finish()
    }
}
