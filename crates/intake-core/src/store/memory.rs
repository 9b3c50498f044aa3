use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{GuardKind, RequestRepository, UploadGuard};
use crate::error::StoreError;
use crate::model::{NewRawRequest, Projection, RawRequest, RequestType};

#[derive(Debug)]
struct Staging {
    rows: Vec<RawRequest>,
    next_id: i64,
}

/// Process-local repository enforcing the same constraints as the Postgres
/// schema. Backs the test suites and `serve --in-memory`.
#[derive(Debug)]
pub struct MemoryRepository {
    staging: RwLock<Staging>,
    projections: RwLock<Vec<Projection>>,
    uploads: Arc<Mutex<()>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            staging: RwLock::new(Staging {
                rows: Vec::new(),
                next_id: 1,
            }),
            projections: RwLock::new(Vec::new()),
            uploads: Arc::new(Mutex::new(())),
        }
    }

    /// Every projection row appended so far, in insertion order.
    pub async fn projections(&self) -> Vec<Projection> {
        self.projections.read().await.clone()
    }
}

#[async_trait]
impl RequestRepository for MemoryRepository {
    async fn replace_all(&self, records: &[NewRawRequest]) -> Result<u64, StoreError> {
        let mut checked = Vec::with_capacity(records.len());
        for record in records {
            let (request_type, request_status) =
                record.check_constraints().map_err(StoreError::Constraint)?;
            checked.push((request_type, request_status, record.request_data.clone()));
        }

        let mut staging = self.staging.write().await;
        let mut next_id = staging.next_id;
        let rows: Vec<RawRequest> = checked
            .into_iter()
            .map(|(request_type, request_status, request_data)| {
                let row = RawRequest {
                    request_id: next_id,
                    request_type,
                    request_status,
                    request_data,
                };
                next_id += 1;
                row
            })
            .collect();

        staging.rows = rows;
        staging.next_id = next_id;
        Ok(staging.rows.len() as u64)
    }

    async fn list_all(&self) -> Result<Vec<RawRequest>, StoreError> {
        Ok(self.staging.read().await.rows.clone())
    }

    async fn insert_projection(&self, projection: &Projection) -> Result<i64, StoreError> {
        let mut projections = self.projections.write().await;
        projections.push(projection.clone());
        let id = projections
            .iter()
            .filter(|row| row.request_type() == projection.request_type())
            .count();
        Ok(id as i64)
    }

    async fn count_projections(&self, request_type: RequestType) -> Result<u64, StoreError> {
        let projections = self.projections.read().await;
        let count = projections
            .iter()
            .filter(|row| row.request_type() == request_type)
            .count();
        Ok(count as u64)
    }

    async fn lock_uploads(&self) -> Result<UploadGuard, StoreError> {
        let guard = Arc::clone(&self.uploads).lock_owned().await;
        Ok(UploadGuard {
            inner: GuardKind::Local(guard),
        })
    }
}
