use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use tokio::sync::Mutex;
use tokio::task;

use super::{GuardKind, RequestRepository, UploadGuard};
use crate::db::DbPool;
use crate::error::StoreError;
use crate::model::{NewRawRequest, Projection, RawRequest, RequestType};

const UPLOAD_LOCK_KEY: i64 = 0x494E54414B45; // "INTAKE"

// Three binds per row; Postgres caps a statement at 65535 parameters.
const INSERT_CHUNK_ROWS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: DbPool,
    // Waiters queue here rather than each parking a pooled connection in
    // pg_advisory_lock.
    local_lock: Arc<Mutex<()>>,
}

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            local_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl RequestRepository for PgRepository {
    async fn replace_all(&self, records: &[NewRawRequest]) -> Result<u64, StoreError> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM staged_requests")
            .execute(&mut *db_tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO staged_requests (request_type, request_status, request_data) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.request_type)
                    .push_bind(record.request_status)
                    .push_bind(record.request_data.as_deref());
            });

            let result = builder
                .build()
                .execute(&mut *db_tx)
                .await
                .map_err(StoreError::from_sqlx)?;
            inserted += result.rows_affected();
        }

        db_tx.commit().await?;
        Ok(inserted)
    }

    async fn list_all(&self) -> Result<Vec<RawRequest>, StoreError> {
        let rows = sqlx::query_as::<_, RawRequest>(
            r#"
                SELECT request_id, request_type, request_status, request_data
                FROM staged_requests
                ORDER BY request_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_projection(&self, projection: &Projection) -> Result<i64, StoreError> {
        let query = match projection {
            Projection::NewLicense(row) => sqlx::query_scalar::<_, i64>(
                r#"
                    INSERT INTO new_license_requests (
                        source_request_id, company_name, licence_type, is_office,
                        office_name, office_service_number, request_date, activities
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING projection_id
                "#,
            )
            .bind(row.source_request_id)
            .bind(&row.company_name)
            .bind(&row.licence_type)
            .bind(row.is_office)
            .bind(&row.office_name)
            .bind(&row.office_service_number)
            .bind(&row.request_date)
            .bind(&row.activities),
            Projection::AccountRequest(row) => sqlx::query_scalar::<_, i64>(
                r#"
                    INSERT INTO account_requests (
                        source_request_id, company_name, requester_name, applicant_name,
                        user_name, contact_email, permissions
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING projection_id
                "#,
            )
            .bind(row.source_request_id)
            .bind(&row.company_name)
            .bind(&row.requester_name)
            .bind(&row.applicant_name)
            .bind(&row.user_name)
            .bind(&row.contact_email)
            .bind(&row.permissions),
            Projection::InspectionRequest(row) => sqlx::query_scalar::<_, i64>(
                r#"
                    INSERT INTO inspection_requests (
                        source_request_id, company_name, inspection_date,
                        inspection_time, inspection_type
                    ) VALUES ($1, $2, $3, $4, $5)
                    RETURNING projection_id
                "#,
            )
            .bind(row.source_request_id)
            .bind(&row.company_name)
            .bind(&row.inspection_date)
            .bind(&row.inspection_time)
            .bind(&row.inspection_type),
            Projection::AddActivity(row) => sqlx::query_scalar::<_, i64>(
                r#"
                    INSERT INTO add_activity_requests (
                        source_request_id, company_name, licence_id, activities
                    ) VALUES ($1, $2, $3, $4)
                    RETURNING projection_id
                "#,
            )
            .bind(row.source_request_id)
            .bind(&row.company_name)
            .bind(&row.licence_id)
            .bind(&row.activities),
            Projection::StampLicense(row) => sqlx::query_scalar::<_, i64>(
                r#"
                    INSERT INTO stamp_license_requests (
                        source_request_id, company_name, licence_id, request_date
                    ) VALUES ($1, $2, $3, $4)
                    RETURNING projection_id
                "#,
            )
            .bind(row.source_request_id)
            .bind(&row.company_name)
            .bind(&row.licence_id)
            .bind(&row.request_date),
        };

        query
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn count_projections(&self, request_type: RequestType) -> Result<u64, StoreError> {
        // table_name() only yields fixed identifiers, never user input.
        let sql = format!("SELECT COUNT(*) FROM {}", request_type.table_name());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn lock_uploads(&self) -> Result<UploadGuard, StoreError> {
        let local = self.local_lock.clone().lock_owned().await;
        let lock = AdvisoryLock::acquire(&self.pool, UPLOAD_LOCK_KEY).await?;
        Ok(UploadGuard {
            inner: GuardKind::Advisory { lock, local },
        })
    }
}

/// Session-level advisory lock pinned to one pooled connection, so uploads in
/// separate processes sharing the database also run one at a time.
pub(crate) struct AdvisoryLock {
    conn: Option<sqlx::pool::PoolConnection<Postgres>>,
    key: i64,
}

impl AdvisoryLock {
    async fn acquire(pool: &DbPool, key: i64) -> Result<Self, StoreError> {
        let mut conn = pool.acquire().await?;
        sqlx::query::<Postgres>("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(conn.as_mut())
            .await?;
        Ok(Self {
            conn: Some(conn),
            key,
        })
    }

    pub(crate) async fn release(mut self) -> Result<(), StoreError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query::<Postgres>("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .execute(conn.as_mut())
                .await?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let key = self.key;
            task::spawn(async move {
                if let Err(err) = sqlx::query::<Postgres>("SELECT pg_advisory_unlock($1)")
                    .bind(key)
                    .execute(conn.as_mut())
                    .await
                {
                    tracing::warn!("failed to release upload lock in drop: {err}");
                }
            });
        }
    }
}
