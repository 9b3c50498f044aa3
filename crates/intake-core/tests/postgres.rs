use std::env;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use intake_core::error::{IntakeError, StoreError};
use intake_core::model::RequestType;
use intake_core::store::{PgRepository, RequestRepository};
use intake_core::{db, IngestPipeline};

const UPLOAD: &str = concat!(
    "RequestType,RequestStatus,RequestData\n",
    "1,1,\"{\"\"CompanyName\"\":\"\"Acme\"\",\"\"IsOffice\"\":true,\"\"Activities\"\":[\"\"Retail\"\"]}\"\n",
    "3,2,\"{\"\"CompanyName\"\":\"\"Acme\"\",\"\"InspectionDate\"\":\"\"2024-01-01\"\"}\"\n",
);

// Both tests truncate the same tables.
static DATABASE: Mutex<()> = Mutex::new(());

fn exclusive_database() -> MutexGuard<'static, ()> {
    DATABASE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn reset_tables(pool: &db::DbPool) -> Result<()> {
    sqlx::query(
        "TRUNCATE TABLE staged_requests, new_license_requests, account_requests, inspection_requests, add_activity_requests, stamp_license_requests",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::test]
async fn postgres_replace_and_dispatch_roundtrip() -> Result<()> {
    let database_url = match env::var("INTAKE_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping postgres_replace_and_dispatch_roundtrip because INTAKE_TEST_DATABASE_URL is not set"
            );
            return Ok(());
        }
    };

    let _database = exclusive_database();
    let pool = db::connect(&database_url, 5).await?;
    db::run_migrations(&pool).await?;
    reset_tables(&pool).await?;

    let repository = Arc::new(PgRepository::new(pool.clone()));
    let pipeline = IngestPipeline::new(repository.clone());

    let first = pipeline.ingest(UPLOAD.as_bytes()).await?;
    assert_eq!(first.statistics.total_records, 2);
    assert_eq!(first.statistics.new_license_requests, 1);
    assert_eq!(first.statistics.inspection_requests, 1);
    assert_eq!(first.dispatch.dispatched, 2);

    let company: Option<String> = sqlx::query_scalar(
        "SELECT company_name FROM new_license_requests ORDER BY projection_id LIMIT 1",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(company.as_deref(), Some("Acme"));

    let activities: Option<String> = sqlx::query_scalar(
        "SELECT activities FROM new_license_requests ORDER BY projection_id LIMIT 1",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(activities.as_deref(), Some(r#"["Retail"]"#));

    let first_max_id = repository
        .list_all()
        .await?
        .iter()
        .map(|row| row.request_id)
        .max()
        .unwrap_or_default();

    pipeline.ingest(UPLOAD.as_bytes()).await?;

    let staged = repository.list_all().await?;
    assert_eq!(staged.len(), 2);
    assert!(staged.iter().all(|row| row.request_id > first_max_id));
    assert_eq!(
        repository.count_projections(RequestType::NewLicense).await?,
        2
    );
    assert_eq!(
        repository
            .count_projections(RequestType::InspectionRequest)
            .await?,
        2
    );

    let rejected = format!("{}6,1,\"{{}}\"\n", UPLOAD);
    let err = pipeline.ingest(rejected.as_bytes()).await.unwrap_err();
    assert!(matches!(
        err,
        IntakeError::StoreReplace(StoreError::Constraint(_))
    ));
    assert_eq!(repository.list_all().await?, staged);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_queue_on_a_small_pool() -> Result<()> {
    let database_url = match env::var("INTAKE_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping concurrent_uploads_queue_on_a_small_pool because INTAKE_TEST_DATABASE_URL is not set"
            );
            return Ok(());
        }
    };

    let _database = exclusive_database();
    // Clamped up to db::MIN_CONNECTIONS; still far fewer than the uploads.
    let pool = db::connect(&database_url, 1).await?;
    db::run_migrations(&pool).await?;
    reset_tables(&pool).await?;

    let repository = Arc::new(PgRepository::new(pool.clone()));
    let pipeline = Arc::new(IngestPipeline::new(repository.clone()));

    let uploads = 6;
    let mut handles = Vec::new();
    for _ in 0..uploads {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.ingest(UPLOAD.as_bytes()).await
        }));
    }
    for handle in handles {
        let outcome = handle.await??;
        assert_eq!(outcome.statistics.total_records, 2);
        assert_eq!(outcome.dispatch.dispatched, 2);
    }

    assert_eq!(repository.list_all().await?.len(), 2);
    assert_eq!(
        repository.count_projections(RequestType::NewLicense).await?,
        uploads
    );
    Ok(())
}
