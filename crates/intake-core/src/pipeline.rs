use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::UploadArchive;
use crate::csv_decode;
use crate::dispatch::{dispatch_generation, DispatchReport};
use crate::error::{IntakeError, Result};
use crate::normalize::{normalize_rows, NormalizeOptions};
use crate::statistics::RequestStatistics;
use crate::store::RequestRepository;

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub upload_id: Uuid,
    pub content_hash: String,
    pub rows_decoded: usize,
    pub rows_staged: u64,
    pub statistics: RequestStatistics,
    pub dispatch: DispatchReport,
    /// Wall time of the whole call, including any wait for the upload lock.
    pub elapsed_ms: u64,
}

/// Runs uploads end to end against an injected repository.
pub struct IngestPipeline {
    repository: Arc<dyn RequestRepository>,
    archive: UploadArchive,
    options: NormalizeOptions,
}

impl IngestPipeline {
    pub fn new(repository: Arc<dyn RequestRepository>) -> Self {
        Self {
            repository,
            archive: UploadArchive::noop(),
            options: NormalizeOptions::default(),
        }
    }

    pub fn with_archive(mut self, archive: UploadArchive) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn repository(&self) -> &Arc<dyn RequestRepository> {
        &self.repository
    }

    /// Decode, normalize, replace the staged generation, dispatch it and
    /// count it. Only one upload runs at a time; later callers wait.
    pub async fn ingest(&self, contents: &[u8]) -> Result<IngestOutcome> {
        let upload_id = Uuid::new_v4();
        let span = info_span!("ingest", %upload_id, bytes = contents.len());
        self.ingest_inner(upload_id, contents).instrument(span).await
    }

    async fn ingest_inner(&self, upload_id: Uuid, contents: &[u8]) -> Result<IngestOutcome> {
        let started = Instant::now();
        let guard = self
            .repository
            .lock_uploads()
            .await
            .map_err(IntakeError::Store)?;
        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if waited_ms > 0 {
            info!(waited_ms, "acquired upload lock");
        }

        let content_hash = compute_hash(contents);
        match self
            .archive
            .put_upload(Utc::now(), &content_hash, contents)
            .await
        {
            Ok(Some(path)) => info!(path = %path.display(), "archived upload"),
            Ok(None) => {}
            Err(err) => warn!("failed to archive upload: {err}"),
        }

        let rows = csv_decode::decode(contents)?;
        info!(rows = rows.len(), "decoded upload");

        let records = normalize_rows(&rows, self.options)?;

        let rows_staged = self
            .repository
            .replace_all(&records)
            .await
            .map_err(IntakeError::StoreReplace)?;
        info!(rows_staged, "replaced staged generation");

        let dispatch = dispatch_generation(self.repository.as_ref()).await;

        let generation = self
            .repository
            .list_all()
            .await
            .map_err(IntakeError::Store)?;
        let statistics = RequestStatistics::from_generation(&generation);

        if let Err(err) = guard.release().await {
            warn!("failed to release upload lock: {err}");
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            total_records = statistics.total_records,
            dispatch_failures = dispatch.failed(),
            elapsed_ms,
            "upload processed"
        );

        Ok(IngestOutcome {
            upload_id,
            content_hash,
            rows_decoded: rows.len(),
            rows_staged,
            statistics,
            dispatch,
            elapsed_ms,
        })
    }

    /// Statistics of whatever generation is staged right now.
    pub async fn current_statistics(&self) -> Result<RequestStatistics> {
        let generation = self
            .repository
            .list_all()
            .await
            .map_err(IntakeError::Store)?;
        Ok(RequestStatistics::from_generation(&generation))
    }
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(contents);
    hasher.finalize().to_hex().to_string()
}
