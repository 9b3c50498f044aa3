use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Where raw uploads are kept before decoding.
#[derive(Debug, Clone, Default)]
pub struct UploadArchive {
    inner: ArchiveKind,
}

#[derive(Debug, Clone, Default)]
enum ArchiveKind {
    #[default]
    Noop,
    Directory(PathBuf),
}

impl UploadArchive {
    pub fn noop() -> Self {
        UploadArchive {
            inner: ArchiveKind::Noop,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        UploadArchive {
            inner: ArchiveKind::Directory(path.into()),
        }
    }

    /// Writes the upload and returns its path, or `None` for the no-op archive.
    pub async fn put_upload(
        &self,
        received_at: DateTime<Utc>,
        content_hash: &str,
        contents: &[u8],
    ) -> std::io::Result<Option<PathBuf>> {
        match &self.inner {
            ArchiveKind::Noop => Ok(None),
            ArchiveKind::Directory(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path = dir.join(Self::upload_file_name(received_at, content_hash));
                tokio::fs::write(&path, contents).await?;
                Ok(Some(path))
            }
        }
    }

    pub fn upload_file_name(received_at: DateTime<Utc>, content_hash: &str) -> String {
        let prefix = content_hash.get(..12).unwrap_or(content_hash);
        format!(
            "request_csv_{}_{prefix}.csv",
            received_at.format("%Y%m%dT%H%M%S%3fZ")
        )
    }
}
