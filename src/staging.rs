use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
}

/// Local scratch storage for artifacts in transit.
///
/// Files live under one sub-directory per session in each staging directory:
///
/// ```text
/// uploads/<session>/<artifact>_<name>
/// results/<session>/processed_<artifact>.csv
/// ```
#[derive(Debug, Clone)]
pub struct StagingArea {
    upload_dir: PathBuf,
    result_dir: PathBuf,
}

impl StagingArea {
    pub fn new(upload_dir: impl Into<PathBuf>, result_dir: impl Into<PathBuf>) -> Self {
        StagingArea {
            upload_dir: upload_dir.into(),
            result_dir: result_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Create both staging directories if they do not exist yet
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.upload_dir).await?;
        fs::create_dir_all(&self.result_dir).await?;
        Ok(())
    }

    /// Write an uploaded file to the session's upload directory.
    ///
    /// # Returns
    /// * `(staged_name, path)` of the written copy
    pub async fn stage_upload(
        &self,
        session_id: &str,
        artifact_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> io::Result<(String, PathBuf)> {
        let dir = self.upload_dir.join(session_id);
        fs::create_dir_all(&dir).await?;

        let staged_name = format!("{}_{}", artifact_id, sanitize_filename(original_name));
        let path = dir.join(&staged_name);
        fs::write(&path, bytes).await?;

        Ok((staged_name, path))
    }

    /// Persist a remote response body in the session's result directory
    pub async fn store_result(
        &self,
        session_id: &str,
        artifact_id: Uuid,
        body: &str,
    ) -> io::Result<PathBuf> {
        let dir = self.result_dir.join(session_id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("processed_{}.csv", artifact_id));
        fs::write(&path, body).await?;

        Ok(path)
    }

    /// Remove every staged file of a session from both directories.
    ///
    /// Failures are logged and skipped; returns how many files were removed.
    pub async fn purge(&self, session_id: &str) -> usize {
        let mut removed = 0;

        for folder in [&self.upload_dir, &self.result_dir] {
            let dir = folder.join(session_id);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    log::warn!("Failed to list {}: {}", dir.display(), e);
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Failed to read entry in {}: {}", dir.display(), e);
                        break;
                    }
                };

                let path = entry.path();
                let is_file = entry
                    .file_type()
                    .await
                    .map(|t| t.is_file())
                    .unwrap_or(false);
                if !is_file {
                    continue;
                }

                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Failed to delete {}: {}", path.display(), e),
                }
            }

            if let Err(e) = fs::remove_dir(&dir).await {
                log::debug!("Leaving {} in place: {}", dir.display(), e);
            }
        }

        removed
    }
}

/// Strip directory components and replace characters outside `[A-Za-z0-9._-]`
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}
