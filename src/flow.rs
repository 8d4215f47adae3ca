//! The upload-process-download state machine.
//!
//! ```text
//! Unauthenticated --login--> AwaitingUpload --upload--> Processing --process--> ResultReady
//!                                  ^                        |  ^                      |
//!                                  |                        +--+ (remote failure)     |
//!                                  +-----------------------reset----------------------+
//! ```
//!
//! Every operation takes the session explicitly; the workflow itself holds
//! only shared, immutable collaborators.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::downloader;
use crate::error::FlowError;
use crate::mailer::Mailer;
use crate::remote::Processor;
use crate::session::{FlowState, ProcessedResult, Session, UploadedArtifact};
use crate::staging::StagingArea;
use crate::table::Table;

pub struct Workflow {
    config: Arc<Config>,
    staging: StagingArea,
    processor: Arc<dyn Processor>,
    mailer: Option<Arc<Mailer>>,
}

impl Workflow {
    pub fn new(config: Arc<Config>, processor: Arc<dyn Processor>) -> Self {
        let staging = StagingArea::new(config.upload_dir.clone(), config.result_dir.clone());
        Workflow {
            config,
            staging,
            processor,
            mailer: None,
        }
    }

    /// E-mail every processed workbook through `mailer`
    pub fn with_mailer(mut self, mailer: Mailer) -> Self {
        self.mailer = Some(Arc::new(mailer));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// `Unauthenticated -> AwaitingUpload` when the credentials match.
    ///
    /// A failed check leaves the session untouched.
    pub fn login(
        &self,
        session: &mut Session,
        username: &str,
        password: &str,
    ) -> Result<(), FlowError> {
        if session.is_authenticated() {
            return Ok(());
        }

        if !self.config.credentials.matches(username, password) {
            log::warn!("Rejected login attempt for user '{}'", username);
            return Err(FlowError::InvalidCredentials);
        }

        session.state = FlowState::AwaitingUpload;
        session.last_error = None;
        log::info!("User '{}' logged in (session {})", username, session.id);
        Ok(())
    }

    /// Stage a new upload and move to `Processing`.
    ///
    /// Files with an extension outside the allow-list are rejected without
    /// touching the session's state, artifact or result. An accepted file
    /// first purges whatever the session had staged before.
    pub async fn upload(
        &self,
        session: &mut Session,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<(), FlowError> {
        require_login(session)?;

        if !self.config.accepts(original_name) {
            let err = FlowError::UnsupportedExtension {
                filename: original_name.to_string(),
                allowed: self.config.allowed_extensions.join(", "),
            };
            log::warn!("Session {}: {}", session.id, err);
            session.last_error = Some(err.to_string());
            return Err(err);
        }

        self.staging.purge(&session.id).await;
        session.clear_artifacts();

        let id = Uuid::new_v4();
        let (staged_name, path) = match self
            .staging
            .stage_upload(&session.id, id, original_name, bytes)
            .await
        {
            Ok(staged) => staged,
            Err(e) => {
                let err = FlowError::from(e);
                session.state = FlowState::AwaitingUpload;
                session.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        log::info!(
            "Session {}: staged {} ({} bytes) as {}",
            session.id,
            original_name,
            bytes.len(),
            staged_name
        );

        session.artifact = Some(UploadedArtifact {
            id,
            original_name: original_name.to_string(),
            staged_name,
            path,
            size: bytes.len(),
        });
        session.state = FlowState::Processing;
        Ok(())
    }

    /// `Processing -> ResultReady` through one call to the remote endpoint.
    ///
    /// On any failure the session stays in `Processing` with the message in
    /// `last_error`; calling this again reissues the request.
    pub async fn process(&self, session: &mut Session) -> Result<(), FlowError> {
        require_login(session)?;
        if session.state != FlowState::Processing {
            return Err(FlowError::InvalidState {
                action: "process a file",
                state: session.state,
            });
        }
        let artifact = session
            .artifact
            .clone()
            .ok_or(FlowError::NothingStaged)?;

        match self.run_remote(&session.id, &artifact).await {
            Ok(result) => {
                log::info!(
                    "Session {}: processed {} into {} rows x {} columns",
                    session.id,
                    artifact.original_name,
                    result.table.row_count(),
                    result.table.column_count()
                );
                self.notify(&artifact.original_name, &result.table);
                session.result = Some(result);
                session.state = FlowState::ResultReady;
                session.last_error = None;
                Ok(())
            }
            Err(err) => {
                log::warn!("Session {}: {}", session.id, err);
                session.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Upload then process in one pass, as a single operator interaction does
    pub async fn submit(
        &self,
        session: &mut Session,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<(), FlowError> {
        self.upload(session, original_name, bytes).await?;
        self.process(session).await
    }

    /// Clear staged files and results and return to `AwaitingUpload`
    pub async fn reset(&self, session: &mut Session) -> Result<(), FlowError> {
        require_login(session)?;

        let removed = self.staging.purge(&session.id).await;
        session.clear_artifacts();
        session.state = FlowState::AwaitingUpload;

        log::info!("Session {}: reset ({} staged files removed)", session.id, removed);
        Ok(())
    }

    /// Purge everything the session staged and drop its authentication
    pub async fn logout(&self, session: &mut Session) {
        self.staging.purge(&session.id).await;
        session.clear_artifacts();
        session.state = FlowState::Unauthenticated;
        log::info!("Session {}: logged out", session.id);
    }

    /// The processed result as `(filename, xlsx bytes)`
    pub fn download(&self, session: &Session) -> Result<(String, Vec<u8>), FlowError> {
        require_login(session)?;

        let (artifact, result) = match (&session.artifact, &session.result) {
            (Some(artifact), Some(result)) if session.state == FlowState::ResultReady => {
                (artifact, result)
            }
            _ => return Err(FlowError::NoResult),
        };

        let bytes = downloader::to_xlsx(&result.table)?;
        Ok((downloader::download_filename(&artifact.original_name), bytes))
    }

    async fn run_remote(
        &self,
        session_id: &str,
        artifact: &UploadedArtifact,
    ) -> Result<ProcessedResult, FlowError> {
        let bytes = tokio::fs::read(&artifact.path).await?;

        let body = self
            .processor
            .process(&artifact.original_name, bytes)
            .await?;

        let csv_path = self
            .staging
            .store_result(session_id, artifact.id, &body)
            .await?;
        let table = Table::from_csv(&body)?;

        Ok(ProcessedResult {
            table,
            csv_path,
            processed_at: Utc::now(),
        })
    }

    // Fire and forget: failures are logged, never surfaced.
    fn notify(&self, original_name: &str, table: &Table) {
        let Some(mailer) = self.mailer.clone() else {
            return;
        };

        let filename = downloader::download_filename(original_name);
        let workbook = match downloader::to_xlsx(table) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping notification for {}: {}", filename, e);
                return;
            }
        };

        tokio::task::spawn_blocking(move || match mailer.send_processed_file(&filename, workbook) {
            Ok(()) => log::info!("Notification sent for {}", filename),
            Err(e) => log::warn!("Failed to send notification for {}: {}", filename, e),
        });
    }
}

fn require_login(session: &Session) -> Result<(), FlowError> {
    if session.is_authenticated() {
        Ok(())
    } else {
        Err(FlowError::NotAuthenticated)
    }
}
