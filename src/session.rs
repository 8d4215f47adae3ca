use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::table::Table;

/// Where a session stands in the upload-process-download flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Unauthenticated,
    AwaitingUpload,
    Processing,
    ResultReady,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlowState::Unauthenticated => "logged out",
            FlowState::AwaitingUpload => "awaiting an upload",
            FlowState::Processing => "processing",
            FlowState::ResultReady => "a result is ready",
        };
        f.write_str(label)
    }
}

/// The spreadsheet an operator uploaded, as staged on disk
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    /// Random token identifying this upload
    pub id: Uuid,

    /// File name as chosen by the operator
    pub original_name: String,

    /// Name generated for the staged copy (`<id>_<sanitised name>`)
    pub staged_name: String,

    /// Location of the staged copy
    pub path: PathBuf,

    /// Size in bytes
    pub size: usize,
}

/// Tabular data returned by the remote endpoint
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    pub table: Table,

    /// Raw response body as persisted in the result staging directory
    pub csv_path: PathBuf,

    pub processed_at: DateTime<Utc>,
}

/// Per-operator state, created at login and discarded at logout or expiry
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub state: FlowState,
    pub artifact: Option<UploadedArtifact>,
    pub result: Option<ProcessedResult>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Session {
            id: id.into(),
            state: FlowState::Unauthenticated,
            artifact: None,
            result: None,
            last_error: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state != FlowState::Unauthenticated
    }

    /// Drop the current artifact and result, keeping authentication
    pub fn clear_artifacts(&mut self) {
        self.artifact = None;
        self.result = None;
        self.last_error = None;
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

struct Entry {
    handle: SessionHandle,
    expires_at: SystemTime,
}

/// All live sessions, keyed by the id carried in the session cookie.
///
/// Each session sits behind its own async mutex: requests of one operator are
/// serialised while different operators never wait on each other.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh, unauthenticated session with a random id. Not yet stored.
    pub fn fresh() -> Session {
        Session::new(Uuid::new_v4().to_string())
    }

    /// Store a session and return its shared handle
    pub fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        let entry = Entry {
            handle: handle.clone(),
            expires_at: SystemTime::now() + self.ttl,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id, entry);

        handle
    }

    /// Look up a live session, extending its lifetime
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let now = SystemTime::now();

        match sessions.get_mut(id) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Some(entry.handle.clone())
            }
            _ => None,
        }
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id).map(|entry| entry.handle)
    }

    /// Remove expired sessions, returning their ids so their files can be purged
    pub fn sweep_expired(&self) -> Vec<String> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let now = SystemTime::now();

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }

        expired
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unauthenticated() {
        let session = SessionStore::fresh();
        assert_eq!(session.state, FlowState::Unauthenticated);
        assert!(!session.is_authenticated());
        assert!(session.artifact.is_none());
        assert!(session.result.is_none());
    }

    #[test]
    fn test_insert_get_remove() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = SessionStore::fresh();
        let id = session.id.clone();

        store.insert(session);
        assert!(store.get(&id).is_some());
        assert!(store.get("unknown").is_none());

        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_sessions_are_swept() {
        let store = SessionStore::new(Duration::ZERO);
        let session = SessionStore::fresh();
        let id = session.id.clone();
        store.insert(session);

        assert!(store.get(&id).is_none());
        assert_eq!(store.sweep_expired(), vec![id]);
        assert!(store.is_empty());
    }
}
