//! Per-user session state for in-flight scheduling conversations.
//!
//! When a request hits conflicts, the orchestrator stashes the conflicted
//! drafts and their ranked options here until the user picks one. The store
//! is an explicit value passed by reference into request handlers; nothing
//! session-related lives in process-global state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{ConflictRecord, ResolutionOption};

/// One conflicted draft awaiting a user decision, with its ranked options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingResolution {
    pub record: ConflictRecord,
    pub options: Vec<ResolutionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub pending: Vec<PendingResolution>,
    pub updated_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore { sessions: Mutex::new(HashMap::new()) }
    }

    /// Replace the user's pending resolutions.
    pub fn put_pending(&self, user_id: &str, pending: Vec<PendingResolution>) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(
            user_id.to_string(),
            SessionState { pending, updated_at: Utc::now() },
        );
    }

    /// Look at the user's session without consuming it.
    pub fn peek(&self, user_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(user_id).cloned()
    }

    /// Remove and return the user's pending resolutions.
    pub fn take_pending(&self, user_id: &str) -> Option<Vec<PendingResolution>> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(user_id).map(|state| state.pending)
    }

    pub fn clear(&self, user_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(user_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new()
    }
}
