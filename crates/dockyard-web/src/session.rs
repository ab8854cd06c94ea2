//! Per-browser form state.
//!
//! A session is created on the first request without a valid cookie,
//! updated on every form submission and dropped after sitting idle.

use dockyard_common::SessionId;
use dockyard_molecules::search_box::SearchBox;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const SESSION_COOKIE: &str = "dockyard_session";

/// The last values entered in the form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub search_box: SearchBox,
    pub smiles: String,
}

struct SessionEntry {
    config: SessionConfig,
    last_seen: Instant,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `id`, or start a new session with default values when it is
    /// absent or unknown. Returns the id actually in use.
    pub async fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, SessionConfig) {
        let mut sessions = self.sessions.write().await;
        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = Instant::now();
                return (id, entry.config.clone());
            }
        }

        let id = SessionId::new();
        sessions.insert(id, SessionEntry { config: SessionConfig::default(), last_seen: Instant::now() });
        (id, SessionConfig::default())
    }

    pub async fn update(&self, id: SessionId, config: SessionConfig) {
        self.sessions
            .write()
            .await
            .insert(id, SessionEntry { config, last_seen: Instant::now() });
    }

    /// Drop sessions idle for longer than `max_idle`. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= max_idle);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Session id from a raw `Cookie` header value.
pub fn session_from_cookie(cookie: Option<&str>) -> Option<SessionId> {
    cookie?.parse().ok()
}

pub fn set_cookie_value(id: SessionId) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}
