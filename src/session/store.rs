//! Session storage backends.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use super::PortalSession;
use crate::error::Result;
use crate::portals::Portal;

/// Trait for persisted-session backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Save a session under its (company, portal) key.
    async fn save(&self, session: &PortalSession) -> Result<()>;

    /// Load the session for (company, portal), if any.
    async fn load(&self, company: &str, portal: Portal) -> Result<Option<PortalSession>>;

    /// Drop the stored session for (company, portal).
    async fn invalidate(&self, company: &str, portal: Portal) -> Result<()>;
}

/// File-backed store: one JSON blob per (company, portal) key.
pub struct FileSessionStore {
    base_path: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn session_path(&self, company: &str, portal: Portal) -> PathBuf {
        self.base_path
            .join(format!("{}.json", PortalSession::key(company, portal)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &PortalSession) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        let json = serde_json::to_string_pretty(session)?;
        let path = self.session_path(&session.company, session.portal);
        fs::write(&path, json).await?;
        debug!("session saved to {}", path.display());
        Ok(())
    }

    async fn load(&self, company: &str, portal: Portal) -> Result<Option<PortalSession>> {
        let path = self.session_path(company, portal);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).await?;
        match serde_json::from_str(&json) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt blob is treated like no session at all.
                debug!("discarding unreadable session {}: {e}", path.display());
                fs::remove_file(&path).await?;
                Ok(None)
            }
        }
    }

    async fn invalidate(&self, company: &str, portal: Portal) -> Result<()> {
        let path = self.session_path(company, portal);
        if path.exists() {
            fs::remove_file(&path).await?;
            debug!("session invalidated: {}", path.display());
        }
        Ok(())
    }
}

/// In-memory store for tests.
#[cfg(test)]
pub struct InMemorySessionStore {
    sessions: std::sync::Mutex<std::collections::HashMap<String, PortalSession>>,
}

#[cfg(test)]
impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &PortalSession) -> Result<()> {
        let key = PortalSession::key(&session.company, session.portal);
        self.sessions.lock().unwrap().insert(key, session.clone());
        Ok(())
    }

    async fn load(&self, company: &str, portal: Portal) -> Result<Option<PortalSession>> {
        let key = PortalSession::key(company, portal);
        Ok(self.sessions.lock().unwrap().get(&key).cloned())
    }

    async fn invalidate(&self, company: &str, portal: Portal) -> Result<()> {
        let key = PortalSession::key(company, portal);
        self.sessions.lock().unwrap().remove(&key);
        Ok(())
    }
}
