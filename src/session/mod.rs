//! Portal session management.
//!
//! A session is an opaque persisted browser-authentication blob keyed by
//! (company, portal): the cookie set captured after a successful login,
//! restored and validated on later runs so interactive login is the
//! exception, not the rule.

pub mod manager;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::Cookie;
use crate::portals::Portal;

pub use manager::{LoginMode, SessionManager, SessionTimeouts};
pub use store::{FileSessionStore, SessionStore};

/// Persisted authentication state for one (company, portal) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub company: String,
    pub portal: Portal,
    pub cookies: Vec<Cookie>,
    pub created_at: DateTime<Utc>,
    pub last_validated: DateTime<Utc>,
}

impl PortalSession {
    pub fn new(company: &str, portal: Portal, cookies: Vec<Cookie>) -> Self {
        let now = Utc::now();
        Self {
            company: company.to_string(),
            portal,
            cookies,
            created_at: now,
            last_validated: now,
        }
    }

    /// Stable storage key: `<company>_<portal>`, filesystem-safe.
    pub fn key(company: &str, portal: Portal) -> String {
        let company: String = company
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{company}_{}", portal.key())
    }

    /// A session without cookies cannot authenticate anything.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_validated = Utc::now();
    }
}
