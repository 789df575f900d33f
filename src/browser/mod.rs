//! Browser automation collaborator.
//!
//! Session and portal logic talk to a [`BrowserDriver`] trait; the
//! production implementation drives headless (or headed) Chromium over the
//! DevTools protocol. The trait keeps everything above it testable without
//! a browser installed.

pub mod chromium;
pub mod mock;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use chromium::ChromiumDriver;

/// Browser launch options, mapped straight from the CLI flags.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run without a visible window. Manual modes want a visible browser.
    pub headless: bool,
    /// Launch an incognito context.
    pub incognito: bool,
    /// Reuse a persistent profile directory instead of a fresh session.
    pub profile_dir: Option<PathBuf>,
    /// Bound for navigation and element waits.
    pub nav_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            incognito: true,
            profile_dir: None,
            nav_timeout: Duration::from_secs(30),
        }
    }
}

/// A cookie captured from or restored into the browser. This is the
/// persisted shape of a portal session, decoupled from the CDP types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

/// A file the browser produced in response to a download trigger.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub suggested_name: String,
    pub bytes: Vec<u8>,
}

/// Minimal automation surface needed for portal login and invoice
/// retrieval: navigate, fill, click, observe, and capture state.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to a URL and wait for the load to settle.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Fill the first element matching `selector` with `value`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Wait up to `timeout` for `selector` to appear. Returns whether it did.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Number of elements currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Inner text of the nth element matching `selector`, if it exists.
    async fn text(&self, selector: &str, index: usize) -> Result<Option<String>>;

    /// Click the nth element matching `selector` and wait up to `timeout`
    /// for a download to complete. `None` when the click produced nothing.
    async fn trigger_download(
        &self,
        selector: &str,
        index: usize,
        timeout: Duration,
    ) -> Result<Option<DownloadedFile>>;

    /// Render the current page to PDF.
    async fn print_to_pdf(&self) -> Result<Vec<u8>>;

    /// Save a full-page screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// All cookies visible to the current page.
    async fn cookies(&self) -> Result<Vec<Cookie>>;

    /// Install cookies before navigation (session restore).
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    /// Drop all cookies (session invalidation).
    async fn clear_cookies(&self) -> Result<()>;

    /// Tear the browser down.
    async fn close(&self) -> Result<()>;
}
