//! Scriptable in-memory [`BrowserDriver`] for tests.
//!
//! Pages are modeled as the set of selectors they would match; downloads
//! are served from a queue. No browser process is involved.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{BrowserDriver, Cookie, DownloadedFile};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Goto(String),
    Fill(String, String),
    Click(String),
    Screenshot(String),
    PrintToPdf,
}

#[derive(Default)]
struct State {
    selectors: HashMap<String, usize>,
    texts: HashMap<String, Vec<String>>,
    cookies: Vec<Cookie>,
    cookies_after_click: Vec<Cookie>,
    downloads: Vec<Option<DownloadedFile>>,
    pdf_bytes: Vec<u8>,
    actions: Vec<Action>,
    fail_goto: Option<String>,
}

/// Scriptable browser double.
#[derive(Default)]
pub struct MockBrowser {
    state: Mutex<State>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `selector` currently matches `count` elements.
    pub fn with_selector(self, selector: &str, count: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .selectors
            .insert(selector.to_string(), count);
        self
    }

    /// Declare the inner texts of the elements matching `selector`, and
    /// their count.
    pub fn with_texts(self, selector: &str, texts: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .selectors
                .insert(selector.to_string(), texts.len());
            state.texts.insert(
                selector.to_string(),
                texts.iter().map(|t| t.to_string()).collect(),
            );
        }
        self
    }

    /// Queue the result of the next download trigger.
    pub fn with_download(self, download: Option<DownloadedFile>) -> Self {
        self.state.lock().unwrap().downloads.push(download);
        self
    }

    /// Set the bytes returned by print-to-pdf.
    pub fn with_pdf(self, bytes: Vec<u8>) -> Self {
        self.state.lock().unwrap().pdf_bytes = bytes;
        self
    }

    /// Pre-load cookies, as a restored session would.
    pub fn with_cookies(self, cookies: Vec<Cookie>) -> Self {
        self.state.lock().unwrap().cookies = cookies;
        self
    }

    /// Grant cookies when something is clicked, the way a portal sets its
    /// auth cookies on login submission.
    pub fn with_cookies_after_click(self, cookies: Vec<Cookie>) -> Self {
        self.state.lock().unwrap().cookies_after_click = cookies;
        self
    }

    /// Make navigation fail with a network error for matching URLs.
    pub fn failing_goto(self, url_fragment: &str) -> Self {
        self.state.lock().unwrap().fail_goto = Some(url_fragment.to_string());
        self
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().unwrap().actions.clone()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(fragment) = &state.fail_goto {
            if url.contains(fragment.as_str()) {
                return Err(Error::Network(format!("could not connect to {url}")));
            }
        }
        state.actions.push(Action::Goto(url.to_string()));
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .actions
            .push(Action::Fill(selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::Click(selector.to_string()));
        if !state.cookies_after_click.is_empty() {
            let granted = std::mem::take(&mut state.cookies_after_click);
            state.cookies.extend(granted);
        }
        Ok(())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.selectors.get(selector).copied().unwrap_or(0) > 0)
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let state = self.state.lock().unwrap();
        Ok(state.selectors.get(selector).copied().unwrap_or(0))
    }

    async fn text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .texts
            .get(selector)
            .and_then(|texts| texts.get(index))
            .cloned())
    }

    async fn trigger_download(
        &self,
        selector: &str,
        _index: usize,
        _timeout: Duration,
    ) -> Result<Option<DownloadedFile>> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::Click(selector.to_string()));
        if state.downloads.is_empty() {
            Ok(None)
        } else {
            Ok(state.downloads.remove(0))
        }
    }

    async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(Action::PrintToPdf);
        Ok(state.pdf_bytes.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .actions
            .push(Action::Screenshot(path.display().to_string()));
        std::fs::write(path, b"png")?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        self.state.lock().unwrap().cookies = cookies.to_vec();
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.state.lock().unwrap().cookies.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
