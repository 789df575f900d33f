//! Chromium implementation of [`BrowserDriver`] over the DevTools protocol.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::{BrowserDriver, BrowserOptions, Cookie, DownloadedFile};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn browser_err(e: impl std::fmt::Display) -> Error {
    Error::Browser(e.to_string())
}

/// Driver over a launched Chromium instance with a single page.
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    download_dir: tempfile::TempDir,
    nav_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch Chromium according to `options` and open a blank page.
    ///
    /// Downloads are steered into a scratch directory owned by the driver
    /// and read back by [`BrowserDriver::trigger_download`].
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let mut config = BrowserConfig::builder();
        if !options.headless {
            config = config.with_head();
        }
        if options.incognito {
            config = config.arg("--incognito");
        }
        if let Some(profile) = &options.profile_dir {
            config = config.user_data_dir(profile);
        }
        let config = config.build().map_err(Error::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;

        // The handler stream must be pumped for the connection to make
        // progress; it ends when the browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler closed: {e}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(browser_err)?;

        let download_dir = tempfile::tempdir()?;
        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.path().to_string_lossy().to_string())
            .build()
            .map_err(Error::Browser)?;
        browser.execute(behavior).await.map_err(browser_err)?;

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler_task,
            download_dir,
            nav_timeout: options.nav_timeout,
        })
    }

    fn snapshot_downloads(&self) -> Result<Vec<std::path::PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(self.download_dir.path())? {
            entries.push(entry?.path());
        }
        Ok(entries)
    }

    /// A download is complete once Chromium drops the `.crdownload` suffix.
    async fn wait_for_new_download(
        &self,
        before: &[std::path::PathBuf],
        timeout: Duration,
    ) -> Result<Option<DownloadedFile>> {
        let deadline = Instant::now() + timeout;
        loop {
            for path in self.snapshot_downloads()? {
                if before.contains(&path) {
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) == Some("crdownload") {
                    continue;
                }
                let bytes = tokio::fs::read(&path).await?;
                let suggested_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("download.bin")
                    .to_string();
                // Consume the scratch file so later snapshots stay small.
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("could not remove scratch download {}: {e}", path.display());
                }
                return Ok(Some(DownloadedFile {
                    suggested_name,
                    bytes,
                }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(browser_err)?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| Error::Browser(format!("fill {selector}: {e}")))?;
        element.click().await.map_err(browser_err)?;
        element.type_str(value).await.map_err(browser_err)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| Error::Browser(format!("click {selector}: {e}")))?;
        element.click().await.map_err(browser_err)?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(elements.len()),
            // No match surfaces as an error from CDP; treat it as zero.
            Err(_) => Ok(0),
        }
    }

    async fn text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(_) => return Ok(None),
        };
        match elements.get(index) {
            Some(element) => element.inner_text().await.map_err(browser_err),
            None => Ok(None),
        }
    }

    async fn trigger_download(
        &self,
        selector: &str,
        index: usize,
        timeout: Duration,
    ) -> Result<Option<DownloadedFile>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| Error::Browser(format!("download {selector}: {e}")))?;
        let Some(element) = elements.get(index) else {
            return Ok(None);
        };

        let before = self.snapshot_downloads()?;
        element.click().await.map_err(browser_err)?;
        self.wait_for_new_download(&before, timeout).await
    }

    async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        self.page
            .pdf(PrintToPdfParams::default())
            .await
            .map_err(browser_err)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder().full_page(true).build(),
                path,
            )
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        let cookies = self.page.get_cookies().await.map_err(browser_err)?;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: if c.expires > 0.0 { Some(c.expires) } else { None },
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }
            params.push(builder.build().map_err(Error::Browser)?);
        }
        self.page.set_cookies(params).await.map_err(browser_err)?;
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("browser did not close cleanly: {e}");
        }
        self.handler_task.abort();
        Ok(())
    }
}
