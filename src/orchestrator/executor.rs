//! Production [`ChannelExecutor`]: wires email retrieval and portal
//! sessions to the file organizer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Channel, ChannelExecutor, DownloadTask};
use crate::browser::{BrowserDriver, BrowserOptions, ChromiumDriver};
use crate::config::CompanyConfig;
use crate::email::EmailRetriever;
use crate::error::{Error, Result};
use crate::interaction::UserInteraction;
use crate::organizer::{FileOrganizer, StoreOutcome};
use crate::portals::{InvoiceDownloader, Portal};
use crate::session::{FileSessionStore, LoginMode, SessionManager, SessionTimeouts};

pub struct LiveChannelExecutor {
    session_dir: PathBuf,
    interaction: Arc<dyn UserInteraction>,
    browser: BrowserOptions,
    login_mode: LoginMode,
    timeouts: SessionTimeouts,
    /// Bound for a single invoice download to land on disk.
    download_timeout: Duration,
}

impl LiveChannelExecutor {
    pub fn new(
        session_dir: impl Into<PathBuf>,
        interaction: Arc<dyn UserInteraction>,
        browser: BrowserOptions,
        login_mode: LoginMode,
        timeouts: SessionTimeouts,
    ) -> Self {
        Self {
            session_dir: session_dir.into(),
            interaction,
            browser,
            login_mode,
            timeouts,
            download_timeout: Duration::from_secs(30),
        }
    }

    async fn run_email(&self, company: &CompanyConfig, task: &DownloadTask) -> Result<usize> {
        let email_config = company
            .email
            .as_ref()
            .ok_or_else(|| Error::Config(format!("{}: email not configured", company.name)))?;

        let attachments = EmailRetriever::fetch_invoices(email_config, task.since).await?;
        info!(
            company = %company.name,
            attachments = attachments.len(),
            "email retrieval finished"
        );

        let organizer = FileOrganizer::new(&task.base_dir);
        let mut filed = 0;
        for attachment in attachments {
            match organizer.store(
                &company.name,
                Channel::Email.key(),
                attachment.message_date,
                &attachment.filename,
                &attachment.bytes,
            ) {
                Ok(record) => {
                    if record.outcome != StoreOutcome::SkippedDuplicate {
                        filed += 1;
                    }
                }
                Err(e) => {
                    // A single attachment's filing problem is not fatal.
                    warn!(
                        company = %company.name,
                        filename = %attachment.filename,
                        "could not file attachment: {e}"
                    );
                }
            }
        }
        Ok(filed)
    }

    async fn run_portal(
        &self,
        company: &CompanyConfig,
        task: &DownloadTask,
        portal: Portal,
    ) -> Result<usize> {
        let credentials = match portal {
            Portal::Walmart => company.walmart.as_ref(),
            Portal::Amazon => company.amazon.as_ref(),
        }
        .ok_or_else(|| {
            Error::Config(format!("{}: {portal} not configured", company.name))
        })?;

        let driver = ChromiumDriver::launch(&self.browser).await?;
        let result = self
            .drive_portal(&driver, company, task, portal, credentials)
            .await;
        if let Err(e) = driver.close().await {
            warn!("browser teardown failed: {e}");
        }
        result
    }

    async fn drive_portal(
        &self,
        driver: &dyn BrowserDriver,
        company: &CompanyConfig,
        task: &DownloadTask,
        portal: Portal,
        credentials: &crate::config::PortalCredentials,
    ) -> Result<usize> {
        let store = FileSessionStore::new(&self.session_dir);
        let manager = SessionManager::new(&store, self.interaction.as_ref(), self.timeouts);
        manager
            .acquire(driver, &company.name, portal, credentials, self.login_mode)
            .await?;

        let organizer = FileOrganizer::new(&task.base_dir);
        let downloader = InvoiceDownloader::new(driver, &organizer, self.download_timeout);
        let records = downloader
            .download_invoices(portal.spec(), &company.name, task.since)
            .await?;

        Ok(records
            .iter()
            .filter(|r| r.outcome != StoreOutcome::SkippedDuplicate)
            .count())
    }
}

#[async_trait]
impl ChannelExecutor for LiveChannelExecutor {
    async fn run(&self, company: &CompanyConfig, task: &DownloadTask) -> Result<usize> {
        match task.channel {
            Channel::Email => self.run_email(company, task).await,
            Channel::Walmart => self.run_portal(company, task, Portal::Walmart).await,
            Channel::Amazon => self.run_portal(company, task, Portal::Amazon).await,
        }
    }
}
