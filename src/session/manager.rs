//! Session acquisition: restore-and-validate first, interactive login as
//! the fallback, with automatic, manual-assist, and pure-manual modes.

use std::time::Duration;

use tracing::{info, warn};

use super::store::SessionStore;
use super::PortalSession;
use crate::browser::BrowserDriver;
use crate::config::PortalCredentials;
use crate::error::{Error, Result};
use crate::interaction::UserInteraction;
use crate::portals::{LoginStep, Portal, PortalSpec};
use crate::retry;

/// How short probes for page state wait before concluding absence.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How an interactive login is performed when no stored session is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// Fill credentials; fail if the signed-in state does not appear in time.
    Automatic,
    /// Fill credentials, then wait for the operator to clear any challenge.
    ManualAssist,
    /// No form filling; the operator performs the entire login.
    PureManual,
}

/// Deadlines for the two kinds of waiting.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Bound on automated waits (navigation, signed-in probe).
    pub automation: Duration,
    /// Bound on operator waits. `None` waits indefinitely (manual-assist
    /// with unlimited challenge time).
    pub manual: Option<Duration>,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            automation: Duration::from_secs(30),
            manual: Some(Duration::from_secs(60)),
        }
    }
}

pub struct SessionManager<'a> {
    store: &'a dyn SessionStore,
    interaction: &'a dyn UserInteraction,
    timeouts: SessionTimeouts,
}

impl<'a> SessionManager<'a> {
    pub fn new(
        store: &'a dyn SessionStore,
        interaction: &'a dyn UserInteraction,
        timeouts: SessionTimeouts,
    ) -> Self {
        Self {
            store,
            interaction,
            timeouts,
        }
    }

    /// Acquire an authenticated session for (company, portal).
    ///
    /// Tries the stored session first; only when that is missing or
    /// rejected does it run the interactive login selected by `mode`.
    /// On success the fresh cookie set is persisted for the next run.
    pub async fn acquire(
        &self,
        driver: &dyn BrowserDriver,
        company: &str,
        portal: Portal,
        credentials: &PortalCredentials,
        mode: LoginMode,
    ) -> Result<PortalSession> {
        let spec = portal.spec();

        if let Some(mut stored) = self.store.load(company, portal).await? {
            driver.set_cookies(&stored.cookies).await?;
            if self.validate(driver, spec).await? {
                info!(company, %portal, "restored session is valid, skipping login");
                stored.touch();
                self.store.save(&stored).await?;
                return Ok(stored);
            }
            warn!(company, %portal, "stored session rejected, falling back to login");
            self.store.invalidate(company, portal).await?;
            driver.clear_cookies().await?;
        }

        self.login(driver, spec, company, credentials, mode).await?;

        let cookies = driver.cookies().await?;
        let session = PortalSession::new(company, portal, cookies);
        if session.is_empty() {
            warn!(company, %portal, "login produced no cookies; session will not survive this run");
        }
        self.store.save(&session).await?;
        info!(company, %portal, "session persisted for reuse");
        Ok(session)
    }

    /// A stored session is valid when the orders page does not bounce us
    /// back to the login form.
    async fn validate(&self, driver: &dyn BrowserDriver, spec: &PortalSpec) -> Result<bool> {
        retry::with_retry("probe order history", retry::DEFAULT_BACKOFF, || {
            driver.goto(spec.orders_url)
        })
        .await?;
        let login_form_shown = driver
            .wait_for(spec.login_form_probe, PROBE_TIMEOUT)
            .await?;
        Ok(!login_form_shown)
    }

    async fn login(
        &self,
        driver: &dyn BrowserDriver,
        spec: &PortalSpec,
        company: &str,
        credentials: &PortalCredentials,
        mode: LoginMode,
    ) -> Result<()> {
        retry::with_retry("open login page", retry::DEFAULT_BACKOFF, || {
            driver.goto(spec.login_url)
        })
        .await?;

        match mode {
            LoginMode::Automatic => {
                self.fill_login_form(driver, spec, credentials).await?;
                if self.signed_in(driver, spec, self.timeouts.automation).await? {
                    return Ok(());
                }
                // Distinguish a rejected credential (login form still up)
                // from an unresolved interstitial challenge.
                if driver.wait_for(spec.login_form_probe, PROBE_TIMEOUT).await? {
                    Err(Error::Auth(format!(
                        "{} rejected credentials for {company}",
                        spec.portal
                    )))
                } else {
                    Err(Error::ChallengeTimeout(format!(
                        "{} login did not complete within {:?}; rerun with --manual-mode to clear the challenge",
                        spec.portal, self.timeouts.automation
                    )))
                }
            }
            LoginMode::ManualAssist => {
                self.fill_login_form(driver, spec, credentials).await?;
                if self.signed_in(driver, spec, PROBE_TIMEOUT).await? {
                    return Ok(());
                }
                self.interaction
                    .wait_for_confirmation(
                        &format!(
                            "Complete the CAPTCHA/2FA for {} ({company}) in the browser",
                            spec.portal
                        ),
                        self.timeouts.manual,
                    )
                    .await?;
                if self.signed_in(driver, spec, PROBE_TIMEOUT).await? {
                    Ok(())
                } else {
                    Err(Error::Session(format!(
                        "{} still not signed in after manual confirmation",
                        spec.portal
                    )))
                }
            }
            LoginMode::PureManual => {
                self.interaction
                    .wait_for_confirmation(
                        &format!("Log in to {} ({company}) manually", spec.portal),
                        // Pure-manual is always bounded.
                        Some(self.timeouts.manual.unwrap_or(Duration::from_secs(300))),
                    )
                    .await?;
                if self.signed_in(driver, spec, PROBE_TIMEOUT).await? {
                    Ok(())
                } else {
                    Err(Error::Session(format!(
                        "{} still not signed in after manual login",
                        spec.portal
                    )))
                }
            }
        }
    }

    async fn fill_login_form(
        &self,
        driver: &dyn BrowserDriver,
        spec: &PortalSpec,
        credentials: &PortalCredentials,
    ) -> Result<()> {
        self.interaction
            .display_progress(&format!("Signing in to {}", spec.portal));
        for step in spec.login_steps {
            match step {
                LoginStep::FillUsername(selector) => {
                    driver.fill(selector, &credentials.username).await?;
                }
                LoginStep::FillPassword(selector) => {
                    driver.fill(selector, &credentials.password).await?;
                }
                LoginStep::Click(selector) => {
                    driver.click(selector).await?;
                }
            }
        }
        Ok(())
    }

    async fn signed_in(
        &self,
        driver: &dyn BrowserDriver,
        spec: &PortalSpec,
        timeout: Duration,
    ) -> Result<bool> {
        driver.wait_for(spec.signed_in_probe, timeout).await
    }
}
