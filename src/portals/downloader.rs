//! Order-history walk and invoice retrieval for an authenticated portal.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::PortalSpec;
use crate::browser::BrowserDriver;
use crate::error::Result;
use crate::organizer::{FileOrganizer, FileRecord};
use crate::retry;

/// Anything smaller is assumed to be an error page or an empty render,
/// not an invoice document.
const MIN_DOCUMENT_BYTES: usize = 1000;

pub struct InvoiceDownloader<'a> {
    driver: &'a dyn BrowserDriver,
    organizer: &'a FileOrganizer,
    timeout: Duration,
}

impl<'a> InvoiceDownloader<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        organizer: &'a FileOrganizer,
        timeout: Duration,
    ) -> Self {
        Self {
            driver,
            organizer,
            timeout,
        }
    }

    /// Walk the portal's order-history view and file the invoice document
    /// of every order within the lookback window. A single order's failure
    /// is logged and skipped; only navigation-level failures surface as
    /// errors.
    pub async fn download_invoices(
        &self,
        spec: &PortalSpec,
        company: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FileRecord>> {
        retry::with_retry("open order history", retry::DEFAULT_BACKOFF, || {
            self.driver.goto(spec.orders_url)
        })
        .await?;

        let Some((selector, matches)) = self.find_invoice_elements(spec).await? else {
            warn!(portal = %spec.portal, company, "no invoice elements found on order history");
            self.capture_diagnostic(spec, company, "orders").await;
            return Ok(Vec::new());
        };
        info!(
            portal = %spec.portal,
            company,
            selector,
            matches,
            "found invoice elements"
        );

        let order_dates = self.order_dates(spec, matches).await?;

        let mut records = Vec::new();
        let mut attempted = 0;
        for index in 0..matches {
            if let Some(Some(placed)) = order_dates.as_ref().map(|d| d[index]) {
                if placed < since.date_naive() {
                    debug!(
                        portal = %spec.portal,
                        company,
                        index,
                        %placed,
                        "order predates the lookback window, skipping"
                    );
                    continue;
                }
            }
            attempted += 1;
            match self.driver.trigger_download(selector, index, self.timeout).await {
                Ok(Some(download)) => {
                    if download.bytes.len() < MIN_DOCUMENT_BYTES {
                        warn!(
                            portal = %spec.portal,
                            name = %download.suggested_name,
                            size = download.bytes.len(),
                            "download suspiciously small, keeping anyway"
                        );
                    }
                    let record = self.organizer.store(
                        company,
                        spec.portal.key(),
                        Utc::now(),
                        &download.suggested_name,
                        &download.bytes,
                    )?;
                    records.push(record);
                }
                Ok(None) => {
                    warn!(
                        portal = %spec.portal,
                        company,
                        index,
                        "invoice click produced no download"
                    );
                }
                Err(e) => {
                    // One order's failure never halts the company's run.
                    warn!(portal = %spec.portal, company, index, "invoice download failed: {e}");
                }
            }
        }

        // Only fall back when something in range was actually attempted;
        // a page whose orders all predate the window yields nothing.
        if records.is_empty() && attempted > 0 {
            if let Some(record) = self.render_page_fallback(spec, company).await? {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Per-order placement dates, index-aligned with the invoice elements.
    ///
    /// Returns `None` when the page does not yield exactly one date per
    /// invoice element; unattributable dates disable filtering rather than
    /// risk dropping an in-range order.
    async fn order_dates(
        &self,
        spec: &PortalSpec,
        matches: usize,
    ) -> Result<Option<Vec<Option<NaiveDate>>>> {
        let date_count = self.driver.count(spec.order_date_selector).await?;
        if date_count != matches {
            debug!(
                portal = %spec.portal,
                matches,
                date_count,
                "order dates do not pair with invoice elements, not filtering"
            );
            return Ok(None);
        }

        let mut dates = Vec::with_capacity(matches);
        for index in 0..matches {
            let text = self.driver.text(spec.order_date_selector, index).await?;
            dates.push(text.as_deref().and_then(parse_order_date));
        }
        Ok(Some(dates))
    }

    /// First selector in the ladder with any matches wins.
    async fn find_invoice_elements(
        &self,
        spec: &PortalSpec,
    ) -> Result<Option<(&'static str, usize)>> {
        for selector in spec.invoice_selectors {
            let matches = self.driver.count(selector).await?;
            if matches > 0 {
                return Ok(Some((selector, matches)));
            }
        }
        Ok(None)
    }

    /// When clicks produce nothing, render the order page itself to PDF,
    /// as the portals sometimes present invoices as print views.
    async fn render_page_fallback(
        &self,
        spec: &PortalSpec,
        company: &str,
    ) -> Result<Option<FileRecord>> {
        let bytes = match self.driver.print_to_pdf().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(portal = %spec.portal, company, "page render fallback failed: {e}");
                self.capture_diagnostic(spec, company, "render").await;
                return Ok(None);
            }
        };
        if bytes.len() < MIN_DOCUMENT_BYTES {
            warn!(
                portal = %spec.portal,
                company,
                size = bytes.len(),
                "rendered page too small to be a document, discarding"
            );
            return Ok(None);
        }
        let name = format!("order_page_{}.pdf", Utc::now().format("%Y%m%d_%H%M%S"));
        let record = self
            .organizer
            .store(company, spec.portal.key(), Utc::now(), &name, &bytes)?;
        Ok(Some(record))
    }

    async fn capture_diagnostic(&self, spec: &PortalSpec, company: &str, stage: &str) {
        let dir = self.organizer.base().join(company);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("could not create diagnostic dir {}: {e}", dir.display());
            return;
        }
        let path = dir.join(format!(
            "{}_{stage}_error_{}.png",
            spec.portal.key(),
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        match self.driver.screenshot(&path).await {
            Ok(()) => info!("diagnostic screenshot saved to {}", path.display()),
            Err(e) => warn!("diagnostic screenshot failed: {e}"),
        }
    }
}

/// Parse an order-card placement date ("March 11, 2024" and the common
/// numeric variants).
fn parse_order_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for format in ["%B %d, %Y", "%b %d, %Y", "%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    None
}
