//! Portal definitions: which sites we log into and how.
//!
//! Each portal is described declaratively (login URL, form-fill steps,
//! a signed-in probe, the order-history URL, and an ordered ladder of
//! invoice-element selectors) so the session manager and the downloader
//! share one engine for both sites.

pub mod downloader;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use downloader::InvoiceDownloader;

/// A web portal requiring authenticated browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Portal {
    Walmart,
    Amazon,
}

impl Portal {
    /// Stable lowercase key used for session files and filed filenames.
    pub fn key(&self) -> &'static str {
        match self {
            Portal::Walmart => "walmart",
            Portal::Amazon => "amazon",
        }
    }

    pub fn spec(&self) -> &'static PortalSpec {
        match self {
            Portal::Walmart => &WALMART,
            Portal::Amazon => &AMAZON,
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One automated step of a login form flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    /// Fill the selector with the configured username.
    FillUsername(&'static str),
    /// Fill the selector with the configured password.
    FillPassword(&'static str),
    /// Click the selector (submit / continue buttons).
    Click(&'static str),
}

/// Declarative description of a portal's authentication and order surface.
#[derive(Debug)]
pub struct PortalSpec {
    pub portal: Portal,
    pub login_url: &'static str,
    /// Form steps for automatic credential entry, in order. Amazon's
    /// two-step email → continue → password flow and Walmart's single
    /// form both fit this shape.
    pub login_steps: &'static [LoginStep],
    /// Selector present once the user is signed in.
    pub signed_in_probe: &'static str,
    /// Selector of the login form's username field; its presence on the
    /// orders page means the stored session was rejected.
    pub login_form_probe: &'static str,
    pub orders_url: &'static str,
    /// Selector of the per-order placement date on the order-history page.
    /// Used to skip orders older than the lookback window; filtering is
    /// best-effort and only applies when dates pair up with the invoice
    /// elements one to one.
    pub order_date_selector: &'static str,
    /// Invoice-element selectors, most specific first. The first selector
    /// with any matches wins for a given page.
    pub invoice_selectors: &'static [&'static str],
}

pub static WALMART: PortalSpec = PortalSpec {
    portal: Portal::Walmart,
    login_url: "https://www.walmart.com/account/login",
    login_steps: &[
        LoginStep::FillUsername("#email-input"),
        LoginStep::FillPassword("#password-input"),
        LoginStep::Click("#sign-in-form-submit-btn"),
    ],
    signed_in_probe: "[data-automation-id=\"account-greeting\"]",
    login_form_probe: "#email-input",
    orders_url: "https://www.walmart.com/account/orders",
    order_date_selector: "[data-automation-id=\"order-date\"]",
    invoice_selectors: &[
        "[data-automation-id*=\"invoice\"]",
        "[data-automation-id*=\"receipt\"]",
        "[data-testid*=\"invoice\"]",
        "[data-testid*=\"receipt\"]",
        "a[href*=\"invoice\"]",
    ],
};

pub static AMAZON: PortalSpec = PortalSpec {
    portal: Portal::Amazon,
    login_url: "https://www.amazon.com/ap/signin",
    login_steps: &[
        LoginStep::FillUsername("#ap_email"),
        LoginStep::Click("#continue"),
        LoginStep::FillPassword("#ap_password"),
        LoginStep::Click("#signInSubmit"),
    ],
    signed_in_probe: "#nav-item-signout",
    login_form_probe: "#ap_email",
    orders_url: "https://www.amazon.com/gp/your-account/order-history",
    order_date_selector: ".order-info .a-span3 .a-color-secondary.value",
    invoice_selectors: &[
        "a[href*=\"invoice\"]",
        "[data-testid*=\"invoice\"]",
        "a[href*=\"order-summary\"]",
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_keys_are_stable() {
        assert_eq!(Portal::Walmart.key(), "walmart");
        assert_eq!(Portal::Amazon.key(), "amazon");
        assert_eq!(Portal::Walmart.to_string(), "walmart");
    }

    #[test]
    fn specs_map_back_to_their_portal() {
        assert_eq!(Portal::Walmart.spec().portal, Portal::Walmart);
        assert_eq!(Portal::Amazon.spec().portal, Portal::Amazon);
    }

    #[test]
    fn amazon_login_is_two_step() {
        let fills_before_continue = AMAZON
            .login_steps
            .iter()
            .take_while(|s| !matches!(s, LoginStep::Click("#continue")))
            .filter(|s| matches!(s, LoginStep::FillUsername(_)))
            .count();
        assert_eq!(fills_before_continue, 1);
        assert!(matches!(
            AMAZON.login_steps.last(),
            Some(LoginStep::Click("#signInSubmit"))
        ));
    }

    #[test]
    fn every_spec_has_an_invoice_ladder() {
        for spec in [&WALMART, &AMAZON] {
            assert!(!spec.invoice_selectors.is_empty());
            assert!(!spec.login_steps.is_empty());
        }
    }
}
