//! Company configuration loaded from environment-style key-value storage.
//!
//! One numbered block per company (`COMPANY_COUNT`, then `COMPANY_<n>_*`
//! credential fields). Loading goes through a lookup seam so tests can
//! supply a plain map instead of mutating the process environment.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_IMAP_SERVER: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_DOWNLOAD_PATH: &str = "./downloads";

/// IMAP credentials for a company inbox.
#[derive(Clone)]
pub struct EmailConfig {
    pub address: String,
    pub password: String,
    pub imap_server: String,
    pub imap_port: u16,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Passwords never appear in Debug output or logs.
        f.debug_struct("EmailConfig")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("imap_server", &self.imap_server)
            .field("imap_port", &self.imap_port)
            .finish()
    }
}

/// Login credentials for a web portal.
#[derive(Clone)]
pub struct PortalCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-company configuration. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct CompanyConfig {
    pub name: String,
    pub email: Option<EmailConfig>,
    pub walmart: Option<PortalCredentials>,
    pub amazon: Option<PortalCredentials>,
}

impl CompanyConfig {
    /// True when at least one channel has credentials configured.
    pub fn has_any_channel(&self) -> bool {
        self.email.is_some() || self.walmart.is_some() || self.amazon.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub companies: Vec<CompanyConfig>,
    pub base_download_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key-value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let count = match lookup("COMPANY_COUNT") {
            None => 0,
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("COMPANY_COUNT is not a number: {raw:?}"))
            })?,
        };

        let mut companies = Vec::with_capacity(count);
        for i in 1..=count {
            let prefix = format!("COMPANY_{i}_");
            companies.push(load_company(&lookup, &prefix, i)?);
        }

        let base_download_path = lookup("BASE_DOWNLOAD_PATH")
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_PATH.to_string())
            .into();

        Ok(Self {
            companies,
            base_download_path,
        })
    }

    /// Find a company by name, case-insensitively.
    pub fn find_company(&self, name: &str) -> Option<&CompanyConfig> {
        self.companies
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

fn load_company<F>(lookup: &F, prefix: &str, index: usize) -> Result<CompanyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let name = lookup(&format!("{prefix}NAME")).unwrap_or_else(|| format!("Company_{index}"));

    let email = match lookup(&format!("{prefix}EMAIL")) {
        None => None,
        Some(address) => {
            let password = lookup(&format!("{prefix}EMAIL_PASSWORD")).ok_or_else(|| {
                Error::Config(format!("{name}: {prefix}EMAIL set without {prefix}EMAIL_PASSWORD"))
            })?;
            let imap_server = lookup(&format!("{prefix}IMAP_SERVER"))
                .unwrap_or_else(|| DEFAULT_IMAP_SERVER.to_string());
            let imap_port = match lookup(&format!("{prefix}IMAP_PORT")) {
                None => DEFAULT_IMAP_PORT,
                Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                    Error::Config(format!("{name}: {prefix}IMAP_PORT is not a port: {raw:?}"))
                })?,
            };
            Some(EmailConfig {
                address,
                password,
                imap_server,
                imap_port,
            })
        }
    };

    let walmart = load_portal_credentials(lookup, prefix, &name, "WALMART")?;
    let amazon = load_portal_credentials(lookup, prefix, &name, "AMAZON")?;

    Ok(CompanyConfig {
        name,
        email,
        walmart,
        amazon,
    })
}

fn load_portal_credentials<F>(
    lookup: &F,
    prefix: &str,
    company: &str,
    portal: &str,
) -> Result<Option<PortalCredentials>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(&format!("{prefix}{portal}_USERNAME")) {
        None => Ok(None),
        Some(username) => {
            let password = lookup(&format!("{prefix}{portal}_PASSWORD")).ok_or_else(|| {
                Error::Config(format!(
                    "{company}: {prefix}{portal}_USERNAME set without {prefix}{portal}_PASSWORD"
                ))
            })?;
            Ok(Some(PortalCredentials { username, password }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_no_companies() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(config.companies.is_empty());
        assert_eq!(config.base_download_path, PathBuf::from("./downloads"));
    }

    #[test]
    fn loads_company_with_defaults() {
        let lookup = lookup_from(&[
            ("COMPANY_COUNT", "1"),
            ("COMPANY_1_EMAIL", "acct@acme.test"),
            ("COMPANY_1_EMAIL_PASSWORD", "app-pass"),
        ]);
        let config = Config::from_lookup(lookup).unwrap();
        assert_eq!(config.companies.len(), 1);

        let company = &config.companies[0];
        assert_eq!(company.name, "Company_1");
        let email = company.email.as_ref().unwrap();
        assert_eq!(email.imap_server, DEFAULT_IMAP_SERVER);
        assert_eq!(email.imap_port, DEFAULT_IMAP_PORT);
        assert!(company.walmart.is_none());
        assert!(company.amazon.is_none());
    }

    #[test]
    fn loads_full_company_block() {
        let lookup = lookup_from(&[
            ("COMPANY_COUNT", "1"),
            ("COMPANY_1_NAME", "Acme"),
            ("COMPANY_1_EMAIL", "acct@acme.test"),
            ("COMPANY_1_EMAIL_PASSWORD", "app-pass"),
            ("COMPANY_1_IMAP_SERVER", "mail.acme.test"),
            ("COMPANY_1_IMAP_PORT", "1993"),
            ("COMPANY_1_WALMART_USERNAME", "acme-w"),
            ("COMPANY_1_WALMART_PASSWORD", "pw1"),
            ("COMPANY_1_AMAZON_USERNAME", "acme-a"),
            ("COMPANY_1_AMAZON_PASSWORD", "pw2"),
            ("BASE_DOWNLOAD_PATH", "/srv/invoices"),
        ]);
        let config = Config::from_lookup(lookup).unwrap();
        let company = &config.companies[0];
        assert_eq!(company.name, "Acme");
        assert_eq!(company.email.as_ref().unwrap().imap_port, 1993);
        assert_eq!(company.walmart.as_ref().unwrap().username, "acme-w");
        assert_eq!(company.amazon.as_ref().unwrap().username, "acme-a");
        assert_eq!(config.base_download_path, PathBuf::from("/srv/invoices"));
    }

    #[test]
    fn rejects_half_specified_portal_credentials() {
        let lookup = lookup_from(&[
            ("COMPANY_COUNT", "1"),
            ("COMPANY_1_WALMART_USERNAME", "acme-w"),
        ]);
        let err = Config::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("WALMART_PASSWORD"));
    }

    #[test]
    fn rejects_email_without_password() {
        let lookup = lookup_from(&[
            ("COMPANY_COUNT", "1"),
            ("COMPANY_1_EMAIL", "acct@acme.test"),
        ]);
        assert!(matches!(
            Config::from_lookup(lookup),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_malformed_count() {
        let lookup = lookup_from(&[("COMPANY_COUNT", "several")]);
        assert!(matches!(
            Config::from_lookup(lookup),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn find_company_is_case_insensitive() {
        let lookup = lookup_from(&[("COMPANY_COUNT", "1"), ("COMPANY_1_NAME", "Acme")]);
        let config = Config::from_lookup(lookup).unwrap();
        assert!(config.find_company("acme").is_some());
        assert!(config.find_company("ACME").is_some());
        assert!(config.find_company("globex").is_none());
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let email = EmailConfig {
            address: "a@b.c".into(),
            password: "secret".into(),
            imap_server: DEFAULT_IMAP_SERVER.into(),
            imap_port: DEFAULT_IMAP_PORT,
        };
        let rendered = format!("{email:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
