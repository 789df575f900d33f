//! File organizer: destination layout and idempotent, duplicate-aware
//! writes.
//!
//! Destination is `<base>/<company>/<YYYY-MM>/<channel>_<name>`. Identical
//! content (by SHA-256) anywhere in a filename family is a no-op; different
//! content under a taken name gets the next `_<n>` suffix. Writes go
//! through a temp file in the destination directory and a rename.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;

/// What `store` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// New file written at the primary destination.
    Written,
    /// Identical content already present; nothing written.
    SkippedDuplicate,
    /// Name was taken by different content; written under a suffixed name.
    RenamedWithSuffix,
}

/// A filed document: where it lives and its content fingerprint.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub fingerprint: String,
    pub outcome: StoreOutcome,
}

pub struct FileOrganizer {
    base: PathBuf,
}

impl FileOrganizer {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory for a company's files dated `when`.
    pub fn month_dir(&self, company: &str, when: DateTime<Utc>) -> PathBuf {
        self.base
            .join(company)
            .join(when.format("%Y-%m").to_string())
    }

    /// File `bytes` under the company/month tree.
    pub fn store(
        &self,
        company: &str,
        channel: &str,
        when: DateTime<Utc>,
        filename: &str,
        bytes: &[u8],
    ) -> Result<FileRecord> {
        let dir = self.month_dir(company, when);
        std::fs::create_dir_all(&dir)?;

        let name = format!("{channel}_{}", sanitize_filename(filename, when));
        let (stem, ext) = split_name(&name);
        let fingerprint = fingerprint_hex(bytes);

        let mut suffix = 0u32;
        loop {
            let candidate = if suffix == 0 {
                dir.join(&name)
            } else if ext.is_empty() {
                dir.join(format!("{stem}_{suffix}"))
            } else {
                dir.join(format!("{stem}_{suffix}.{ext}"))
            };

            if !candidate.exists() {
                write_atomic(&dir, &candidate, bytes)?;
                let outcome = if suffix == 0 {
                    StoreOutcome::Written
                } else {
                    StoreOutcome::RenamedWithSuffix
                };
                debug!("filed {} ({outcome:?})", candidate.display());
                return Ok(FileRecord {
                    path: candidate,
                    fingerprint,
                    outcome,
                });
            }

            let existing = std::fs::read(&candidate)?;
            if fingerprint_hex(&existing) == fingerprint {
                debug!("duplicate content, skipping {}", candidate.display());
                return Ok(FileRecord {
                    path: candidate,
                    fingerprint,
                    outcome: StoreOutcome::SkippedDuplicate,
                });
            }

            suffix += 1;
        }
    }
}

fn fingerprint_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    // Temp file lives in the destination directory so persist() is a
    // same-filesystem rename.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Strip characters that are unsafe in filenames; fall back to a
/// timestamped name when nothing usable is left.
pub fn sanitize_filename(filename: &str, when: DateTime<Utc>) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

    let cleaned = unsafe_chars.replace_all(filename.trim(), "_").to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        format!("document_{}.pdf", when.format("%Y%m%d_%H%M%S"))
    } else {
        cleaned
    }
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn files_into_company_month_layout() {
        let tmp = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(tmp.path());

        let record = organizer
            .store("Acme", "email", when(), "invoice.pdf", b"content")
            .unwrap();

        assert_eq!(record.outcome, StoreOutcome::Written);
        assert_eq!(
            record.path,
            tmp.path().join("Acme").join("2024-03").join("email_invoice.pdf")
        );
        assert_eq!(std::fs::read(&record.path).unwrap(), b"content");
    }

    #[test]
    fn identical_content_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(tmp.path());

        let first = organizer
            .store("Acme", "email", when(), "invoice.pdf", b"same")
            .unwrap();
        let second = organizer
            .store("Acme", "email", when(), "invoice.pdf", b"same")
            .unwrap();

        assert_eq!(second.outcome, StoreOutcome::SkippedDuplicate);
        assert_eq!(second.path, first.path);
        let entries = std::fs::read_dir(first.path.parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn different_content_gets_a_suffix() {
        let tmp = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(tmp.path());

        let first = organizer
            .store("Acme", "walmart", when(), "invoice.pdf", b"one")
            .unwrap();
        let second = organizer
            .store("Acme", "walmart", when(), "invoice.pdf", b"two")
            .unwrap();

        assert_eq!(second.outcome, StoreOutcome::RenamedWithSuffix);
        assert_ne!(second.path, first.path);
        assert!(second
            .path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("_1.pdf"));
        // The original is untouched.
        assert_eq!(std::fs::read(&first.path).unwrap(), b"one");
    }

    #[test]
    fn duplicate_found_among_suffixed_names_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(tmp.path());

        organizer
            .store("Acme", "walmart", when(), "invoice.pdf", b"one")
            .unwrap();
        organizer
            .store("Acme", "walmart", when(), "invoice.pdf", b"two")
            .unwrap();
        // Refiling the suffixed content hits the existing _1 file.
        let third = organizer
            .store("Acme", "walmart", when(), "invoice.pdf", b"two")
            .unwrap();
        assert_eq!(third.outcome, StoreOutcome::SkippedDuplicate);
    }

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(
            sanitize_filename("a/b\\c:d.pdf", when()),
            "a_b_c_d.pdf".to_string()
        );
        assert_eq!(sanitize_filename("inv?*oice.pdf", when()), "inv__oice.pdf");
    }

    #[test]
    fn empty_filename_falls_back_to_timestamped_name() {
        let name = sanitize_filename("???", when());
        assert!(name.starts_with("document_2024"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn extensionless_names_suffix_cleanly() {
        let tmp = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(tmp.path());

        organizer
            .store("Acme", "email", when(), "receipt", b"one")
            .unwrap();
        let second = organizer
            .store("Acme", "email", when(), "receipt", b"two")
            .unwrap();
        assert!(second
            .path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("receipt_1"));
    }
}
