//! # invorg
//!
//! Fetches invoice documents from company email inboxes and retail portals
//! (Walmart, Amazon) and files them into a per-company, per-month tree.
//!
//! ## Usage
//!
//! ```bash
//! invorg --company Acme --days 30 [--email-only|--web-only] [--manual-mode]
//! ```
//!
//! ## Modules
//!
//! - `browser` - Browser automation seam and its Chromium implementation
//! - `config` - Per-company configuration from environment key-value storage
//! - `email` - Read-only IMAP retrieval of document attachments
//! - `interaction` - Operator prompts for manual login modes
//! - `orchestrator` - The {companies} x {channels} run matrix
//! - `organizer` - Duplicate-aware filing into the downloads tree
//! - `portals` - Portal login/order-page definitions and invoice retrieval
//! - `retry` - Transient-failure detection and single-backoff retry
//! - `session` - Persisted portal sessions with restore-and-validate

pub mod browser;
pub mod config;
pub mod email;
pub mod error;
pub mod interaction;
pub mod orchestrator;
pub mod organizer;
pub mod portals;
pub mod retry;
pub mod session;
