//! Run orchestration: the {companies} × {channels} matrix.
//!
//! Each cell runs independently; one cell's failure is recorded and the
//! run moves on. The channel work itself sits behind [`ChannelExecutor`]
//! so the matrix logic is testable without mail servers or browsers.

pub mod executor;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::CompanyConfig;
use crate::error::Result;
use crate::interaction::UserInteraction;
use crate::portals::Portal;

pub use executor::LiveChannelExecutor;

/// An invoice source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Walmart,
    Amazon,
}

impl Channel {
    pub fn all() -> &'static [Channel] {
        &[Channel::Email, Channel::Walmart, Channel::Amazon]
    }

    /// Filename prefix and summary label.
    pub fn key(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Walmart => "walmart",
            Channel::Amazon => "amazon",
        }
    }

    /// The portal behind this channel, when it is a web channel.
    pub fn portal(&self) -> Option<Portal> {
        match self {
            Channel::Email => None,
            Channel::Walmart => Some(Portal::Walmart),
            Channel::Amazon => Some(Portal::Amazon),
        }
    }

    /// Whether `company` carries credentials for this channel.
    pub fn configured_for(&self, company: &CompanyConfig) -> bool {
        match self {
            Channel::Email => company.email.is_some(),
            Channel::Walmart => company.walmart.is_some(),
            Channel::Amazon => company.amazon.is_some(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One cell's work order.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub company: String,
    pub channel: Channel,
    pub base_dir: PathBuf,
    pub since: DateTime<Utc>,
}

/// What happened in one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellStatus {
    Completed { files: usize },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CellOutcome {
    pub company: String,
    pub channel: Channel,
    pub status: CellStatus,
}

/// Per-cell results for the whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub cells: Vec<CellOutcome>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c.status, CellStatus::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c.status, CellStatus::Failed(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c.status, CellStatus::Skipped(_)))
            .count()
    }

    pub fn total_files(&self) -> usize {
        self.cells
            .iter()
            .map(|c| match c.status {
                CellStatus::Completed { files } => files,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary:")?;
        for cell in &self.cells {
            let status = match &cell.status {
                CellStatus::Completed { files } => format!("ok ({files} files)"),
                CellStatus::Skipped(reason) => format!("skipped: {reason}"),
                CellStatus::Failed(reason) => format!("FAILED: {reason}"),
            };
            writeln!(f, "  {} / {}: {status}", cell.company, cell.channel)?;
        }
        write!(
            f,
            "{} completed, {} skipped, {} failed, {} files filed",
            self.completed(),
            self.skipped(),
            self.failed(),
            self.total_files()
        )
    }
}

/// Executes the actual channel work for one cell.
#[async_trait]
pub trait ChannelExecutor: Send + Sync {
    /// Run one (company, channel) cell, returning the number of files filed.
    async fn run(&self, company: &CompanyConfig, task: &DownloadTask) -> Result<usize>;
}

pub struct Orchestrator<'a> {
    executor: &'a dyn ChannelExecutor,
    interaction: &'a dyn UserInteraction,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: &'a dyn ChannelExecutor, interaction: &'a dyn UserInteraction) -> Self {
        Self {
            executor,
            interaction,
        }
    }

    /// Process every (company, channel) cell sequentially. No cell's
    /// failure stops the run; the summary records each outcome.
    pub async fn run(
        &self,
        companies: &[CompanyConfig],
        channels: &[Channel],
        base_dir: &Path,
        since: DateTime<Utc>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        for company in companies {
            self.interaction
                .display_progress(&format!("Processing company: {}", company.name));

            for &channel in channels {
                let status = self.run_cell(company, channel, base_dir, since).await;
                match &status {
                    CellStatus::Completed { files } => {
                        info!(company = %company.name, %channel, files, "cell completed");
                        self.interaction.display_success(&format!(
                            "{}/{}: {files} file(s) filed",
                            company.name, channel
                        ));
                    }
                    CellStatus::Skipped(reason) => {
                        info!(company = %company.name, %channel, reason = %reason, "cell skipped");
                        self.interaction.display_info(&format!(
                            "{}/{}: skipped ({reason})",
                            company.name, channel
                        ));
                    }
                    CellStatus::Failed(reason) => {
                        error!(company = %company.name, %channel, reason = %reason, "cell failed");
                        self.interaction.display_error(&format!(
                            "{}/{}: {reason}",
                            company.name, channel
                        ));
                    }
                }
                summary.cells.push(CellOutcome {
                    company: company.name.clone(),
                    channel,
                    status,
                });
            }
        }

        summary
    }

    async fn run_cell(
        &self,
        company: &CompanyConfig,
        channel: Channel,
        base_dir: &Path,
        since: DateTime<Utc>,
    ) -> CellStatus {
        if !channel.configured_for(company) {
            return CellStatus::Skipped("no credentials configured".into());
        }

        let task = DownloadTask {
            company: company.name.clone(),
            channel,
            base_dir: base_dir.to_path_buf(),
            since,
        };

        match self.executor.run(company, &task).await {
            Ok(files) => CellStatus::Completed { files },
            Err(e) => CellStatus::Failed(e.to_string()),
        }
    }
}
