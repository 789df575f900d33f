//! Operator interaction for semi-interactive login flows.
//!
//! Manual and manual-assist session modes block on an explicit operator
//! prompt ("challenge cleared, press Enter") with a bounded or unbounded
//! deadline. The trait keeps session logic testable without a console.

use std::io::{self, Write};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Trait for operator prompts and user-facing progress output.
#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Block until the operator confirms completion of a manual step.
    ///
    /// `deadline` of `None` waits indefinitely. Returns
    /// [`Error::ChallengeTimeout`] when the deadline elapses first.
    async fn wait_for_confirmation(&self, message: &str, deadline: Option<Duration>)
        -> Result<()>;

    /// Display information message
    fn display_info(&self, message: &str);

    /// Display warning message
    fn display_warning(&self, message: &str);

    /// Display error message
    fn display_error(&self, message: &str);

    /// Display success message
    fn display_success(&self, message: &str);

    /// Display progress message
    fn display_progress(&self, message: &str);
}

/// Console-backed implementation: prompts on stdout, reads stdin.
pub struct ConsoleInteraction;

impl Default for ConsoleInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleInteraction {
    pub fn new() -> Self {
        Self
    }

    async fn read_enter() -> Result<()> {
        // Stdin reads are blocking; keep them off the runtime threads.
        tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("stdin task failed: {e}")))?
    }
}

#[async_trait]
impl UserInteraction for ConsoleInteraction {
    async fn wait_for_confirmation(
        &self,
        message: &str,
        deadline: Option<Duration>,
    ) -> Result<()> {
        match deadline {
            Some(limit) => print!("{message} (press Enter when done, {limit:?} limit) "),
            None => print!("{message} (press Enter when done) "),
        }
        io::stdout().flush()?;

        match deadline {
            None => Self::read_enter().await,
            Some(limit) => timeout(limit, Self::read_enter())
                .await
                .map_err(|_| {
                    Error::ChallengeTimeout(format!(
                        "operator did not confirm within {limit:?}"
                    ))
                })?,
        }
    }

    fn display_info(&self, message: &str) {
        println!("ℹ️  {message}");
    }

    fn display_warning(&self, message: &str) {
        eprintln!("⚠️  {message}");
    }

    fn display_error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn display_success(&self, message: &str) {
        println!("✅ {message}");
    }

    fn display_progress(&self, message: &str) {
        println!("🔄 {message}");
    }
}

/// Scripted interaction for tests: confirms after a fixed delay.
pub struct ScriptedInteraction {
    confirm_after: Duration,
}

impl ScriptedInteraction {
    pub fn confirming_after(confirm_after: Duration) -> Self {
        Self { confirm_after }
    }

    /// Confirms immediately.
    pub fn immediate() -> Self {
        Self::confirming_after(Duration::ZERO)
    }
}

#[async_trait]
impl UserInteraction for ScriptedInteraction {
    async fn wait_for_confirmation(
        &self,
        _message: &str,
        deadline: Option<Duration>,
    ) -> Result<()> {
        let wait = tokio::time::sleep(self.confirm_after);
        match deadline {
            None => {
                wait.await;
                Ok(())
            }
            Some(limit) => timeout(limit, wait).await.map_err(|_| {
                Error::ChallengeTimeout(format!("operator did not confirm within {limit:?}"))
            }),
        }
    }

    fn display_info(&self, _message: &str) {}
    fn display_warning(&self, _message: &str) {}
    fn display_error(&self, _message: &str) {}
    fn display_success(&self, _message: &str) {}
    fn display_progress(&self, _message: &str) {}
}
