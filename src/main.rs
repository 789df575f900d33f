use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use clap::{CommandFactory, Parser};
use tracing::{debug, error};

use invorg::browser::BrowserOptions;
use invorg::config::Config;
use invorg::interaction::{ConsoleInteraction, UserInteraction};
use invorg::orchestrator::{Channel, LiveChannelExecutor, Orchestrator};
use invorg::session::{LoginMode, SessionTimeouts};

/// Fetch invoices from email inboxes and retail portals and file them per
/// company and month
#[derive(Parser)]
#[command(name = "invorg")]
#[command(about = "Invoice organizer - fetch and file invoice documents", long_about = None)]
struct Cli {
    /// List all configured companies and exit
    #[arg(long)]
    list_companies: bool,

    /// Process a specific company by name (case-insensitive)
    #[arg(long, conflicts_with = "all")]
    company: Option<String>,

    /// Process all configured companies
    #[arg(long)]
    all: bool,

    /// Only process the email channel
    #[arg(long, conflicts_with_all = ["web_only", "walmart_only", "amazon_only"])]
    email_only: bool,

    /// Only process web portals (Walmart and Amazon)
    #[arg(long, conflicts_with_all = ["walmart_only", "amazon_only"])]
    web_only: bool,

    /// Only process Walmart
    #[arg(long, conflicts_with = "amazon_only")]
    walmart_only: bool,

    /// Only process Amazon
    #[arg(long)]
    amazon_only: bool,

    /// Number of days back to search for invoices (default: 30)
    #[arg(long, default_value = "30")]
    days: i64,

    /// Timeout in seconds for web operations (default: 30)
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Timeout in seconds for manual authentication steps
    #[arg(long)]
    manual_timeout: Option<u64>,

    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// Fill credentials, then wait for operator confirmation after login
    /// (unlimited time for CAPTCHA/2FA unless --manual-timeout is set)
    #[arg(long, conflicts_with = "pure_manual")]
    manual_mode: bool,

    /// Skip automatic form filling and log in completely manually
    #[arg(long)]
    pure_manual: bool,

    /// Reuse a persistent browser profile instead of a fresh session
    #[arg(long)]
    persistent_browser: bool,

    /// Disable incognito mode for the browser
    #[arg(long)]
    no_incognito: bool,

    /// Directory for persisted portal sessions (default: ./sessions)
    #[arg(long, default_value = "sessions")]
    session_dir: PathBuf,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl Cli {
    fn channels(&self) -> Vec<Channel> {
        if self.email_only {
            vec![Channel::Email]
        } else if self.walmart_only {
            vec![Channel::Walmart]
        } else if self.amazon_only {
            vec![Channel::Amazon]
        } else if self.web_only {
            vec![Channel::Walmart, Channel::Amazon]
        } else {
            Channel::all().to_vec()
        }
    }

    fn login_mode(&self) -> LoginMode {
        if self.pure_manual {
            LoginMode::PureManual
        } else if self.manual_mode {
            LoginMode::ManualAssist
        } else {
            LoginMode::Automatic
        }
    }

    fn session_timeouts(&self) -> SessionTimeouts {
        let manual = match (self.manual_mode, self.manual_timeout) {
            // Manual-assist without an explicit bound waits indefinitely,
            // as does an explicit zero.
            (true, None) | (_, Some(0)) => None,
            (_, timeout) => Some(Duration::from_secs(timeout.unwrap_or(60))),
        };
        SessionTimeouts {
            automation: Duration::from_secs(self.timeout),
            manual,
        }
    }

    fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            incognito: !self.no_incognito,
            profile_dir: self
                .persistent_browser
                .then(|| PathBuf::from("browser_profile")),
            nav_timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("invorg started with verbosity level: {}", cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // .env is optional; missing files are fine.
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    let interaction: Arc<dyn UserInteraction> = Arc::new(ConsoleInteraction::new());

    if cli.list_companies {
        list_companies(&config);
        return Ok(());
    }

    if config.companies.is_empty() {
        interaction.display_warning("No companies configured. Please set up your .env file.");
        return Ok(());
    }

    let companies: Vec<_> = if let Some(name) = &cli.company {
        match config.find_company(name) {
            Some(company) => vec![company.clone()],
            None => anyhow::bail!(
                "Company '{name}' not found. Use --list-companies to see available companies."
            ),
        }
    } else if cli.all {
        config.companies.clone()
    } else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if cli.headless && cli.login_mode() != LoginMode::Automatic {
        interaction.display_warning(
            "Manual login modes need a visible browser; the challenge cannot be cleared headless.",
        );
    }

    let since = Utc::now() - ChronoDuration::days(cli.days);
    let executor = LiveChannelExecutor::new(
        cli.session_dir.clone(),
        Arc::clone(&interaction),
        cli.browser_options(),
        cli.login_mode(),
        cli.session_timeouts(),
    );

    let orchestrator = Orchestrator::new(&executor, interaction.as_ref());
    let summary = orchestrator
        .run(
            &companies,
            &cli.channels(),
            &config.base_download_path,
            since,
        )
        .await;

    println!("\n{summary}");
    Ok(())
}

fn list_companies(config: &Config) {
    println!("\nConfigured Companies:");
    println!("=====================");

    if config.companies.is_empty() {
        println!("No companies configured. Please set up your .env file.");
        return;
    }

    for (i, company) in config.companies.iter().enumerate() {
        println!("{}. {}", i + 1, company.name);
        match &company.email {
            Some(email) => println!("   Email: {}", email.address),
            None => println!("   Email: Not configured"),
        }
        match &company.walmart {
            Some(creds) => println!("   Walmart: {}", creds.username),
            None => println!("   Walmart: Not configured"),
        }
        match &company.amazon {
            Some(creds) => println!("   Amazon: {}", creds.username),
            None => println!("   Amazon: Not configured"),
        }
        println!();
    }
}
