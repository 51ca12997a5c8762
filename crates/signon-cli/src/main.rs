//! signon CLI
//!
//! Runs one federated sign-in attempt against a web console and exits with
//! the outcome code. Every option can also come from the environment or a
//! `.env` file in the working directory.
//!
//!   GH_USERNAME=... GH_PASSWORD=... signon
//!   signon --headful --console-path /apps --report report.json

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use signon::{
    ChromeLauncher, CredentialInput, FlowConfig, LoginFlow, LoginReport, Selector,
    TelegramNotifier,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

mod duration_parser;
mod logging;

use duration_parser::parse_duration;

#[derive(Parser, Debug)]
#[command(name = "signon")]
#[command(about = "🔐 Automated console sign-in through a federated identity provider")]
struct Cli {
    /// Identity provider username
    #[clap(long, env = "GH_USERNAME", hide_env_values = true)]
    username: Option<String>,

    /// Identity provider password
    #[clap(long, env = "GH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Base32 TOTP seed for the second factor
    #[clap(long, env = "GH_2FA_SECRET", hide_env_values = true)]
    totp_secret: Option<String>,

    /// Telegram bot token; notifications are skipped without it
    #[clap(long, env = "TG_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Telegram chat id
    #[clap(long, env = "TG_CHAT_ID")]
    telegram_chat_id: Option<String>,

    /// Console URL to sign in to
    #[clap(long, env = "SIGNON_TARGET_URL")]
    target_url: Option<String>,

    /// Identity provider host
    #[clap(long, env = "SIGNON_PROVIDER_DOMAIN")]
    provider_domain: Option<String>,

    /// Where to save the final page screenshot
    #[clap(long, env = "SIGNON_SCREENSHOT")]
    screenshot: Option<PathBuf>,

    /// Write the run report as JSON to this path
    #[clap(long, env = "SIGNON_REPORT")]
    report: Option<PathBuf>,

    /// Selector that only exists once signed in (e.g. "#dashboard" or "a|Sign out")
    #[clap(long, env = "SIGNON_AUTHENTICATED_MARKER")]
    authenticated_marker: Option<String>,

    /// Console path prefix that counts as signed in (repeatable)
    #[clap(long = "console-path", env = "SIGNON_CONSOLE_PATHS", value_delimiter = ',')]
    console_paths: Vec<String>,

    /// Show the browser window
    #[clap(long, env = "SIGNON_HEADFUL")]
    headful: bool,

    /// Browser executable
    #[clap(long, env = "CHROME")]
    chrome: Option<PathBuf>,

    #[clap(long, env = "SIGNON_NAVIGATION_TIMEOUT", value_parser = parse_duration)]
    navigation_timeout: Option<Duration>,

    #[clap(long, env = "SIGNON_FEDERATED_BUTTON_TIMEOUT", value_parser = parse_duration)]
    federated_button_timeout: Option<Duration>,

    #[clap(long, env = "SIGNON_FEDERATED_REDIRECT_TIMEOUT", value_parser = parse_duration)]
    federated_redirect_timeout: Option<Duration>,

    #[clap(long, env = "SIGNON_INTERACTION_TIMEOUT", value_parser = parse_duration)]
    interaction_timeout: Option<Duration>,

    /// Upper bound for the second factor and consent checks
    #[clap(long, env = "SIGNON_SETTLE_TIMEOUT", value_parser = parse_duration)]
    settle_timeout: Option<Duration>,

    #[clap(long, env = "SIGNON_FINAL_REDIRECT_TIMEOUT", value_parser = parse_duration)]
    final_redirect_timeout: Option<Duration>,

    /// Verbose output
    #[clap(long, short)]
    verbose: bool,
}

impl Cli {
    fn flow_config(&self) -> FlowConfig {
        let mut config = FlowConfig::default();
        if let Some(url) = &self.target_url {
            config.target_url = url.clone();
        }
        if let Some(domain) = &self.provider_domain {
            config.provider_domain = domain.clone();
        }
        if let Some(path) = &self.screenshot {
            config.screenshot_path = path.clone();
        }
        config.authenticated_marker = self
            .authenticated_marker
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Selector::from);
        config.console_paths = self
            .console_paths
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let timeouts = &mut config.timeouts;
        let overrides = [
            (&mut timeouts.navigation, self.navigation_timeout),
            (&mut timeouts.federated_button, self.federated_button_timeout),
            (&mut timeouts.federated_redirect, self.federated_redirect_timeout),
            (&mut timeouts.interaction, self.interaction_timeout),
            (&mut timeouts.settle, self.settle_timeout),
            (&mut timeouts.final_redirect, self.final_redirect_timeout),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }
        config
    }

    fn launcher(&self, config: &FlowConfig) -> ChromeLauncher {
        ChromeLauncher {
            headless: !self.headful,
            executable: self.chrome.clone(),
            request_timeout: config.timeouts.navigation,
            ..Default::default()
        }
    }

    fn credentials(&self) -> CredentialInput {
        CredentialInput {
            username: self.username.clone(),
            password: self.password.clone(),
            second_factor_seed: self.totp_secret.clone(),
        }
    }
}

fn write_report(report: &LoginReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    debug!("report written to {}", path.display());
    Ok(())
}

fn print_summary(report: &LoginReport) {
    let summary = report.terminal.summary();
    if report.terminal.is_success() {
        println!("{} {}", "✅".green(), summary.green().bold());
    } else if report.exit_code() == 0 {
        println!("{} {}", "⚠️ ".yellow(), summary.yellow());
    } else {
        println!("{} {}", "❌".red(), summary.red().bold());
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = cli.flow_config();
    let launcher = Arc::new(cli.launcher(&config));
    let notifier = Arc::new(TelegramNotifier::new(
        cli.telegram_token.clone(),
        cli.telegram_chat_id.clone(),
    ));
    info!(
        target_url = %config.target_url,
        provider = %config.provider_domain,
        notifications = notifier.is_configured(),
        "starting sign-in"
    );

    let report = LoginFlow::new(config, launcher, notifier)
        .run(cli.credentials())
        .await;

    print_summary(&report);
    if let Some(path) = &cli.report {
        if let Err(e) = write_report(&report, path) {
            eprintln!("⚠️  {e:#}");
        }
    }

    std::process::exit(report.exit_code());
}
