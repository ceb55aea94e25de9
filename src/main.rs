use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use sunatsync::config::{default_config_path, Config, ResolvedConfig};
use sunatsync::credentials::{PortalCredentials, RUC_ENV, SECRET_ENV, USER_ENV};
use sunatsync::portal::chromium::ChromiumBrowser;
use sunatsync::SyncOrchestrator;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sunatsync")]
#[command(about = "Reconcile SUNAT declarations, payments and NPS records")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Log in, read all listings and print the report as JSON
    Run {
        /// Taxpayer RUC (11 digits)
        #[arg(long, env = RUC_ENV)]
        ruc: String,

        /// SOL username
        #[arg(long, env = USER_ENV)]
        user: String,

        /// Environment variable holding the SOL password
        #[arg(long, default_value = SECRET_ENV)]
        secret_env: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off",
            )
        }))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Config => {
            let config = Config::load_or_default(&cli.config)?;
            let resolved = ResolvedConfig::load_or_default(&cli.config)?;
            println!("# Config file: {}", cli.config.display());
            println!("# Session file: {}", resolved.session_file.display());
            println!();
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render config")?
            );
        }
        Command::Run {
            ruc,
            user,
            secret_env,
        } => {
            let config = ResolvedConfig::load_or_default(&cli.config)?;
            let secret = std::env::var(&secret_env)
                .with_context(|| format!("Environment variable {secret_env} is not set"))?;
            let credentials = PortalCredentials::new(ruc, user, SecretString::from(secret))?;

            let browser = ChromiumBrowser::launch(&config.browser).await?;
            let browser = Arc::new(browser);
            let orchestrator = SyncOrchestrator::new(browser.clone(), config);
            let result = orchestrator.run(&credentials).await;
            drop(orchestrator);

            if let Ok(browser) = Arc::try_unwrap(browser) {
                if let Err(e) = browser.close().await {
                    tracing::warn!(error = %e, "Failed to close browser");
                }
            }

            let report = result?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
