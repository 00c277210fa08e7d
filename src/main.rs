use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use slotwatch::config::{AppConfig, LoggingConfig};
use slotwatch::notify::{self, format_date};

#[derive(Parser)]
#[command(
    name = "slotwatch",
    about = "Watches a driving-test booking site for an earlier appointment",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $SLOTWATCH_CONFIG, then /etc/slotwatch/slotwatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + periodic checks)
    Serve {
        /// Bind address (overrides [api].bind)
        #[arg(long, env = "SLOTWATCH_BIND")]
        bind: Option<String>,

        /// Do not start the check loop until requested over the API
        #[arg(long)]
        no_autostart: bool,
    },

    /// Run one check now and print the outcome
    Check,

    /// Send a test notification to the configured endpoint
    TestNotification,

    /// Validate the configuration and print it with credentials masked
    ValidateConfig {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::discover(cli.config.as_deref())?;
    config.apply_env_overrides();
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind, no_autostart } => {
            let bind = bind.unwrap_or_else(|| config.api.bind.clone());
            tracing::info!(%bind, autostart = !no_autostart, "Starting slotwatch daemon");
            slotwatch::serve(&config, &bind, !no_autostart).await?;
        }
        Commands::Check => {
            tracing::info!("Running one check");
            let report = slotwatch::check_once(&config).await?;

            println!("\n=== slotwatch check ===");
            println!("Session:      {}", report.session_id);
            println!("Compared to:  {}", format_date(report.baseline));
            println!("Outcome:      {}", report.outcome);
            let notification = match report.notified {
                Some(true) => "sent",
                Some(false) => "not delivered",
                None => "none",
            };
            println!("Notification: {notification}");
            println!("=======================\n");
        }
        Commands::TestNotification => {
            let notifier = notify::from_config(&config.notify)?;
            if notify::send_test(notifier.as_ref()).await {
                println!("Test notification sent.");
            } else {
                anyhow::bail!("test notification could not be delivered");
            }
        }
        Commands::ValidateConfig { json } => {
            let result = config.run_config();
            let redacted = config.redacted();
            if json {
                let output = json!({
                    "valid": result.is_ok(),
                    "error": result.as_ref().err().map(|e| e.to_string()),
                    "config": redacted,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", toml::to_string_pretty(&redacted)?);
                if result.is_ok() {
                    println!("# configuration is valid");
                }
            }
            result?;
        }
    }

    Ok(())
}
