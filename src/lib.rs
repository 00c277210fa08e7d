//! slotwatch -- watches a driving-test booking site for an earlier
//! appointment and optionally rebooks it.
//!
//! The crate is built around a periodic [`scheduler::Scheduler`] that runs one
//! [`session::BookingSession`] at a time against a browser acquired through a
//! [`driver::DriverLauncher`], reports outcomes to an [`activity::ActivityLog`]
//! and sends operator messages through a [`notify::Notifier`].

pub mod activity;
pub mod api;
pub mod baseline;
pub mod config;
pub mod driver;
pub mod error;
pub mod humanize;
pub mod notify;
pub mod scheduler;
pub mod session;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::baseline::BaselineStore;
use crate::config::AppConfig;
use crate::driver::webdriver::WebDriverLauncher;
use crate::scheduler::Scheduler;
use crate::session::SessionReport;

/// Scheduler wired to chromedriver, the configured notifier and, when a
/// path is set, the baseline file.
pub fn build_scheduler(app: &AppConfig) -> Result<Scheduler> {
    let launcher = WebDriverLauncher::new(&app.browser.webdriver_url)
        .context("failed to create webdriver client")?;
    let notifier = notify::from_config(&app.notify)?;

    let mut scheduler = Scheduler::new(Arc::new(launcher), notifier);
    if let Some(path) = app
        .state
        .baseline_path
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
    {
        scheduler = scheduler.with_baseline_store(BaselineStore::new(path));
    }
    Ok(scheduler)
}

/// Run a single on-demand session.
pub async fn check_once(app: &AppConfig) -> Result<SessionReport> {
    let config = app.run_config().context("invalid configuration")?;
    let scheduler = build_scheduler(app)?;
    let report = scheduler
        .run_once(config)
        .await
        .context("check task failed")?;
    Ok(report)
}

/// Start the slotwatch daemon: API server plus, unless disabled, the
/// periodic check loop.
pub async fn serve(app: &AppConfig, bind: &str, autostart: bool) -> Result<()> {
    // 1. Validate configuration
    let config = app.run_config().context("invalid configuration")?;

    // 2. Initialize Scheduler
    let scheduler = build_scheduler(app)?;

    // 3. Start check loop (background task)
    if autostart {
        scheduler.start(config.clone())?;
    } else {
        tracing::info!("autostart disabled; use POST /api/v1/run/start");
    }

    // 4. Start API Server
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;
    let router = api::router(api::state::AppState {
        scheduler: scheduler.clone(),
        config: Arc::new(config),
    });

    tracing::info!(%addr, "slotwatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let status = scheduler.stop().await;
    tracing::info!(%status, "slotwatch shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
