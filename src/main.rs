//! Command line entry point: load settings, register sinks, watch until
//! interrupted.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use logwatchdog::logging::init_logging;
use logwatchdog::{
    CliArgs, ConfigError, ConfigProvider, DesktopSink, EmailSink, MonitorLoop, SinkRegistry,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; settings may come from flags or the environment.
    let dotenv = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_logging(args.verbose);

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is::<ConfigError>() => {
            error!("configuration error: {e:#}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(provider: &impl ConfigProvider) -> Result<()> {
    let config = provider
        .monitor_config()
        .context("Failed to load monitor settings")?;

    let mut sinks = SinkRegistry::new();
    match provider
        .email_config()
        .context("Failed to load email settings")?
    {
        Some(email) => {
            let sink = EmailSink::new(&email).context("Failed to set up email alerts")?;
            sinks = sinks.with_sink(sink);
            info!(
                relay = %email.server,
                recipients = %email.recipients.join(", "),
                "email alerts enabled"
            );
        }
        None => warn!("SMTP_SERVER not set, email alerts disabled"),
    }
    if provider.popup_enabled() {
        sinks = sinks.with_sink(DesktopSink::default());
    }
    if sinks.is_empty() {
        warn!("no notification sinks registered, alerts will only be logged");
    }

    let monitor = MonitorLoop::new(config, sinks);
    monitor.run(shutdown_signal()).await;
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, stopping"),
        _ = terminate => info!("received SIGTERM, stopping"),
    }
}
