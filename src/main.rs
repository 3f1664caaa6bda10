// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tailscale_bind_ddns::{
    cli::{Cli, Command, OutputFormat},
    config::Config,
    constants::CONNECTION_TEST_TIMEOUT,
    discovery::TailscaleClient,
    dns::{DnsUpdater, ZoneUpdater},
    metrics,
    pipeline::SyncPipeline,
    status::StatusReport,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
        return Ok(());
    }

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("tailscale-bind-ddns")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = cli.load_config();
    match &config {
        Ok(config) => init_logging(&config.general.log_level, &config.general.log_format),
        Err(_) => init_logging("info", "text"),
    }
    let config = config.inspect_err(|e| error!(error = %format!("{e:#}"), "Configuration error"))?;

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("A rustls crypto provider was already installed");
    }

    match cli.command {
        Command::Run => run(config).await,
        Command::Status { output } => print_status(&config, output),
        Command::Test => test_connections(&config).await,
        Command::Completions { .. } => Ok(()),
    }
}

/// Format: timestamp file:line LEVEL message
///
/// `RUST_LOG` overrides the configured level, `RUST_LOG_FORMAT` the
/// configured format.
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        tailnet = %config.tailscale.tailnet,
        zone = %config.sync.forward_zone,
        server = %config.sync.target,
        dry_run = config.sync.dry_run,
        "Starting tailscale-bind-ddns"
    );

    let source = TailscaleClient::new(
        &config.tailscale.api_base_url,
        &config.tailscale.tailnet,
        config.tailscale.auth.clone(),
    )?;
    let updater = DnsUpdater::new(
        config.sync.target.clone(),
        config.sync.credential.clone(),
        config.sync.forward_zone.clone(),
        config.sync.timeout,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let metrics_task = config.general.metrics_addr.map(|addr| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(addr, cancel).await {
                error!(addr = %addr, error = %e, "Metrics endpoint failed");
            }
        })
    });

    let result = SyncPipeline::new(config.sync, source, updater)
        .run(cancel.clone())
        .await;

    // Stops the metrics endpoint when the pipeline failed validation.
    cancel.cancel();
    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Metrics task terminated abnormally");
        }
    }

    let report = result.context("DNS server validation failed")?;
    if !report.all_stopped() {
        warn!("Not every pipeline stage reported a clean stop");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_on_signal(cancel: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, stopping pipeline");
    cancel.cancel();
}

fn print_status(config: &Config, output: OutputFormat) -> Result<()> {
    let report = StatusReport::from_config(config);
    match output {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to render status")?
        ),
    }
    Ok(())
}

async fn test_connections(config: &Config) -> Result<()> {
    info!(tailnet = %config.tailscale.tailnet, "Testing Tailscale API connection");
    let mut client = TailscaleClient::new(
        &config.tailscale.api_base_url,
        &config.tailscale.tailnet,
        config.tailscale.auth.clone(),
    )?;
    let devices = tokio::time::timeout(CONNECTION_TEST_TIMEOUT, client.list_endpoints())
        .await
        .context("Timed out listing Tailscale devices")?
        .context("Tailscale API connection failed")?;
    let online = devices.iter().filter(|d| d.online).count();
    info!(
        tailnet = %config.tailscale.tailnet,
        devices = devices.len(),
        online,
        "Tailscale API connection OK"
    );

    info!(server = %config.sync.target, zone = %config.sync.forward_zone, "Testing DNS server connection");
    let updater = DnsUpdater::new(
        config.sync.target.clone(),
        config.sync.credential.clone(),
        config.sync.forward_zone.clone(),
        config.sync.timeout,
    );
    tokio::time::timeout(CONNECTION_TEST_TIMEOUT, updater.validate_connection())
        .await
        .context("Timed out checking the DNS server")?
        .context("DNS server connection failed")?;
    info!(server = %config.sync.target, "DNS server connection OK");

    Ok(())
}
