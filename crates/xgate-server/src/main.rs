//! `xgate` — the transport gateway binary. CLI argument parsing, config
//! loading, tracing setup, and wiring the backend supervisor, user
//! manager, and transport façade together. No protocol logic lives here.

mod telemetry;
mod transport_log;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use xgate_core::{
    BackendSupervisor, ConfigCredentialStore, DefaultUserSettings, GatewayConfig, UserManager,
};

/// The transport gateway.
#[derive(Parser)]
#[command(name = "xgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the gateway's TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Override `service.backend_port` from the command line.
    #[arg(long)]
    listen_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let cli = Cli::parse();
    let mut config = GatewayConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(port) = cli.listen_port {
        config.service.backend_port = port;
    }
    let config = Arc::new(config);

    tracing::info!(
        backend = %config.service.backend,
        jid = %config.service.jid,
        backend_port = config.service.backend_port,
        "starting gateway"
    );

    let supervisor = Arc::new(BackendSupervisor::new(
        config.service.backend.clone(),
        config.service.backend_host.clone(),
        config.service.backend_port,
        cli.config.clone(),
    ));

    let user_manager = Arc::new(
        UserManager::new(
            Arc::clone(&supervisor),
            Arc::new(ConfigCredentialStore::new(Arc::clone(&config))),
            Arc::new(DefaultUserSettings),
            Arc::clone(&config),
            config.service.jid.clone(),
        )
        .context("constructing user manager")?,
    );
    supervisor.set_dispatch(Arc::clone(&user_manager) as Arc<_>);

    if let Err(e) = supervisor.spawn_backend().await {
        tracing::warn!(error = %e, "initial backend spawn failed; will retry on first login");
    }

    let listen_addr = format!("{}:{}", config.service.backend_host, config.service.backend_port);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding backend listener on {listen_addr}"))?;
    tracing::info!(%listen_addr, "backend listener ready");

    supervisor.spawn_heartbeat();
    let accept_supervisor = Arc::clone(&supervisor);
    tokio::spawn(async move { accept_supervisor.run_accept_loop(listener).await });

    let _core = transport_log::GatewayCore {
        user_manager,
        outbound: Arc::new(transport_log::LoggingTransport) as Arc<dyn xgate_core::OutboundSink>,
    };

    tracing::info!("gateway running; awaiting shutdown signal");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received, exiting");
    Ok(())
}
