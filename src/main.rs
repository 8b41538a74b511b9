//! MikroTik Exporter Binary Entry Point
//!
//! Polls one RouterOS device and serves its metrics for Prometheus.
//! Core functionality is provided by the `mikrotik_exporter` library crate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mikrotik_exporter::{
    collector::{ResourceCollector, Scheduler, complex},
    config::{AppConfig, parse_duration},
    device::{self, DeviceClient},
    exposition::SharedRegistry,
    schema,
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MikroTik Exporter - RouterOS metrics for Prometheus
#[derive(Parser, Debug)]
#[command(name = "mikrotik-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Device URL: https://, http://, api:// or apis:// (overrides config file)
    #[arg(short = 'r', long, env = "HOST_URL")]
    host_url: Option<String>,

    /// Device login user (overrides config file)
    #[arg(short, long, env = "USERNAME")]
    username: Option<String>,

    /// Device login password (overrides config file)
    #[arg(short, long, env = "PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long, env = "INSECURE")]
    insecure: bool,

    /// PEM file with the CA that signed the device certificate
    #[arg(long, env = "CA_CERTIFICATE")]
    cacert: Option<PathBuf>,

    /// Device alias exported as the ALIAS variable (overrides config file)
    #[arg(long, env = "ROUTER_ALIAS")]
    alias: Option<String>,

    /// Exposition port (overrides config file)
    #[arg(short, long, env = "LISTEN_PORT")]
    listen: Option<u16>,

    /// Polling interval, e.g. 30s or 1m (overrides config file)
    #[arg(short, long, env = "INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Directory with resource schema documents (overrides config file)
    #[arg(long, env = "SCHEMA_PATH")]
    schema_path: Option<PathBuf>,
}

impl Cli {
    /// Apply CLI/env overrides (CLI > ENV > config file).
    fn apply(self, config: &mut AppConfig) {
        if let Some(url) = self.host_url {
            config.device.connection.url = url;
        }
        if let Some(username) = self.username {
            config.device.connection.username = username;
        }
        if let Some(password) = self.password {
            config.device.connection.password = password;
        }
        if self.insecure {
            config.device.connection.insecure = true;
        }
        if let Some(path) = self.cacert {
            config.device.connection.ca_certificate = Some(path);
        }
        if let Some(alias) = self.alias {
            config.device.alias = alias;
        }
        if let Some(port) = self.listen {
            config.server.port = port;
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(path) = self.schema_path {
            config.schema_path = path;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mikrotik_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("MikroTik Exporter");

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        device = %config.device.connection.url,
        alias = %config.device.alias,
        interval = ?config.interval,
        "Server: {}:{}",
        config.server.bind,
        config.server.port,
    );

    let client = device::connect(&config.device.connection).await?;
    tracing::info!(transport = %client.transport(), "Connected to device");

    let mut globals = config.global_vars();
    match device_identity(client.as_ref()).await {
        Some(identity) => {
            tracing::info!(identity = %identity, "Device identity");
            globals.insert("IDENTITY".to_string(), identity);
        }
        None => tracing::warn!("Device identity unavailable, IDENTITY label will be empty"),
    }
    let globals = Arc::new(globals);

    tracing::info!("Loading schemas from: {}", config.schema_path.display());
    let schemas = schema::load_dir(&config.schema_path)?;
    tracing::info!("Loaded {} schemas", schemas.len());

    let registry = SharedRegistry::new();
    let scheduler = Scheduler::new(registry.clone());

    for schema in schemas {
        let name = schema.name.clone();
        let collector =
            ResourceCollector::new(Arc::new(schema), Arc::clone(&client), Arc::clone(&globals));
        if let Err(e) = scheduler.spawn(Box::new(collector), config.interval).await {
            tracing::error!("Failed to spawn collector '{}': {}", name, e);
        }
    }

    for collector in complex::builtin(Arc::clone(&client)) {
        let name = collector.name().to_string();
        if let Err(e) = scheduler.spawn(collector, config.interval).await {
            tracing::error!("Failed to spawn collector '{}': {}", name, e);
        }
    }

    tracing::info!("Started {} collection units", scheduler.unit_count().await);

    let app = create_router(AppState { registry });
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Metrics available at: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down collectors...");
    if let Err(e) = scheduler.shutdown_with_timeout(config.shutdown_timeout).await {
        tracing::error!("Failed to shutdown collectors: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Read the device name from `/system/identity`.
async fn device_identity(client: &dyn DeviceClient) -> Option<String> {
    match device::read(client, "/system/identity", &[]).await {
        Ok(records) => records
            .into_iter()
            .find_map(|record| record.get("name").map(str::to_string)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read device identity");
            None
        }
    }
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
