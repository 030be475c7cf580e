//! # exthost
//!
//! Extension host binary: loads settings, builds the broker over an
//! in-memory host, registers the configured extensions and serves them
//! over WebSocket.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use exthost_broker::{Broker, MemoryHost};
use exthost_server::config::ServerConfig;
use exthost_server::server::ExtHostServer;
use exthost_settings::{ExtHostSettings, ExtensionDescriptor};

/// Developer-tools extension host.
#[derive(Parser, Debug)]
#[command(name = "exthost", about = "Developer-tools extension message broker")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.exthost/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log JSON lines.
    #[arg(long)]
    json: bool,

    /// Extension start page to register, repeatable.
    #[arg(long = "extension", value_name = "START_PAGE")]
    extensions: Vec<String>,

    /// URL the in-memory host pretends to inspect.
    #[arg(long, default_value = "about:blank")]
    inspect: String,
}

impl Cli {
    fn load_settings(&self) -> Result<ExtHostSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(exthost_settings::settings_path);
        let mut settings = exthost_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings.logging.json |= self.json;
        settings
            .broker
            .extensions
            .extend(self.extensions.iter().map(ExtensionDescriptor::new));
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    exthost_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let host = Arc::new(MemoryHost::with_page(&cli.inspect));
    let broker = Broker::new(settings.clone(), host.services());
    broker.watch_navigations();

    for descriptor in &settings.broker.extensions {
        match broker.add_extension(descriptor) {
            Ok(origin) => tracing::info!(%origin, "extension registered"),
            Err(e) => tracing::warn!(start_page = %descriptor.start_page, error = %e, "extension not registered"),
        }
    }

    let server = ExtHostServer::new(ServerConfig::from(&settings.server), Arc::clone(&broker));
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        "extension host listening on ws://{addr}/ws ({} extensions, {} commands)",
        broker.stats().extensions,
        broker.registry().commands().len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(Some(Duration::from_secs(5)))
        .await;
    let _ = handle.await;
    tracing::info!(drained, "Shutdown complete");
    Ok(())
}
