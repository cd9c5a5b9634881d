//! ETP devkit server.
//!
//! ```text
//!   ws client ──upgrade──▶ EtpServer ──▶ Session (server side)
//!                                          ├─ CoreHandler
//!                                          ├─ DiscoveryStoreHandler ─┐
//!                                          ├─ StoreHandler ──────────┼─▶ MemoryStore
//!                                          └─ NotificationStoreHandler ┘
//! ```
//!
//! Configuration comes from a TOML file (`--config`) and is hot reloaded for
//! new connections. SIGINT/SIGTERM close every session with CloseSession and
//! stop the listener.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use etp_devkit::config::{load_config, ConfigWatcher, EtpConfig};
use etp_devkit::handlers::{store_registry, MemoryStore};
use etp_devkit::lifecycle::{wait_for_signal, Shutdown};
use etp_devkit::observability::{init_logging, init_metrics};
use etp_devkit::EtpServer;

#[derive(Parser)]
#[command(name = "etp-devkit", version, about = "ETP 1.1/1.2 store server backed by an in-memory object store")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Seed the store with sample wells and wellbores.
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EtpConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }

    init_logging(&config.observability).map_err(|e| e.to_string())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "etp-devkit starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.listener.path,
        max_connections = config.listener.max_connections,
        auth = ?config.auth.mode,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        let address = config.observability.metrics_address.parse()?;
        init_metrics(address)?;
        tracing::info!(address = %address, "metrics exporter listening");
    }

    let store = Arc::new(MemoryStore::new());
    if args.seed {
        store.seed_sample_wells();
    }

    let max_response_count = usize::try_from(config.endpoint.max_response_count).unwrap_or(usize::MAX);
    let server = {
        let store = store.clone();
        EtpServer::new(config.clone(), move || store_registry(store.clone(), max_response_count))
    };

    // Keep the watcher alive for the life of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let live = server.config_handle();
            let bind = args.bind.clone();
            tokio::spawn(async move {
                while let Some(mut reloaded) = updates.recv().await {
                    if let Some(bind) = &bind {
                        reloaded.listener.bind_address = bind.clone();
                    }
                    live.store(Arc::new(reloaded));
                    tracing::info!("new connections use the reloaded configuration");
                }
            });
            Some(watcher)
        }
        None => None,
    };

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }

    match &config.listener.tls {
        Some(tls) => {
            let address = config.listener.bind_address.parse()?;
            server.run_tls(address, tls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, shutdown).await?;
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
