//! Local Mingle node: the SQLite reference backend with the push and
//! invitation triggers attached. Runs until Ctrl-C.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use mingle_relay::{outbound, Relay, RelayConfig};
use mingle_store::database::Database;
use mingle_store::objects::ObjectStore;
use mingle_store::LocalBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mingle_relay=debug")),
        )
        .init();

    info!("Starting Mingle relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    info!(
        site_url = %config.site_url,
        push_enabled = config.push_enabled(),
        mail_enabled = config.mail_endpoint.is_some(),
        "Loaded configuration"
    );

    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open_in_memory()?,
    };
    std::fs::create_dir_all(&config.objects_dir)?;
    let backend = Arc::new(LocalBackend::new(db, ObjectStore::new(config.objects_dir.clone())));

    let (gateway, transport) = outbound(&config)?;
    let relay = Relay::start(backend.clone(), backend, gateway, transport, &config);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    relay.shutdown().await;
    Ok(())
}
