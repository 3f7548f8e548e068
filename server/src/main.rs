// server/src/main.rs

// Entry point for the patient record service. Parses command-line and
// environment configuration, opens the sled-backed store, and runs the
// REST API until shutdown.

use anyhow::Result;
use clap::Parser;
use rest_api::{ApiConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_STATIC_DIR};
use std::sync::Arc;
use storage::{open_sled_db, PatientStore, SledPatientStore};
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "patientdb",
    about = "HTTP service for hospital patient records",
    version
)]
struct Cli {
    /// Address the HTTP server binds to.
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port the HTTP server listens on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding the sled database files.
    #[arg(long, env = "DATA_DIR", default_value = "patient_data")]
    data_dir: String,

    /// Directory the browser UI is served from.
    #[arg(long, env = "STATIC_DIR", default_value = DEFAULT_STATIC_DIR)]
    static_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db = open_sled_db(&cli.data_dir)?;
    let store = SledPatientStore::new(db)?;
    info!("Opened patient store at {}", cli.data_dir);

    let config = ApiConfig {
        host: cli.host,
        port: cli.port,
        static_dir: cli.static_dir,
    };

    let shared: Arc<dyn PatientStore> = Arc::new(store.clone());
    // Held for the lifetime of the server so the receiver stays open.
    let (_shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    rest_api::start_server(config, shared, shutdown_rx).await?;

    store.flush()?;
    Ok(())
}
