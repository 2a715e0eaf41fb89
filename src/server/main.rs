//! Parcel query server.
//!
//! Serves point-in-parcel and nearby-parcel lookups over HTTP, backed by
//! PostGIS or, for local runs, a JSON fixture of parcels held in memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use parcels::config::Config;
use parcels::store::{connect, InMemoryParcelStore, PgParcelStore};
use parcels::{Parcel, ParcelRepository, ParcelService, StoreParcelRepository};

mod routes;
use routes::{router, AppState};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "parcel-server")]
#[command(about = "Parcel lookup server")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// PostgreSQL URL (overrides config)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Serve parcels from a JSON array file instead of PostGIS
    #[arg(long)]
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(url) = args.database_url {
        config.database.url = url;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging.level directive")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Parcel Query Server");

    let (repository, database) = match &args.fixture {
        Some(path) => {
            info!("Loading fixture parcels from {}", path.display());
            let store = load_fixture(path)?;
            info!("Serving {} parcels from memory", store.len());

            let repository: Arc<dyn ParcelRepository> =
                Arc::new(StoreParcelRepository::new(Arc::new(store)));
            (repository, None)
        }
        None => {
            let pool = connect(&config.database)
                .await
                .context("Failed to connect to PostGIS")?;
            let store = PgParcelStore::new(pool);

            if !store.health_check().await {
                anyhow::bail!("PostGIS is not answering queries");
            }
            info!("Connected to PostGIS");

            let repository: Arc<dyn ParcelRepository> =
                Arc::new(StoreParcelRepository::new(Arc::new(store.clone())));
            (repository, Some(store))
        }
    };

    let state = Arc::new(AppState {
        service: ParcelService::new(repository),
        database,
        query_timeout: Duration::from_millis(config.query.timeout_ms),
        default_radius_meters: config.query.default_radius_meters,
    });

    let app = router(state);

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn load_fixture(path: &Path) -> Result<InMemoryParcelStore> {
    let content = std::fs::read_to_string(path).context("Failed to read fixture file")?;
    let parcels: Vec<Parcel> =
        serde_json::from_str(&content).context("Failed to parse fixture parcels")?;
    InMemoryParcelStore::build(&parcels).context("Fixture contains an invalid boundary")
}
