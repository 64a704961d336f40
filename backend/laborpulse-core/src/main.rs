use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod dept_translate;
mod efficiency;
mod erp_client;
mod labor_allocation;
mod labor_model;
mod labor_pipeline;
mod not_clocked_in;
mod query_cache;
mod refresh_scheduler;
mod routes;
mod settings;
mod snapshot_store;
mod stats;
mod time_grid;

#[cfg(test)]
mod erp_client_tests;
#[cfg(test)]
mod routes_tests;

use erp_client::{EpicorClient, EpicorConfig, FixtureSource, LaborSource};
use query_cache::QueryCache;
use refresh_scheduler::{PassClock, RefreshDriver};
use routes::{build_router, AppState};
use settings::Settings;
use snapshot_store::SnapshotStore;
use stats::StatsManager;

/// Live shop-floor labor efficiency from ERP clock records.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Run a single refresh pass, print the snapshot as JSON and exit
    #[arg(long)]
    once: bool,

    /// Labor date to report on (YYYY-MM-DD), overrides LABOR_DATE
    #[arg(long)]
    date: Option<String>,

    /// Read a captured day from a JSON file instead of the ERP
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Listen address, overrides BIND_ADDR
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- Setup ---
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting default subscriber failed")?;

    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("Invalid service configuration")?;
    if let Some(date) = cli.date {
        settings.labor_date = Some(date);
    }
    if let Some(fixture) = cli.fixture {
        settings.labor_fixture_path = Some(fixture);
    }
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }
    info!("LaborPulse {} configuration loaded.", settings::VERSION);

    let timezone = settings.timezone()?;
    let depts = settings.dept_table()?;

    // --- Data source ---
    let source: Arc<dyn LaborSource> = match &settings.labor_fixture_path {
        Some(path) => Arc::new(
            FixtureSource::from_path(path)
                .with_context(|| format!("Failed to load labor fixture {}", path.display()))?,
        ),
        None => {
            let config = EpicorConfig::from_settings(&settings)
                .context("Epicor settings are incomplete; set LABOR_FIXTURE_PATH to run offline")?;
            Arc::new(
                EpicorClient::new(config, Arc::new(QueryCache::new()))
                    .context("Failed to create Epicor client")?,
            )
        }
    };
    info!("Labor data source: {}", source.describe());

    // --- Shared state ---
    let clock = PassClock::system(timezone);
    let store = Arc::new(SnapshotStore::with_file(settings.labor_data_file()));
    match store.load_persisted().await {
        Ok(true) => info!("Serving persisted snapshot until the first refresh completes."),
        Ok(false) => info!("No persisted snapshot found."),
        Err(e) => warn!("Could not load persisted snapshot: {}", e),
    }
    let stats = Arc::new(StatsManager::new(Some(settings.stats_file()), clock.now()));

    let driver = Arc::new(RefreshDriver::new(
        source,
        store.clone(),
        stats.clone(),
        depts,
        clock,
        settings.labor_date.clone(),
        settings.slice_minutes,
        settings.refresh_interval(),
    ));

    if cli.once {
        let outcome = driver.run_pass().await;
        info!("Single pass finished: {}", outcome.message());
        match store.current().await {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?),
            None => println!("null"),
        }
        return Ok(());
    }

    driver.spawn();

    // --- Run Web Server ---
    let app = build_router(AppState { driver, stats });
    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", settings.bind_addr))?;

    match settings.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load TLS cert/key from {} and {}",
                        cert_path.display(),
                        key_path.display()
                    )
                })?;
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("Starting server on http://{}", addr);
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await?;
        }
    }

    Ok(())
}
