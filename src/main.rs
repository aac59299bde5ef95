use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use bd_intel_core::config::{Config, DestinationKind};
use bd_intel_core::crypto::Crypto;
use bd_intel_core::enrich::Enricher;
use bd_intel_core::error::CoreError;
use bd_intel_core::ingest::client::GrammersTelegramClient;
use bd_intel_core::ingest::Ingestor;
use bd_intel_core::metrics::{self, Metrics};
use bd_intel_core::scheduler::Scheduler;
use bd_intel_core::store::Store;
use bd_intel_core::sync::{CsvDestination, Destination, NoneDestination, SyncProjector};
use bd_intel_core::utils::setup_logging;

/// Internal default; there is no documented external contract for the
/// `/metrics`/`/health` port.
const DEFAULT_MONITORING_PORT: u16 = 9898;
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            error!(error = %err, exit_code = err.exit_code(), "core exiting");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), CoreError> {
    // Config::load validates and fails fast on a configuration error,
    // before logging is even set up: configuration errors are fatal at
    // startup, never during steady state.
    let config = Config::load()?;
    setup_logging(config.log_level).map_err(|e| CoreError::Internal(e.to_string()))?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting bd-intel-core");

    let metrics = Arc::new(Metrics::new());

    let store = Arc::new(Store::open(&config.paths.data_dir, 8).await?);
    let crypto = Arc::new(Crypto::load(None, &config.paths.data_dir).map_err(|e| CoreError::Crypto(e))?);

    tokio::spawn(metrics::serve(metrics.clone(), store.clone(), DEFAULT_MONITORING_PORT));

    let telegram_client = Arc::new(
        GrammersTelegramClient::connect(
            config.telegram.api_id,
            &config.telegram.api_hash,
            &config.paths.session_path(),
        )
        .await
        .map_err(|e| CoreError::AuthRequired(e.to_string()))?,
    );

    let ingestor = Arc::new(Ingestor::new(
        telegram_client.clone(),
        store.clone(),
        crypto.clone(),
        config.sync.sync_limit,
    ));
    let enricher = Arc::new(Enricher::new(store.clone(), crypto.clone()));

    let projector = match config.sync.destination_kind {
        DestinationKind::Csv => {
            let dir = config
                .sync
                .destination_id
                .clone()
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| config.paths.data_dir.join("export"));
            build_projector(store.clone(), Box::new(CsvDestination::new(dir)), config.sync.clone())
        }
        DestinationKind::None => {
            build_projector(store.clone(), Box::new(NoneDestination), config.sync.clone())
        }
        DestinationKind::Sheets => {
            // Documented integration point: no vendored Google Sheets
            // client ships with this core. Operators wanting `sheets`
            // today get the `none` destination with a loud log line
            // rather than a silent no-op or a fabricated client.
            tracing::warn!("DESTINATION_KIND=sheets has no vendored client in this build; falling back to none");
            build_projector(store.clone(), Box::new(NoneDestination), config.sync.clone())
        }
    };

    let scheduler = Scheduler::new(
        store.clone(),
        ingestor,
        enricher,
        Arc::new(projector),
        metrics.clone(),
        config.paths.lock_path(),
        &config.sync.sync_time,
    )?;

    scheduler.run(false, SHUTDOWN_GRACE_PERIOD).await?;
    info!("bd-intel-core stopped");
    Ok(())
}

fn build_projector(
    store: Arc<Store>,
    destination: Box<dyn Destination>,
    sync_config: bd_intel_core::config::SyncConfig,
) -> SyncProjector<Box<dyn Destination>> {
    SyncProjector::new(store, destination, sync_config)
}
