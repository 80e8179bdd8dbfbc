#[macro_use]
extern crate tracing;

mod logging;

use eyre::{
    Context as _,
    Result,
};
pub use fsimage_exporter_config::{
    Args,
    Config,
};
use fsimage_exporter_http::AppState;
use fsimage_exporter_refresh::{
    locator_from_config,
    FsImageCollector,
    KerberosCredentials,
    RefreshScheduler,
    SnapshotStore,
};
use fsimage_exporter_stats::{
    DelimitedImageAnalyzer,
    ImageAnalyzer,
    ReportOptions,
};
pub use logging::{
    init_errors,
    init_logging,
};
use prometheus::Registry;
use std::sync::Arc;

/// Loads the configuration, starts the refresh task and serves scrapes until ctrl-c.
pub async fn run(args: Args) -> Result<()> {
    let config = Config::new(&args).wrap_err("Failed to load configuration")?;
    config.validate().wrap_err("Invalid configuration")?;

    let options = ReportOptions::from_config(&config)?;
    let analyzer: Arc<dyn ImageAnalyzer> = Arc::new(DelimitedImageAnalyzer::new(options));

    if config.fetch_from_remote_namenode {
        KerberosCredentials::from_config(&config)?;
        warn!("remote mode downloads binary fsimages, the bundled analyzer only reads `hdfs oiv -p Delimited` exports");
    }
    let locator = locator_from_config(&config)?;

    let store = SnapshotStore::new();
    let registry = Registry::new();
    registry
        .register(Box::new(FsImageCollector::new(store.clone())?))
        .wrap_err("Failed to register the fsimage collector")?;

    info!(
        locator = locator.name(),
        interval = ?config.refresh_interval,
        "starting refresh task"
    );
    let scheduler = RefreshScheduler::new(locator, analyzer, store.clone()).spawn(config.refresh_interval)?;

    let state = AppState {
        registry,
        store,
        phase: scheduler.phase.clone(),
    };
    let result = fsimage_exporter_http::serve(config.listen_address, state, shutdown_signal()).await;

    scheduler.shutdown().await;
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(err) => {
            error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    }
}
