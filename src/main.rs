use anyhow::Result;
use tokio::{net::TcpListener, signal, sync::broadcast};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use greenhouse_service::{
    alerts::{AlertPublisher, MonitoringLimits},
    api::{self, AppState},
    config::Config,
    control::{dispatch::CommandDispatcher, ControlEngine, ControlService},
    db,
    ingest::IngestionService,
    reading_cache::ReadingCache,
    thresholds::ThresholdStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Connect to DB and run migrations
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    // Seed the latest-reading cache so the control loop can act right after
    // a restart, before any new delivery arrives.
    let cache = ReadingCache::new();
    for reading in db::latest_readings(&pool).await? {
        cache.update(reading).await;
    }

    let alerts = AlertPublisher::new(pool.clone(), config.alert_dedup_secs);

    // Log every published alert. External notification transports subscribe
    // the same way.
    {
        let mut rx = alerts.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(alert) => warn!(
                        site_id = %alert.site_id,
                        sensor_kind = %alert.sensor_kind,
                        severity = %alert.severity,
                        value = alert.value,
                        "{}",
                        alert.message
                    ),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Alert subscriber lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let dispatcher = CommandDispatcher::new(pool.clone());
    let thresholds = ThresholdStore::new(pool.clone());
    let ingest = IngestionService::new(
        pool.clone(),
        cache.clone(),
        alerts.clone(),
        MonitoringLimits::default(),
    );
    let engine = ControlEngine::new(dispatcher.clone(), thresholds.clone(), cache);

    // Scheduled trigger: periodic decision cycle over all known sites.
    tokio::spawn(ControlService::new(engine.clone(), config.control_interval_secs).run());

    let state = AppState {
        pool,
        ingest,
        control: engine,
        dispatcher,
        thresholds,
    };

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
