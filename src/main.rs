use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cardpulse::api::rest::{ApiState, create_router};
use cardpulse::config::AppConfig;
use cardpulse::error::Result;
use cardpulse::hub;
use cardpulse::ingestion::coordinator::CycleCoordinator;
use cardpulse::ingestion::sample::SampleCollector;
use cardpulse::ingestion::scheduler::run_scheduler;
use cardpulse::interfaces::collector::Collector;
use cardpulse::ledger::store::LedgerStore;
use cardpulse::observability::metrics::register_metrics;
use cardpulse::utils::task_supervisor::TaskSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    register_metrics();

    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "default".to_string());
    let config = AppConfig::load(&env)?;

    let store = Arc::new(LedgerStore::open(&config.store.path)?);

    let (hub_handle, hub_loop) = hub::channel(config.hub.observer_queue_capacity);

    let collector: Arc<dyn Collector> = match config.ingestion.collector.as_str() {
        "sample" => Arc::new(SampleCollector::new()),
        other => {
            warn!("Unknown collector '{}', falling back to sample data", other);
            Arc::new(SampleCollector::new())
        }
    };
    let coordinator = Arc::new(CycleCoordinator::new(
        store.clone(),
        collector,
        Arc::new(hub_handle.clone()),
        config.ingestion.clone(),
        config.aggregation.clone(),
    ));

    let mut supervisor = TaskSupervisor::new();
    supervisor.spawn("hub_fanout", hub_loop.run());
    supervisor.spawn(
        "ingestion_scheduler",
        run_scheduler(coordinator.clone(), config.ingestion.clone()),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(ApiState {
        store,
        hub: hub_handle,
        coordinator,
        config,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
