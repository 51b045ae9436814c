use std::sync::Arc;
use tracing::{info, warn};

use crate::config::IngestionConfig;
use crate::ingestion::coordinator::{CycleCoordinator, CycleOutcome};

/// Timer-driven trigger source. Cycle failures are logged and the schedule
/// keeps running; the single-flight guard in the coordinator decides what
/// happens if a cycle is still in flight when the timer fires.
pub async fn run_scheduler(coordinator: Arc<CycleCoordinator>, config: IngestionConfig) {
    if config.run_on_startup {
        info!("Running initial ingestion cycle");
        let _ = coordinator.run_cycle().await;
    }

    let mut ticker = tokio::time::interval(config.interval());
    ticker.tick().await; // the first tick fires immediately
    loop {
        ticker.tick().await;
        info!("Scheduled ingestion cycle due");
        if let Ok(CycleOutcome::AlreadyRunning) = coordinator.run_cycle().await {
            warn!("Scheduled cycle skipped: previous cycle still in flight");
        }
    }
}
