use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{AggregationConfig, IngestionConfig};
use crate::error::{Error, Result};
use crate::interfaces::collector::{Collector, RawObservation};
use crate::interfaces::publisher::SnapshotPublisher;
use crate::ledger::store::LedgerStore;
use crate::observability::metrics::{
    CYCLES_COMPLETED, CYCLES_FAILED, CYCLE_DURATION, ITEMS_UPSERTED, OBSERVATIONS_APPENDED,
    OBSERVATIONS_REJECTED, TRIGGERS_COALESCED,
};
use crate::observability::tracing::trace_cycle;
use crate::pricing::view::SnapshotEvent;
use crate::types::ids::CycleId;

/// Summary of one completed ingestion cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub collected: usize,
    pub written: usize,
    pub skipped: usize,
    pub published: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started(CycleId),
    AlreadyRunning,
}

/// Drives collect -> ledger write -> aggregate -> publish. At most one
/// cycle runs at a time: the in-flight guard coalesces overlapping triggers
/// into an "already running" acknowledgment instead of double-writing.
pub struct CycleCoordinator {
    store: Arc<LedgerStore>,
    collector: Arc<dyn Collector>,
    publisher: Arc<dyn SnapshotPublisher>,
    in_flight: Arc<Mutex<()>>,
    ingestion: IngestionConfig,
    aggregation: AggregationConfig,
}

impl CycleCoordinator {
    pub fn new(
        store: Arc<LedgerStore>,
        collector: Arc<dyn Collector>,
        publisher: Arc<dyn SnapshotPublisher>,
        ingestion: IngestionConfig,
        aggregation: AggregationConfig,
    ) -> Self {
        CycleCoordinator {
            store,
            collector,
            publisher,
            in_flight: Arc::new(Mutex::new(())),
            ingestion,
            aggregation,
        }
    }

    /// Run one cycle to completion, or report that one is already in
    /// flight. Used by the scheduler, which wants to wait for the result.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Ok(guard) = self.in_flight.clone().try_lock_owned() else {
            TRIGGERS_COALESCED.inc();
            debug!("Cycle already in flight, coalescing");
            return Ok(CycleOutcome::AlreadyRunning);
        };
        let report = self.run_to_completion(CycleId::new()).await;
        drop(guard);
        report.map(CycleOutcome::Completed)
    }

    /// Non-blocking kick used by the on-demand refresh path: claim the
    /// guard synchronously, run the cycle in a background task, return
    /// immediately.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        match self.in_flight.clone().try_lock_owned() {
            Err(_) => {
                TRIGGERS_COALESCED.inc();
                debug!("Trigger rejected: cycle already in flight");
                TriggerOutcome::AlreadyRunning
            }
            Ok(guard) => {
                let cycle_id = CycleId::new();
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    let _guard = guard;
                    let _ = coordinator.run_to_completion(cycle_id).await;
                });
                TriggerOutcome::Started(cycle_id)
            }
        }
    }

    async fn run_to_completion(&self, cycle_id: CycleId) -> Result<CycleReport> {
        match self.execute(cycle_id).instrument(trace_cycle(&cycle_id)).await {
            Ok(report) => {
                CYCLES_COMPLETED.inc();
                CYCLE_DURATION.observe(report.elapsed.as_secs_f64());
                info!(
                    "Cycle {} complete: collected={} written={} skipped={} published={} elapsed={:?}",
                    cycle_id,
                    report.collected,
                    report.written,
                    report.skipped,
                    report.published,
                    report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                CYCLES_FAILED.inc();
                error!("Cycle {} failed: {}", cycle_id, e);
                Err(e)
            }
        }
    }

    async fn execute(&self, cycle_id: CycleId) -> Result<CycleReport> {
        let started = Instant::now();

        let raw = self.collect_batch().await;
        let collected = raw.len();
        let (written, skipped) = self.write_batch(raw)?;

        // A store failure past this point aborts without publishing, so a
        // partial or empty snapshot never overwrites observers' prior view.
        let views = self
            .store
            .query_derived_views(self.aggregation.reference_lag(), self.aggregation.view_limit)?;
        let published = views.len();
        self.publisher.publish(SnapshotEvent::new(views)).await?;

        Ok(CycleReport {
            cycle_id,
            collected,
            written,
            skipped,
            published,
            elapsed: started.elapsed(),
        })
    }

    /// Collect under a deadline. Failures and timeouts degrade to an empty
    /// batch: the cycle still publishes whatever the ledger already holds.
    async fn collect_batch(&self) -> Vec<RawObservation> {
        let deadline = self.ingestion.collector_deadline();
        match tokio::time::timeout(deadline, self.collector.collect()).await {
            Ok(Ok(batch)) => {
                debug!(
                    "Collector {} returned {} observations",
                    self.collector.name(),
                    batch.len()
                );
                batch
            }
            Ok(Err(e)) => {
                warn!(
                    "Collector {} failed: {}; continuing with ledger contents",
                    self.collector.name(),
                    e
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Collector {}: {}; continuing with ledger contents",
                    self.collector.name(),
                    Error::CollectorTimeout { deadline }
                );
                Vec::new()
            }
        }
    }

    fn write_batch(&self, raw: Vec<RawObservation>) -> Result<(usize, usize)> {
        let mut written = 0;
        let mut skipped = 0;
        for obs in raw {
            match self.write_observation(&obs) {
                Ok(()) => written += 1,
                Err(e @ (Error::NegativePrice { .. } | Error::UnknownItem(_))) => {
                    OBSERVATIONS_REJECTED.inc();
                    skipped += 1;
                    warn!("Skipping observation of {} from {}: {}", obs.key.name, obs.source, e);
                }
                // Store unavailable: abort the whole cycle.
                Err(e) => return Err(e),
            }
        }
        Ok((written, skipped))
    }

    fn write_observation(&self, obs: &RawObservation) -> Result<()> {
        let item_id = self.store.upsert_item(&obs.key, &obs.rarity)?;
        ITEMS_UPSERTED.inc();
        self.store.append_observation(
            item_id,
            &obs.source,
            obs.price,
            obs.currency.as_deref(),
            obs.url.as_deref(),
        )?;
        OBSERVATIONS_APPENDED.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregationConfig, IngestionConfig};
    use crate::ledger::models::ItemKey;
    use crate::types::price::Price;
    use async_trait::async_trait;

    struct RecordingPublisher {
        snapshots: std::sync::Mutex<Vec<SnapshotEvent>>,
    }

    impl RecordingPublisher {
        fn new() -> Arc<Self> {
            Arc::new(RecordingPublisher {
                snapshots: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn published(&self) -> Vec<SnapshotEvent> {
            self.snapshots.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SnapshotPublisher for RecordingPublisher {
        async fn publish(&self, snapshot: SnapshotEvent) -> Result<()> {
            self.snapshots.lock().unwrap().push(snapshot);
            Ok(())
        }
    }

    struct StaticCollector {
        batch: Vec<RawObservation>,
        delay: Duration,
    }

    #[async_trait]
    impl Collector for StaticCollector {
        async fn collect(&self) -> Result<Vec<RawObservation>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.batch.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl Collector for FailingCollector {
        async fn collect(&self) -> Result<Vec<RawObservation>> {
            Err(Error::CollectorError("marketplace unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn raw(name: &str, source: &str, price: f64) -> RawObservation {
        RawObservation {
            key: ItemKey::new(name, "Scarlet & Violet 151", "", "Near Mint"),
            rarity: "Ultra Rare".to_string(),
            source: source.to_string(),
            price: Price::from_f64(price),
            currency: None,
            url: None,
        }
    }

    fn coordinator(
        store: Arc<LedgerStore>,
        collector: Arc<dyn Collector>,
        publisher: Arc<dyn SnapshotPublisher>,
    ) -> Arc<CycleCoordinator> {
        Arc::new(CycleCoordinator::new(
            store,
            collector,
            publisher,
            IngestionConfig::default(),
            AggregationConfig::default(),
        ))
    }

    #[tokio::test]
    async fn cycle_writes_batch_and_publishes_snapshot() {
        let store = Arc::new(LedgerStore::open_in_memory().unwrap());
        let publisher = RecordingPublisher::new();
        let collector = Arc::new(StaticCollector {
            batch: vec![
                raw("Charizard ex", "TCGPlayer", 389.99),
                raw("Charizard ex", "PriceCharting", 395.50),
                raw("Pikachu ex", "TCGPlayer", 124.50),
            ],
            delay: Duration::ZERO,
        });
        let coordinator = coordinator(store.clone(), collector, publisher.clone());

        let outcome = coordinator.run_cycle().await.unwrap();
        let CycleOutcome::Completed(report) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.collected, 3);
        assert_eq!(report.written, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.published, 2);

        let snapshots = publisher.published();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].item_count, 2);
        assert_eq!(snapshots[0].items[0].name, "Charizard ex");
    }

    #[tokio::test]
    async fn poison_observation_is_skipped_and_cycle_continues() {
        let store = Arc::new(LedgerStore::open_in_memory().unwrap());
        let publisher = RecordingPublisher::new();
        let collector = Arc::new(StaticCollector {
            batch: vec![
                raw("Charizard ex", "TCGPlayer", 389.99),
                raw("Mew ex", "TCGPlayer", -4.0),
                raw("Pikachu ex", "TCGPlayer", 124.50),
            ],
            delay: Duration::ZERO,
        });
        let coordinator = coordinator(store.clone(), collector, publisher.clone());

        let CycleOutcome::Completed(report) = coordinator.run_cycle().await.unwrap() else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped, 1);
        // The poisoned item was upserted but priced nothing, so only the
        // two healthy items appear in the snapshot.
        assert_eq!(publisher.published()[0].item_count, 2);
    }

    #[tokio::test]
    async fn collector_failure_still_publishes_ledger_contents() {
        let store = Arc::new(LedgerStore::open_in_memory().unwrap());
        let item_id = store
            .upsert_item(&ItemKey::new("Mew ex", "Scarlet & Violet 151", "", "Near Mint"), "")
            .unwrap();
        store
            .append_observation(item_id, "TCGPlayer", Price::from_f64(156.75), None, None)
            .unwrap();

        let publisher = RecordingPublisher::new();
        let coordinator = coordinator(store, Arc::new(FailingCollector), publisher.clone());

        let CycleOutcome::Completed(report) = coordinator.run_cycle().await.unwrap() else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.collected, 0);
        assert_eq!(report.published, 1);
        assert_eq!(publisher.published()[0].items[0].price, 156.75);
    }

    #[tokio::test]
    async fn overlapping_triggers_coalesce_to_a_single_batch() {
        let store = Arc::new(LedgerStore::open_in_memory().unwrap());
        let publisher = RecordingPublisher::new();
        let collector = Arc::new(StaticCollector {
            batch: vec![raw("Charizard ex", "TCGPlayer", 389.99)],
            delay: Duration::from_millis(200),
        });
        let coordinator = coordinator(store.clone(), collector, publisher.clone());

        let first = coordinator.trigger();
        assert!(matches!(first, TriggerOutcome::Started(_)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.trigger(), TriggerOutcome::AlreadyRunning);
        assert!(matches!(
            coordinator.run_cycle().await.unwrap(),
            CycleOutcome::AlreadyRunning
        ));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.load_observations().unwrap().len(), 1);
        assert_eq!(publisher.published().len(), 1);

        // The guard is free again once the cycle finishes.
        assert!(matches!(coordinator.trigger(), TriggerOutcome::Started(_)));
    }
}
