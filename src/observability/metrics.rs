use lazy_static::lazy_static;
use prometheus::{
    Counter, Histogram, HistogramOpts, IntGauge, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Ingestion metrics
    pub static ref ITEMS_UPSERTED: Counter = Counter::new(
        "items_upserted_total",
        "Total number of item upserts"
    ).unwrap();

    pub static ref OBSERVATIONS_APPENDED: Counter = Counter::new(
        "observations_appended_total",
        "Total number of observations appended to the ledger"
    ).unwrap();

    pub static ref OBSERVATIONS_REJECTED: Counter = Counter::new(
        "observations_rejected_total",
        "Total number of observations rejected during ingestion"
    ).unwrap();

    // Cycle metrics
    pub static ref CYCLES_COMPLETED: Counter = Counter::new(
        "cycles_completed_total",
        "Total number of completed ingestion cycles"
    ).unwrap();

    pub static ref CYCLES_FAILED: Counter = Counter::new(
        "cycles_failed_total",
        "Total number of failed ingestion cycles"
    ).unwrap();

    pub static ref TRIGGERS_COALESCED: Counter = Counter::new(
        "triggers_coalesced_total",
        "Total number of cycle triggers coalesced by the single-flight guard"
    ).unwrap();

    pub static ref CYCLE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "cycle_duration_seconds",
            "Ingestion cycle duration"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 45.0])
    ).unwrap();

    // Hub metrics
    pub static ref SNAPSHOTS_PUBLISHED: Counter = Counter::new(
        "snapshots_published_total",
        "Total number of snapshots fanned out to observers"
    ).unwrap();

    pub static ref OBSERVERS_DROPPED: Counter = Counter::new(
        "observers_dropped_total",
        "Total number of observers unregistered"
    ).unwrap();

    pub static ref CONNECTED_OBSERVERS: IntGauge = IntGauge::new(
        "connected_observers",
        "Number of currently connected observers"
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY.register(Box::new(ITEMS_UPSERTED.clone())).unwrap();
    REGISTRY.register(Box::new(OBSERVATIONS_APPENDED.clone())).unwrap();
    REGISTRY.register(Box::new(OBSERVATIONS_REJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(CYCLES_COMPLETED.clone())).unwrap();
    REGISTRY.register(Box::new(CYCLES_FAILED.clone())).unwrap();
    REGISTRY.register(Box::new(TRIGGERS_COALESCED.clone())).unwrap();
    REGISTRY.register(Box::new(CYCLE_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(SNAPSHOTS_PUBLISHED.clone())).unwrap();
    REGISTRY.register(Box::new(OBSERVERS_DROPPED.clone())).unwrap();
    REGISTRY.register(Box::new(CONNECTED_OBSERVERS.clone())).unwrap();
}
