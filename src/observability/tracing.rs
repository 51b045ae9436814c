use tracing::Span;
use crate::types::ids::{CycleId, ObserverId};

pub fn trace_cycle(cycle_id: &CycleId) -> Span {
    tracing::info_span!(
        "ingestion_cycle",
        cycle_id = %cycle_id,
    )
}

pub fn trace_observer(observer_id: &ObserverId) -> Span {
    tracing::info_span!(
        "observer_session",
        observer_id = %observer_id,
    )
}
