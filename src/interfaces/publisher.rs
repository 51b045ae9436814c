use async_trait::async_trait;
use crate::error::Result;
use crate::pricing::view::SnapshotEvent;

/// Sink for refreshed snapshots. Implemented by the hub handle in
/// production and by recording stubs in tests.
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    async fn publish(&self, snapshot: SnapshotEvent) -> Result<()>;
}
