use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::interfaces::publisher::SnapshotPublisher;
use crate::observability::metrics::{CONNECTED_OBSERVERS, OBSERVERS_DROPPED, SNAPSHOTS_PUBLISHED};
use crate::pricing::view::SnapshotEvent;
use crate::types::ids::ObserverId;

const COMMAND_INTAKE_CAPACITY: usize = 64;

/// Why an observer left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    ClientClosed,
    QueueOverflow,
    LivenessTimeout,
    WriteError,
    ReadError,
}

enum HubCommand {
    Register {
        observer_id: ObserverId,
        outbound: mpsc::Sender<Arc<String>>,
    },
    Unregister {
        observer_id: ObserverId,
        reason: DropReason,
    },
    Publish {
        snapshot: SnapshotEvent,
    },
    ObserverCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Create a hub and the handle the rest of the system talks to it through.
/// The caller spawns `Hub::run`; everything else goes through the handle.
pub fn channel(observer_queue_capacity: usize) -> (HubHandle, Hub) {
    let (intake_tx, intake_rx) = mpsc::channel(COMMAND_INTAKE_CAPACITY);
    (
        HubHandle {
            intake: intake_tx,
            observer_queue_capacity,
        },
        Hub {
            intake: intake_rx,
            observers: HashMap::new(),
        },
    )
}

/// The fan-out loop. Sole owner of the observer registry: register,
/// unregister and publish are serialized through one command intake, so the
/// registry needs no locking and no other code path can race it.
pub struct Hub {
    intake: mpsc::Receiver<HubCommand>,
    observers: HashMap<ObserverId, mpsc::Sender<Arc<String>>>,
}

impl Hub {
    pub async fn run(mut self) {
        while let Some(command) = self.intake.recv().await {
            match command {
                HubCommand::Register { observer_id, outbound } => {
                    self.observers.insert(observer_id, outbound);
                    CONNECTED_OBSERVERS.set(self.observers.len() as i64);
                    info!(
                        "Observer {} connected. Total observers: {}",
                        observer_id,
                        self.observers.len()
                    );
                }
                HubCommand::Unregister { observer_id, reason } => {
                    self.drop_observer(observer_id, reason);
                }
                HubCommand::Publish { snapshot } => self.fan_out(snapshot),
                HubCommand::ObserverCount { reply } => {
                    let _ = reply.send(self.observers.len());
                }
            }
        }
        info!("Hub intake closed, fan-out loop exiting");
    }

    fn fan_out(&mut self, snapshot: SnapshotEvent) {
        let payload = match serde_json::to_string(&snapshot) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                return;
            }
        };

        // Non-blocking enqueue per observer: a full queue means the observer
        // cannot keep up, and it is dropped instead of stalling the rest.
        let mut dropped = Vec::new();
        for (observer_id, outbound) in &self.observers {
            match outbound.try_send(Arc::clone(&payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped.push((*observer_id, DropReason::QueueOverflow)),
                Err(TrySendError::Closed(_)) => dropped.push((*observer_id, DropReason::ClientClosed)),
            }
        }
        for (observer_id, reason) in dropped {
            self.drop_observer(observer_id, reason);
        }

        SNAPSHOTS_PUBLISHED.inc();
        debug!(
            "Published snapshot of {} items to {} observers",
            snapshot.item_count,
            self.observers.len()
        );
    }

    fn drop_observer(&mut self, observer_id: ObserverId, reason: DropReason) {
        // Idempotent: a second unregister for the same observer is a no-op.
        if self.observers.remove(&observer_id).is_some() {
            OBSERVERS_DROPPED.inc();
            CONNECTED_OBSERVERS.set(self.observers.len() as i64);
            info!(
                "Observer {} disconnected ({:?}). Total observers: {}",
                observer_id,
                reason,
                self.observers.len()
            );
        }
    }
}

#[derive(Clone)]
pub struct HubHandle {
    intake: mpsc::Sender<HubCommand>,
    observer_queue_capacity: usize,
}

impl HubHandle {
    /// Register an observer and hand back its bounded outbound queue. The
    /// observer sees future publishes only; nothing is replayed.
    pub async fn register(&self, observer_id: ObserverId) -> Result<mpsc::Receiver<Arc<String>>> {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.observer_queue_capacity);
        self.intake
            .send(HubCommand::Register {
                observer_id,
                outbound: outbound_tx,
            })
            .await
            .map_err(|_| Error::HubClosed)?;
        Ok(outbound_rx)
    }

    pub async fn unregister(&self, observer_id: ObserverId, reason: DropReason) -> Result<()> {
        self.intake
            .send(HubCommand::Unregister { observer_id, reason })
            .await
            .map_err(|_| Error::HubClosed)
    }

    pub async fn observer_count(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.intake
            .send(HubCommand::ObserverCount { reply: reply_tx })
            .await
            .map_err(|_| Error::HubClosed)?;
        reply_rx.await.map_err(|_| Error::HubClosed)
    }
}

#[async_trait]
impl SnapshotPublisher for HubHandle {
    async fn publish(&self, snapshot: SnapshotEvent) -> Result<()> {
        self.intake
            .send(HubCommand::Publish { snapshot })
            .await
            .map_err(|_| Error::HubClosed)
    }
}
