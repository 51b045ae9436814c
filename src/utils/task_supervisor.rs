use tokio::task::JoinHandle;
use std::collections::HashMap;
use tracing::{error, info};

/// Tracks the long-lived background tasks (hub fan-out loop, ingestion
/// scheduler) so shutdown can abort them together and health checks can
/// notice one that died.
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a background task and register it for supervision.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        info!("Spawned background task: {}", name);
        self.tasks.insert(name, tokio::spawn(future));
        self
    }

    /// Names of registered tasks that have terminated. A long-lived task
    /// showing up here means something went wrong.
    pub fn finished_tasks(&self) -> Vec<&str> {
        let finished: Vec<&str> = self
            .tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.as_str())
            .collect();
        for name in &finished {
            error!("Background task terminated unexpectedly: {}", name);
        }
        finished
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.values().filter(|handle| !handle.is_finished()).count()
    }

    /// Abort everything still running. Used on shutdown.
    pub async fn shutdown_all(&mut self) {
        info!("Shutting down {} background tasks", self.tasks.len());
        for (name, handle) in self.tasks.drain() {
            handle.abort();
            info!("Aborted task: {}", name);
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
