use std::time::Duration;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::AppConfig;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means permissive CORS (development default).
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: "data/cardpulse.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub reference_lag_secs: u64,
    pub view_limit: usize,
}

impl AggregationConfig {
    pub fn reference_lag(&self) -> Duration {
        Duration::from_secs(self.reference_lag_secs)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            reference_lag_secs: 3600,  // 1 hour
            view_limit: 100,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    pub observer_queue_capacity: usize,
    pub ping_interval_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            observer_queue_capacity: 256,
            ping_interval_secs: 54,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub interval_secs: u64,
    pub collector_deadline_secs: u64,
    pub run_on_startup: bool,
    pub collector: String,
}

impl IngestionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn collector_deadline(&self) -> Duration {
        Duration::from_secs(self.collector_deadline_secs)
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        IngestionConfig {
            interval_secs: 1800,  // 30 minutes
            collector_deadline_secs: 45,
            run_on_startup: true,
            collector: "sample".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.aggregation.reference_lag(), Duration::from_secs(3600));
        assert_eq!(config.aggregation.view_limit, 100);
        assert_eq!(config.hub.observer_queue_capacity, 256);
        assert_eq!(config.ingestion.interval(), Duration::from_secs(1800));
        assert_eq!(config.ingestion.collector, "sample");
        assert!(config.ingestion.run_on_startup);
    }
}
