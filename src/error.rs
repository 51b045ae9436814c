use thiserror::Error;
use crate::types::ids::ItemId;

#[derive(Error, Debug)]
pub enum Error {
    // Ledger Errors
    #[error("Store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Negative price from {source_name}: {price}")]
    NegativePrice {
        source_name: String,
        price: f64,
    },

    // Collector Errors
    #[error("Collector failed: {0}")]
    CollectorError(String),

    #[error("Collector exceeded deadline of {deadline:?}")]
    CollectorTimeout {
        deadline: std::time::Duration,
    },

    // Hub Errors
    #[error("Hub fan-out loop is gone")]
    HubClosed,

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
