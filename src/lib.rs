pub mod types;
pub mod ledger;
pub mod pricing;
pub mod hub;
pub mod ingestion;
pub mod interfaces;
pub mod error;
pub mod config;
pub mod observability;
pub mod api;
pub mod utils;

// Discriminator carried by every published payload
pub const SNAPSHOT_KIND: &str = "snapshot";
