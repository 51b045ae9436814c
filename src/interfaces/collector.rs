use async_trait::async_trait;
use crate::error::Result;
use crate::ledger::models::ItemKey;
use crate::types::price::Price;

/// One raw price reading handed back by a collector. The coordinator treats
/// a collected batch as unordered.
#[derive(Clone, Debug)]
pub struct RawObservation {
    pub key: ItemKey,
    pub rarity: String,
    pub source: String,
    pub price: Price,
    pub currency: Option<String>,
    pub url: Option<String>,
}

/// External source of raw observations. Implementations do whatever fetching
/// they need to; the coordinator only sees the resulting batch.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<Vec<RawObservation>>;

    fn name(&self) -> &str;
}
