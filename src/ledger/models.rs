use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::types::ids::ItemId;
use crate::types::price::Price;

/// Natural key for a priced item. Immutable once the item exists; upserts
/// with the same key always resolve to the same row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub name: String,
    pub set_name: String,
    pub card_number: String,
    pub condition: String,
}

impl ItemKey {
    pub fn new(
        name: impl Into<String>,
        set_name: impl Into<String>,
        card_number: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        ItemKey {
            name: name.into(),
            set_name: set_name.into(),
            card_number: card_number.into(),
            condition: condition.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricedItem {
    pub id: ItemId,
    pub key: ItemKey,
    pub rarity: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable price reading. Rows are only ever appended, or removed in
/// bulk when their owning item is deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: i64,
    pub item_id: ItemId,
    pub source: String,
    pub price: Price,
    pub currency: String,
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
}
