use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::SNAPSHOT_KIND;
use crate::types::ids::ItemId;

/// Computed price/trend summary for one item. Never persisted; valid only
/// at the moment the aggregation ran. Wire field names follow the frontend
/// contract ("changePercent", comma-joined "source").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedItemView {
    pub id: ItemId,
    pub name: String,
    pub set_name: String,
    pub card_number: String,
    pub condition: String,
    pub rarity: String,
    pub price: f64,
    pub change: f64,
    #[serde(rename = "changePercent")]
    pub change_percent: f64,
    #[serde(rename = "source")]
    pub sources: String,
    pub last_observed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The one payload type the hub ever publishes: a full snapshot that
/// replaces an observer's previous view of the world.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub kind: String,
    pub generated_at: DateTime<Utc>,
    pub item_count: usize,
    pub items: Vec<DerivedItemView>,
}

impl SnapshotEvent {
    pub fn new(items: Vec<DerivedItemView>) -> Self {
        SnapshotEvent {
            kind: SNAPSHOT_KIND.to_string(),
            generated_at: Utc::now(),
            item_count: items.len(),
            items,
        }
    }
}
