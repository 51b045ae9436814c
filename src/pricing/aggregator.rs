use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::ledger::models::{PriceObservation, PricedItem};
use crate::pricing::view::DerivedItemView;
use crate::types::ids::ItemId;

/// Turn raw ledger rows into the ranked list of derived views.
///
/// Pure function of its inputs: no I/O, no clock access. Per (item, source)
/// pair the newest observation is "latest"; the newest observation strictly
/// older than latest − `reference_lag` is "reference". A source with no
/// sufficiently old observation reports zero change rather than being
/// excluded. Per item the current price is the mean of per-source latest
/// prices, and change is the mean of per-source deltas — "average how much
/// each source moved", not the move of the average.
pub fn derive_views(
    items: &[PricedItem],
    observations: &[PriceObservation],
    reference_lag: Duration,
    limit: usize,
) -> Vec<DerivedItemView> {
    let lag = chrono::Duration::seconds(reference_lag.as_secs() as i64);

    // BTreeMap keyed by source keeps the contributing-source list sorted.
    let mut by_item: HashMap<ItemId, BTreeMap<&str, Vec<&PriceObservation>>> = HashMap::new();
    for obs in observations {
        by_item
            .entry(obs.item_id)
            .or_default()
            .entry(obs.source.as_str())
            .or_default()
            .push(obs);
    }

    let mut views = Vec::new();
    for item in items {
        let Some(sources) = by_item.get(&item.id) else {
            continue;
        };

        let mut latest_sum = 0.0;
        let mut delta_sum = 0.0;
        let mut percent_sum = 0.0;
        let mut last_observed: Option<DateTime<Utc>> = None;

        for per_source in sources.values() {
            // Ties on capture time break by highest row id for determinism.
            let Some(latest) = per_source.iter().max_by_key(|o| (o.captured_at, o.id)) else {
                continue;
            };
            let cutoff = latest.captured_at - lag;
            let reference = per_source
                .iter()
                .filter(|o| o.captured_at < cutoff)
                .max_by_key(|o| (o.captured_at, o.id));

            let latest_price = latest.price.to_f64();
            let reference_price = reference.map_or(latest_price, |o| o.price.to_f64());
            let delta = latest_price - reference_price;

            latest_sum += latest_price;
            delta_sum += delta;
            percent_sum += if reference_price > 0.0 {
                delta / reference_price * 100.0
            } else {
                0.0
            };
            if last_observed.is_none_or(|t| latest.captured_at > t) {
                last_observed = Some(latest.captured_at);
            }
        }

        let source_count = sources.len();
        if source_count == 0 {
            continue;
        }
        let price = latest_sum / source_count as f64;
        if price <= 0.0 {
            continue;
        }

        views.push(DerivedItemView {
            id: item.id,
            name: item.key.name.clone(),
            set_name: item.key.set_name.clone(),
            card_number: item.key.card_number.clone(),
            condition: item.key.condition.clone(),
            rarity: item.rarity.clone(),
            price,
            change: delta_sum / source_count as f64,
            change_percent: percent_sum / source_count as f64,
            sources: sources.keys().copied().collect::<Vec<_>>().join(", "),
            last_observed: last_observed.unwrap_or(item.updated_at),
            created_at: item.created_at,
            updated_at: item.updated_at,
        });
    }

    views.sort_by(|a, b| {
        b.price
            .partial_cmp(&a.price)
            .unwrap_or(Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.id.cmp(&b.id))
    });
    views.truncate(limit);
    views
}
