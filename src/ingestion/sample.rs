use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::interfaces::collector::{Collector, RawObservation};
use crate::ledger::models::ItemKey;
use crate::types::price::Price;

const SAMPLE_URL: &str = "https://example.com/sample-data";

struct SampleCard {
    name: &'static str,
    set_name: &'static str,
    rarity: &'static str,
    prices: &'static [(&'static str, i64, i64)], // (source, base cents, jitter modulus cents)
}

const SAMPLE_CARDS: &[SampleCard] = &[
    SampleCard {
        name: "Charizard ex",
        set_name: "Scarlet & Violet 151",
        rarity: "Special Illustration Rare",
        prices: &[("TCGPlayer", 38999, 2000), ("PriceCharting", 39550, 1500)],
    },
    SampleCard {
        name: "Pikachu ex",
        set_name: "Scarlet & Violet 151",
        rarity: "Ultra Rare",
        prices: &[("TCGPlayer", 12450, 1000), ("PriceCharting", 12875, 800)],
    },
    SampleCard {
        name: "Mew ex",
        set_name: "Scarlet & Violet 151",
        rarity: "Secret Rare",
        prices: &[("TCGPlayer", 15675, 1200), ("PriceCharting", 16225, 900)],
    },
];

/// Fallback collector used when no live marketplace collector is wired up.
/// Returns a fixed card set with a little clock-derived price jitter so
/// repeated cycles show movement.
pub struct SampleCollector;

impl SampleCollector {
    pub fn new() -> Self {
        SampleCollector
    }
}

impl Default for SampleCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for SampleCollector {
    async fn collect(&self) -> Result<Vec<RawObservation>> {
        let now = Utc::now().timestamp();
        let mut batch = Vec::new();
        for card in SAMPLE_CARDS {
            for &(source, base_cents, modulus) in card.prices {
                // Jitter of roughly +/- modulus/2 cents, never below zero.
                let jitter = now % modulus - modulus / 2;
                let cents = (base_cents + jitter).max(0);
                batch.push(RawObservation {
                    key: ItemKey::new(card.name, card.set_name, "", "Near Mint"),
                    rarity: card.rarity.to_string(),
                    source: source.to_string(),
                    price: Price::from_cents(cents),
                    currency: Some("USD".to_string()),
                    url: Some(SAMPLE_URL.to_string()),
                });
            }
        }
        Ok(batch)
    }

    fn name(&self) -> &str {
        "sample"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_batch_covers_every_card_and_source() {
        let batch = SampleCollector::new().collect().await.unwrap();
        assert_eq!(batch.len(), 6);
        for obs in &batch {
            assert!(!obs.price.is_negative());
            assert_eq!(obs.currency.as_deref(), Some("USD"));
            assert_eq!(obs.key.condition, "Near Mint");
        }
        assert!(batch.iter().any(|o| o.key.name == "Charizard ex" && o.source == "PriceCharting"));
    }
}
