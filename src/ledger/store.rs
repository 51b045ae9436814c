use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::ledger::models::{ItemKey, PriceObservation, PricedItem};
use crate::pricing::aggregator::derive_views;
use crate::pricing::view::DerivedItemView;
use crate::types::ids::ItemId;
use crate::types::price::Price;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    set_name    TEXT NOT NULL,
    card_number TEXT NOT NULL DEFAULT '',
    condition   TEXT NOT NULL DEFAULT 'Near Mint',
    rarity      TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(name, set_name, card_number, condition)
);

CREATE TABLE IF NOT EXISTS observations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id     INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    source      TEXT NOT NULL,
    price_cents INTEGER NOT NULL,
    currency    TEXT NOT NULL DEFAULT 'USD',
    url         TEXT,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_item_source_captured
    ON observations (item_id, source, captured_at DESC);
";

/// Durable append-only store of observations plus the upsertable registry
/// of priced items. A single SQLite connection behind a mutex serializes
/// all access; every write is either an idempotent upsert or a pure append.
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let store = Self::initialize(Connection::open(path.as_ref())?)?;
        info!("Ledger store opened at {}", path.as_ref().display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(LedgerStore { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert-or-update by natural key. A conflicting key updates rarity and
    /// the last-modified timestamp only and hands back the existing id, so
    /// concurrent callers with the same key never observe a duplicate-key
    /// failure or a lost update.
    pub fn upsert_item(&self, key: &ItemKey, rarity: &str) -> Result<ItemId> {
        let now = Utc::now();
        let id: i64 = self.conn().query_row(
            "INSERT INTO items (name, set_name, card_number, condition, rarity, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(name, set_name, card_number, condition)
             DO UPDATE SET rarity = excluded.rarity, updated_at = excluded.updated_at
             RETURNING id",
            params![key.name, key.set_name, key.card_number, key.condition, rarity, now],
            |row| row.get(0),
        )?;
        Ok(ItemId(id))
    }

    /// Append one observation stamped with the current time.
    pub fn append_observation(
        &self,
        item_id: ItemId,
        source: &str,
        price: Price,
        currency: Option<&str>,
        url: Option<&str>,
    ) -> Result<()> {
        self.append_observation_at(item_id, source, price, currency, url, Utc::now())
    }

    /// Backdating variant used by imports and tests.
    pub fn append_observation_at(
        &self,
        item_id: ItemId,
        source: &str,
        price: Price,
        currency: Option<&str>,
        url: Option<&str>,
        captured_at: DateTime<Utc>,
    ) -> Result<()> {
        if price.is_negative() {
            return Err(Error::NegativePrice {
                source_name: source.to_string(),
                price: price.to_f64(),
            });
        }

        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)",
            params![item_id.0],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::UnknownItem(item_id));
        }

        conn.execute(
            "INSERT INTO observations (item_id, source, price_cents, currency, url, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item_id.0,
                source,
                price.to_cents(),
                currency.unwrap_or("USD"),
                url,
                captured_at
            ],
        )?;
        Ok(())
    }

    /// Delete an item; its observations go with it (ON DELETE CASCADE).
    /// Returns whether a row was actually removed.
    pub fn delete_item(&self, item_id: ItemId) -> Result<bool> {
        let deleted = self.conn().execute("DELETE FROM items WHERE id = ?1", params![item_id.0])?;
        Ok(deleted > 0)
    }

    pub fn observation_count(&self, item_id: ItemId) -> Result<u64> {
        let count: u64 = self.conn().query_row(
            "SELECT COUNT(*) FROM observations WHERE item_id = ?1",
            params![item_id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn load_items(&self) -> Result<Vec<PricedItem>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, set_name, card_number, condition, rarity, created_at, updated_at
             FROM items",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PricedItem {
                id: ItemId(row.get(0)?),
                key: ItemKey {
                    name: row.get(1)?,
                    set_name: row.get(2)?,
                    card_number: row.get(3)?,
                    condition: row.get(4)?,
                },
                rarity: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn load_observations(&self) -> Result<Vec<PriceObservation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, item_id, source, price_cents, currency, url, captured_at
             FROM observations",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PriceObservation {
                id: row.get(0)?,
                item_id: ItemId(row.get(1)?),
                source: row.get(2)?,
                price: Price::from_cents(row.get(3)?),
                currency: row.get(4)?,
                url: row.get(5)?,
                captured_at: row.get(6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Read-only derivation over the ledger's current contents. Never
    /// mutates the store.
    pub fn query_derived_views(
        &self,
        reference_lag: Duration,
        limit: usize,
    ) -> Result<Vec<DerivedItemView>> {
        let items = self.load_items()?;
        let observations = self.load_observations()?;
        Ok(derive_views(&items, &observations, reference_lag, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn key(name: &str) -> ItemKey {
        ItemKey::new(name, "Scarlet & Violet 151", "", "Near Mint")
    }

    #[test]
    fn upsert_is_idempotent_on_natural_key() {
        let store = LedgerStore::open_in_memory().unwrap();
        let first = store.upsert_item(&key("Charizard ex"), "Ultra Rare").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.upsert_item(&key("Charizard ex"), "Special Illustration Rare").unwrap();

        assert_eq!(first, second);
        let items = store.load_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].rarity, "Special Illustration Rare");
        assert!(items[0].updated_at > items[0].created_at);
    }

    #[test]
    fn distinct_natural_keys_get_distinct_ids() {
        let store = LedgerStore::open_in_memory().unwrap();
        let a = store.upsert_item(&key("Charizard ex"), "").unwrap();
        let b = store.upsert_item(&key("Pikachu ex"), "").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn observations_accumulate_and_cascade_on_delete() {
        let store = LedgerStore::open_in_memory().unwrap();
        let item_id = store.upsert_item(&key("Mew ex"), "Secret Rare").unwrap();

        for cents in [15675, 16225, 15900] {
            store
                .append_observation(item_id, "TCGPlayer", Price::from_cents(cents), None, None)
                .unwrap();
        }
        assert_eq!(store.observation_count(item_id).unwrap(), 3);

        assert!(store.delete_item(item_id).unwrap());
        assert_eq!(store.observation_count(item_id).unwrap(), 0);
        assert!(store.load_items().unwrap().is_empty());
        assert!(store.load_observations().unwrap().is_empty());
    }

    #[test]
    fn delete_unknown_item_reports_no_row() {
        let store = LedgerStore::open_in_memory().unwrap();
        assert!(!store.delete_item(ItemId(999)).unwrap());
    }

    #[test]
    fn negative_price_is_rejected() {
        let store = LedgerStore::open_in_memory().unwrap();
        let item_id = store.upsert_item(&key("Pikachu ex"), "").unwrap();
        let err = store
            .append_observation(item_id, "TCGPlayer", Price::from_f64(-1.50), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::NegativePrice { .. }));
        assert_eq!(store.observation_count(item_id).unwrap(), 0);
    }

    #[test]
    fn unknown_item_is_rejected() {
        let store = LedgerStore::open_in_memory().unwrap();
        let err = store
            .append_observation(ItemId(42), "TCGPlayer", Price::from_f64(1.0), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownItem(ItemId(42))));
    }

    #[test]
    fn currency_defaults_to_usd() {
        let store = LedgerStore::open_in_memory().unwrap();
        let item_id = store.upsert_item(&key("Eevee"), "").unwrap();
        store
            .append_observation(item_id, "PriceCharting", Price::from_f64(3.25), None, None)
            .unwrap();
        let observations = store.load_observations().unwrap();
        assert_eq!(observations[0].currency, "USD");
    }

    #[test]
    fn derived_views_match_two_source_scenario() {
        // Source A: 100 at t0, 110 at t0+2h (1h lag => reference exists).
        // Source B: only 50 at t0+2h (no reference => zero change).
        let store = LedgerStore::open_in_memory().unwrap();
        let item_id = store.upsert_item(&key("Charizard ex"), "Ultra Rare").unwrap();
        let t0 = Utc::now() - ChronoDuration::hours(3);

        store
            .append_observation_at(item_id, "A", Price::from_f64(100.0), None, None, t0)
            .unwrap();
        store
            .append_observation_at(
                item_id,
                "A",
                Price::from_f64(110.0),
                None,
                None,
                t0 + ChronoDuration::hours(2),
            )
            .unwrap();
        store
            .append_observation_at(
                item_id,
                "B",
                Price::from_f64(50.0),
                None,
                None,
                t0 + ChronoDuration::hours(2),
            )
            .unwrap();

        let views = store
            .query_derived_views(std::time::Duration::from_secs(3600), 100)
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].price, 80.0);
        assert_eq!(views[0].change, 5.0);
        assert_eq!(views[0].change_percent, 5.0);
        assert_eq!(views[0].sources, "A, B");
    }
}
