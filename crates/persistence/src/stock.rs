//! `StockService` over the `products` table (C5, §4.6/§13).
//!
//! Grounded on the original's `product_service.py`: reads may be served from a
//! short-TTL cache, reservations and releases always go straight to the store
//! and invalidate the cached entry.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use scylla::frame::response::result::Row;

use voice_agent_core::{Error, ProductRecord, Result, StockService};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Matches the original's `product_service.py` 5-minute product-read cache.
const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: usize = 1024;

struct StockRow {
    stock_available: i32,
    stock_reserved: i32,
}

struct CacheEntry {
    available: bool,
    cached_at: Instant,
}

/// `StockService` backed by ScyllaDB's `products` table, with an in-memory
/// read-through cache in front of `check_stock`.
pub struct ScyllaStockService {
    client: ScyllaClient,
    cache: Mutex<LruCache<(String, u32), CacheEntry>>,
}

impl ScyllaStockService {
    pub fn new(client: ScyllaClient) -> Self {
        Self {
            client,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is nonzero"),
            )),
        }
    }

    fn invalidate(&self, product_key: &str) {
        let mut cache = self.cache.lock();
        cache.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>().into_iter().for_each(|key| {
            if key.0 == product_key {
                cache.pop(&key);
            }
        });
    }

    async fn fetch(&self, product_key: &str) -> std::result::Result<Option<StockRow>, PersistenceError> {
        let query = format!(
            "SELECT stock_available, stock_reserved FROM {}.products WHERE product_key = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (product_key,))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let Some(rows) = result.rows else {
            return Ok(None);
        };
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(row_to_stock(row)?))
    }

    /// Full product listing, for seeding `SemanticCatalogIndex` at startup
    /// (§6). Not part of `StockService` — callers outside the composition
    /// root only ever need single-key stock checks.
    pub async fn list_products(&self) -> std::result::Result<Vec<ProductRecord>, PersistenceError> {
        let query = format!(
            "SELECT product_key, display_name, category, unit_price FROM {}.products",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, &[])
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let Some(rows) = result.rows else {
            return Ok(Vec::new());
        };

        rows.into_iter()
            .map(|row| {
                let (key, display_name, category, unit_price): (String, String, String, f64) =
                    row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                Ok(ProductRecord {
                    key,
                    display_name,
                    category,
                    unit_price,
                    metadata: serde_json::Value::Null,
                })
            })
            .collect()
    }

    async fn adjust_reserved(&self, product_key: &str, delta: i32) -> std::result::Result<(), PersistenceError> {
        let row = self
            .fetch(product_key)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(product_key.to_string()))?;
        let next_reserved = (row.stock_reserved + delta).max(0);

        let query = format!(
            "UPDATE {}.products SET stock_reserved = ? WHERE product_key = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (next_reserved, product_key))
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        self.invalidate(product_key);
        Ok(())
    }
}

fn row_to_stock(row: Row) -> std::result::Result<StockRow, PersistenceError> {
    let (stock_available, stock_reserved): (i32, i32) =
        row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
    Ok(StockRow {
        stock_available,
        stock_reserved,
    })
}

#[async_trait]
impl StockService for ScyllaStockService {
    async fn check_stock(&self, product_key: &str, qty: u32) -> Result<bool> {
        let key = (product_key.to_string(), qty);
        if let Some(entry) = self.cache.lock().get(&key) {
            if entry.cached_at.elapsed() < CACHE_TTL {
                return Ok(entry.available);
            }
        }

        let row = self.fetch(product_key).await.map_err(Error::from)?;
        let available = match row {
            Some(row) => {
                let free = (row.stock_available - row.stock_reserved).max(0) as u32;
                free >= qty
            }
            None => false,
        };

        self.cache.lock().put(
            key,
            CacheEntry {
                available,
                cached_at: Instant::now(),
            },
        );
        Ok(available)
    }

    async fn reserve(&self, product_key: &str, qty: u32) -> Result<()> {
        let row = self
            .fetch(product_key)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::NotFound(product_key.to_string()))?;
        let free = (row.stock_available - row.stock_reserved).max(0) as u32;
        if free < qty {
            return Err(Error::InsufficientStock {
                product_key: product_key.to_string(),
                requested: qty,
                available: free,
            });
        }

        self.adjust_reserved(product_key, qty as i32).await.map_err(Error::from)
    }

    async fn release(&self, product_key: &str, qty: u32) -> Result<()> {
        match self.adjust_reserved(product_key, -(qty as i32)).await {
            Ok(()) => Ok(()),
            Err(PersistenceError::NotFound(_)) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_respects_ttl() {
        let entry = CacheEntry {
            available: true,
            cached_at: Instant::now() - Duration::from_secs(301),
        };
        assert!(entry.cached_at.elapsed() >= CACHE_TTL);
    }
}
