//! Response cache with per-entry TTL.
//!
//! Values are opaque bytes at this layer; [`ResponseCache::get_value`] and
//! [`ResponseCache::set_value`] encode typed values through
//! [`ValidatedCacheEntry`]. A failing backend never surfaces to callers:
//! reads become misses and writes report `false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache_validator::ValidatedCacheEntry;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Data class of a cached value; determines its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
    /// Soil and elevation.
    Static,
    Demographics,
    Transactions,
    /// Property, valuation, scores and aggregated records.
    Property,
    AirQuality,
    Weather,
    Traffic,
}

impl CacheClass {
    pub fn ttl(&self) -> Duration {
        match self {
            CacheClass::Static => Duration::from_secs(90 * DAY),
            CacheClass::Demographics => Duration::from_secs(30 * DAY),
            CacheClass::Transactions => Duration::from_secs(7 * DAY),
            CacheClass::Property => Duration::from_secs(24 * HOUR),
            CacheClass::AirQuality => Duration::from_secs(HOUR),
            CacheClass::Weather => Duration::from_secs(30 * MINUTE),
            CacheClass::Traffic => Duration::from_secs(5 * MINUTE),
        }
    }
}

/// Deterministic cache key generators.
pub mod keys {
    use crate::models::{normalize_house_number, normalize_postcode};

    fn coord(value: f64) -> String {
        format!("{:.4}", value)
    }

    pub fn property(building_id: &str) -> String {
        format!("property:{}", building_id)
    }

    pub fn valuation(building_id: &str) -> String {
        format!("valuation:{}", building_id)
    }

    pub fn transactions(building_id: &str) -> String {
        format!("transactions:{}", building_id)
    }

    pub fn scores(building_id: &str) -> String {
        format!("scores:{}", building_id)
    }

    pub fn weather(lat: f64, lon: f64) -> String {
        format!("weather:{}:{}", coord(lat), coord(lon))
    }

    pub fn traffic(lat: f64, lon: f64, radius: u32) -> String {
        format!("traffic:{}:{}:{}", coord(lat), coord(lon), radius)
    }

    pub fn air_quality(lat: f64, lon: f64) -> String {
        format!("airquality:{}:{}", coord(lat), coord(lon))
    }

    pub fn soil(lat: f64, lon: f64) -> String {
        format!("soil:{}:{}", coord(lat), coord(lon))
    }

    pub fn elevation(lat: f64, lon: f64) -> String {
        format!("elevation:{}:{}", coord(lat), coord(lon))
    }

    pub fn demographics(region_code: &str) -> String {
        format!("demographics:{}", region_code)
    }

    /// `aggregated:<POSTCODE>:<HOUSENUMBER>`, normalizing both parts.
    pub fn aggregated(postcode: &str, house_number: &str) -> String {
        format!(
            "aggregated:{}:{}",
            normalize_postcode(postcode),
            normalize_house_number(house_number)
        )
    }
}

/// Failure reported by a cache backend.
#[derive(Debug, Clone)]
pub struct CacheError(pub String);

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache backend error: {}", self.0)
    }
}

impl std::error::Error for CacheError {}

/// Storage backend behind [`ResponseCache`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn flush(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
    inserted_at: DateTime<Utc>,
}

/// Expires every entry after its own TTL, restarting on overwrite.
struct PerEntryExpiry;

impl Expiry<String, StoredEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process backend on top of `moka`.
pub struct MemoryBackend {
    entries: Cache<String, StoredEntry>,
}

impl MemoryBackend {
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .entries
            .get(key)
            .await
            .map(|entry| {
                tracing::trace!(
                    "Cache hit {} (stored {}s ago, ttl {}s)",
                    key,
                    (Utc::now() - entry.inserted_at).num_seconds(),
                    entry.ttl.as_secs()
                );
                entry.bytes.as_ref().clone()
            }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = StoredEntry {
            bytes: Arc::new(value),
            ttl,
            inserted_at: Utc::now(),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.get(key).await.is_some())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.entries.invalidate_all();
        Ok(())
    }
}

/// Shared cache façade used by the orchestrator, adapters and handlers.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Option<Arc<dyn CacheBackend>>,
    degraded: Arc<AtomicBool>,
}

impl ResponseCache {
    pub fn in_memory(max_capacity: u64) -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new(max_capacity)))
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A cache that never hits and never stores.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a backend failure has been observed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn report_failure(&self, operation: &str, key: &str, err: &CacheError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "Cache unavailable ({} {}): {}; continuing without cache",
                operation,
                key,
                err
            );
        } else {
            tracing::debug!("Cache {} failed for {}: {}", operation, key, err);
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let backend = self.backend.as_ref()?;
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.report_failure("get", key, &e);
                None
            }
        }
    }

    /// Stores `value`; returns whether the write succeeded.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.report_failure("set", key, &e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                self.report_failure("delete", key, &e);
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                self.report_failure("exists", key, &e);
                false
            }
        }
    }

    pub async fn flush(&self) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.flush().await {
            Ok(()) => true,
            Err(e) => {
                self.report_failure("flush", "*", &e);
                false
            }
        }
    }

    /// Reads and decodes a typed value; corrupt entries count as misses.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        let value = ValidatedCacheEntry::decode_value(&bytes);
        if value.is_none() {
            tracing::warn!("Discarding unreadable cache entry {}", key);
            self.delete(key).await;
        }
        value
    }

    /// Encodes and stores a typed value.
    pub async fn set_value<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match ValidatedCacheEntry::from_value(value) {
            Ok(entry) => self.set(key, entry.to_bytes(), ttl).await,
            Err(e) => {
                tracing::error!("Failed to encode cache value for {}: {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError("connection lost".to_string()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError("connection lost".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError("connection lost".to_string()))
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError("connection lost".to_string()))
        }
        async fn flush(&self) -> Result<(), CacheError> {
            Err(CacheError("connection lost".to_string()))
        }
    }

    #[test]
    fn test_ttl_policy() {
        assert_eq!(CacheClass::Static.ttl(), Duration::from_secs(90 * 86_400));
        assert_eq!(CacheClass::Demographics.ttl(), Duration::from_secs(30 * 86_400));
        assert_eq!(CacheClass::Transactions.ttl(), Duration::from_secs(7 * 86_400));
        assert_eq!(CacheClass::Property.ttl(), Duration::from_secs(86_400));
        assert_eq!(CacheClass::AirQuality.ttl(), Duration::from_secs(3_600));
        assert_eq!(CacheClass::Weather.ttl(), Duration::from_secs(1_800));
        assert_eq!(CacheClass::Traffic.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(keys::weather(52.090_737, 5.121_42), "weather:52.0907:5.1214");
        assert_eq!(keys::traffic(52.0, 5.0, 1000), "traffic:52.0000:5.0000:1000");
        assert_eq!(keys::air_quality(52.0, 5.0), "airquality:52.0000:5.0000");
        assert_eq!(keys::demographics("BU03440101"), "demographics:BU03440101");
        assert_eq!(keys::valuation("0344"), "valuation:0344");
        assert_eq!(keys::aggregated(" 3541 ed ", "53 "), "aggregated:3541ED:53");
        assert_eq!(keys::aggregated("3541ED", "53"), keys::aggregated(" 3541 ed ", "53 "));
    }

    #[tokio::test]
    async fn test_memory_round_trip_and_delete() {
        let cache = ResponseCache::in_memory(100);
        assert_eq!(cache.get("k").await, None);

        assert!(cache.set("k", vec![1, 2, 3], Duration::from_secs(60)).await);
        assert_eq!(cache.get("k").await, Some(vec![1, 2, 3]));
        assert!(cache.exists("k").await);

        assert!(cache.delete("k").await);
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_entries_expire_individually() {
        let cache = ResponseCache::in_memory(100);
        cache.set("short", vec![1], Duration::from_millis(100)).await;
        cache.set("long", vec![2], Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some(vec![2]));
    }

    #[tokio::test]
    async fn test_typed_values() {
        let cache = ResponseCache::in_memory(100);
        let value = vec![Some("a".to_string()), None];
        assert!(cache.set_value("typed", &value, Duration::from_secs(60)).await);

        let back: Option<Vec<Option<String>>> = cache.get_value("typed").await;
        assert_eq!(back, Some(value));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let cache = ResponseCache::in_memory(100);
        cache.set("bad", vec![0; 40], Duration::from_secs(60)).await;

        let value: Option<String> = cache.get_value("bad").await;
        assert_eq!(value, None);
        assert!(!cache.exists("bad").await);
    }

    #[tokio::test]
    async fn test_failing_backend_degrades() {
        let cache = ResponseCache::with_backend(Arc::new(FailingBackend));

        assert_eq!(cache.get("k").await, None);
        assert!(!cache.set("k", vec![1], Duration::from_secs(1)).await);
        assert!(!cache.exists("k").await);
        assert!(cache.is_degraded());
    }

    #[tokio::test]
    async fn test_flush() {
        let cache = ResponseCache::in_memory(100);
        cache.set("a", vec![1], Duration::from_secs(60)).await;
        assert!(cache.flush().await);
        // invalidate_all is applied lazily on the next read
        assert_eq!(cache.get("a").await, None);
    }
}
