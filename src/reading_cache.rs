use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::db::models::{SensorKind, SensorReading};

/// In-memory store of the most recent `SensorReading` per `(site_id, SensorKind)`.
///
/// Written by the ingestion path, read by the control loop, seeded from the
/// store at startup. Wrapped in `Arc` so it can be cheaply cloned and shared
/// across tasks; uses `tokio::sync::RwLock` so concurrent readers never
/// block each other.
#[derive(Clone, Default)]
pub struct ReadingCache {
    inner: Arc<RwLock<HashMap<(String, SensorKind), SensorReading>>>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `reading` for `(reading.site_id, reading.sensor_kind)` unless a
    /// newer one is already cached — the transport may deliver out of order.
    pub async fn update(&self, reading: SensorReading) {
        let mut guard = self.inner.write().await;
        let key = (reading.site_id.clone(), reading.sensor_kind);
        match guard.get(&key) {
            Some(existing) if existing.recorded_at > reading.recorded_at => {}
            _ => {
                guard.insert(key, reading);
            }
        }
    }

    /// Distinct site ids currently represented in the cache, sorted.
    pub async fn site_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .read()
            .await
            .keys()
            .map(|(site_id, _)| site_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// The latest reading for a specific `(site_id, kind)`, if present.
    pub async fn get(&self, site_id: &str, kind: SensorKind) -> Option<SensorReading> {
        self.inner
            .read()
            .await
            .get(&(site_id.to_owned(), kind))
            .cloned()
    }
}
