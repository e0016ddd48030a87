//! In-memory backend: a readers-writer-locked map.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use metrond_common::metric::{Metric, MetricType};

use crate::{Storage, StorageError};

#[derive(Default)]
pub struct MemStorage {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Metric>> {
        // the map stays consistent across a poisoned lock
        self.metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Metric>> {
        self.metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        self.update(metrics).await
    }

    async fn update(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        let mut map = self.guard();
        for metric in metrics {
            map.insert(metric.id.clone(), metric);
        }
        Ok(())
    }

    async fn get(&self, id: &str, mtype: MetricType) -> Result<Option<Metric>, StorageError> {
        let map = self.read_guard();
        Ok(map
            .get(id)
            .filter(|metric| metric.mtype == mtype)
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<HashMap<String, Metric>, StorageError> {
        let map = self.read_guard();
        Ok(ids
            .iter()
            .filter_map(|id| map.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<Metric>, StorageError> {
        let map = self.read_guard();
        Ok(map.values().cloned().collect())
    }
}
