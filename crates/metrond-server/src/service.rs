//! The upsert core.
//!
//! [`MetricsService::update_metrics`] validates a whole batch up front,
//! bulk-looks-up the stored keys, then partitions the batch into inserts
//! and updates in a single pass, merging duplicates as it goes (counters
//! add, gauges replace). Inserts are persisted before updates. No partial
//! writes: any validation failure aborts before storage is touched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrond_common::metric::{metric_ids, Metric, MetricError};
use metrond_storage::{snapshot, Storage, StorageError};
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditRecord, Auditor};
use crate::config::ServerConfig;
use crate::error::ServiceError;

const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Origin of an update, carried into audit records.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub remote_addr: String,
}

pub struct MetricsService {
    storage: Arc<dyn Storage>,
    file_storage_path: String,
    store_on_update: bool,
    auditors: Vec<Arc<dyn Auditor>>,
}

impl MetricsService {
    pub fn new(storage: Arc<dyn Storage>, config: &ServerConfig) -> Self {
        Self {
            storage,
            file_storage_path: config.file_storage_path.clone(),
            store_on_update: config.store_on_update(),
            auditors: Vec::new(),
        }
    }

    pub fn register_auditor(&mut self, auditor: Arc<dyn Auditor>) {
        self.auditors.push(auditor);
    }

    pub async fn update_metric(
        &self,
        metric: Metric,
        info: RequestInfo,
    ) -> Result<(), ServiceError> {
        self.update_metrics(vec![metric], info).await
    }

    pub async fn update_metrics(
        &self,
        incoming: Vec<Metric>,
        info: RequestInfo,
    ) -> Result<(), ServiceError> {
        let ids = metric_ids(&incoming);
        self.apply_batch(incoming).await?;

        if self.store_on_update {
            if let Err(e) = self.save_to_file().await {
                tracing::info!(error = %e, "cannot save metrics to file on update");
            }
        }

        self.notify_auditors(ids, info);
        Ok(())
    }

    /// Validate, bulk-lookup, partition-and-merge, persist.
    async fn apply_batch(&self, incoming: Vec<Metric>) -> Result<(), ServiceError> {
        for metric in &incoming {
            metric.check(true)?;
        }

        let ids = metric_ids(&incoming);
        let found = self.storage.get_by_ids(&ids).await?;

        let mut to_insert: HashMap<String, Metric> = HashMap::new();
        let mut to_update: HashMap<String, Metric> = HashMap::new();

        for metric in incoming {
            let value = metric.value().ok_or_else(|| {
                MetricError::Validation(format!("metric value is missing: id={}", metric.id))
            })?;

            if let Some(queued) = to_insert.get_mut(&metric.id) {
                queued.update_value(value)?;
            } else if let Some(queued) = to_update.get_mut(&metric.id) {
                queued.update_value(value)?;
            } else if let Some(stored) = found.get(&metric.id) {
                stored.compare_types(metric.mtype)?;
                let mut merged = stored.clone();
                merged.update_value(value)?;
                to_update.insert(merged.id.clone(), merged);
            } else {
                to_insert.insert(metric.id.clone(), metric);
            }
        }

        // new keys must land before updates touch existing ones
        if !to_insert.is_empty() {
            self.storage
                .insert(to_insert.into_values().collect())
                .await?;
        }
        if !to_update.is_empty() {
            self.storage
                .update(to_update.into_values().collect())
                .await?;
        }
        Ok(())
    }

    pub async fn get_metric(&self, incoming: &Metric) -> Result<Metric, ServiceError> {
        incoming.check(false)?;

        match self.storage.get(&incoming.id, incoming.mtype).await? {
            Some(metric) => Ok(metric),
            None => Err(ServiceError::NotFound {
                id: incoming.id.clone(),
                mtype: incoming.mtype,
            }),
        }
    }

    pub async fn get_all_metrics(&self) -> Result<Vec<Metric>, ServiceError> {
        Ok(self.storage.get_all().await?)
    }

    pub async fn ping_storage(&self) -> Result<(), ServiceError> {
        match tokio::time::timeout(PING_TIMEOUT, self.storage.ping()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServiceError::Storage(StorageError::Cancelled)),
        }
    }

    /// Loads the snapshot file, if any, through the partitioning path so
    /// counter semantics apply to whatever is already stored.
    pub async fn restore_from_file(&self) -> Result<(), ServiceError> {
        if self.file_storage_path.is_empty() {
            tracing::info!("file storage path is empty, nothing to restore");
            return Ok(());
        }
        match snapshot::load(&self.file_storage_path)? {
            Some(metrics) => {
                let count = metrics.len();
                self.apply_batch(metrics).await?;
                tracing::info!(path = %self.file_storage_path, count, "metrics restored from file");
                Ok(())
            }
            None => {
                tracing::info!(path = %self.file_storage_path, "snapshot file does not exist");
                Ok(())
            }
        }
    }

    pub async fn save_to_file(&self) -> Result<(), ServiceError> {
        if self.file_storage_path.is_empty() {
            return Err(ServiceError::Storage(StorageError::SnapshotIo(
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "file path is empty"),
            )));
        }
        let metrics = self.storage.get_all().await?;
        if metrics.is_empty() {
            tracing::info!("no metrics to save to file storage");
            return Ok(());
        }
        snapshot::save(&self.file_storage_path, &metrics)?;
        tracing::info!(path = %self.file_storage_path, count = metrics.len(), "metrics saved to file");
        Ok(())
    }

    /// Snapshots at the configured cadence until the token fires.
    pub async fn run_periodic_save(self: Arc<Self>, interval_secs: u64, stop: CancellationToken) {
        let period = Duration::from_secs(interval_secs.max(1));
        let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.save_to_file().await {
                        tracing::info!(error = %e, "cannot save metrics to file periodically");
                    }
                }
                _ = stop.cancelled() => {
                    tracing::info!("periodic save stopped");
                    return;
                }
            }
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.storage.close().await {
            tracing::error!(error = %e, "error closing storage");
        }
    }

    fn notify_auditors(&self, ids: Vec<String>, info: RequestInfo) {
        if self.auditors.is_empty() {
            return;
        }
        let record = AuditRecord::new(ids, info.remote_addr);
        for auditor in &self.auditors {
            let auditor = auditor.clone();
            let record = record.clone();
            tokio::spawn(async move { auditor.notify(record).await });
        }
    }
}
