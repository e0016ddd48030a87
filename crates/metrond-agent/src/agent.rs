//! The agent core: a poll/report pipeline.
//!
//! Poll ticks fan out one task per collector and fan the batches back into
//! a single snapshot, then append the `PollCount` counter under its own
//! lock. Report ticks enqueue a job into a bounded channel drained by
//! `rate_limit` send workers.
//!
//! `PollCount` ships the cumulative poll count captured at marshal time;
//! after a `200` the agent subtracts exactly that captured value, so poll
//! ticks that land while a request is in flight are not lost. The snapshot
//! lock and the counter lock are never held at the same time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrond_collector::host::HostCollector;
use metrond_collector::runtime::RuntimeCollector;
use metrond_collector::Collector;
use metrond_common::metric::{Metric, MetricValue};
use metrond_common::{compress, retry, sign};
use metrond_crypto::Encryptor;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::classify::{classify_send, SendError};
use crate::config::AgentConfig;

pub const POLL_COUNTER_NAME: &str = "PollCount";

type SharedCollector = Arc<Mutex<Box<dyn Collector>>>;

pub struct Agent {
    config: AgentConfig,
    collectors: Vec<SharedCollector>,
    metrics: Mutex<Vec<Metric>>,
    poll_count: Mutex<i64>,
    encryptor: Option<Encryptor>,
    client: reqwest::Client,
}

impl Agent {
    pub fn new(config: AgentConfig) -> anyhow::Result<Arc<Self>> {
        let encryptor = if config.crypto_key.is_empty() {
            None
        } else {
            Some(
                Encryptor::from_pem_file(&config.crypto_key)
                    .context("cannot initialize encryptor")?,
            )
        };

        // A 3xx would silently flip the batch POST into a GET if followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("cannot build http client")?;

        let runtime: Box<dyn Collector> = Box::new(RuntimeCollector::new());
        let host: Box<dyn Collector> = Box::new(HostCollector::new());
        let collectors: Vec<SharedCollector> =
            vec![Arc::new(Mutex::new(runtime)), Arc::new(Mutex::new(host))];

        Ok(Arc::new(Self {
            config,
            collectors,
            metrics: Mutex::new(Vec::new()),
            poll_count: Mutex::new(0),
            encryptor,
            client,
        }))
    }

    /// Runs the poll and report tickers until ctrl-c.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        tracing::info!(
            address = %self.config.address,
            poll_interval = self.config.poll_interval,
            report_interval = self.config.report_interval,
            rate_limit = self.config.rate_limit,
            signing = !self.config.key.is_empty(),
            encryption = self.encryptor.is_some(),
            "starting agent"
        );

        let (jobs_tx, jobs_rx) = mpsc::channel::<()>(1);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));
        for worker in 0..self.config.rate_limit.max(1) {
            let agent = self.clone();
            let rx = jobs_rx.clone();
            tokio::spawn(async move { agent.send_worker(worker, rx).await });
        }

        let poll_period = Duration::from_secs(self.config.poll_interval.max(1));
        let report_period = Duration::from_secs(self.config.report_interval.max(1));
        let mut poll_tick = interval_at(Instant::now() + poll_period, poll_period);
        let mut report_tick = interval_at(Instant::now() + report_period, report_period);

        loop {
            tokio::select! {
                _ = poll_tick.tick() => {
                    let agent = self.clone();
                    tokio::spawn(async move { agent.update_metrics().await });
                }
                _ = report_tick.tick() => {
                    if jobs_tx.send(()).await.is_err() {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down gracefully");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn send_worker(self: Arc<Self>, worker: usize, jobs: Arc<Mutex<mpsc::Receiver<()>>>) {
        loop {
            let job = { jobs.lock().await.recv().await };
            match job {
                Some(()) => self.send_metrics().await,
                None => {
                    tracing::debug!(worker, "send worker stopped");
                    break;
                }
            }
        }
    }

    /// One poll tick: fan-out collectors, fan-in their batches, bump the
    /// poll counter, atomically replace the snapshot.
    pub(crate) async fn update_metrics(self: Arc<Self>) {
        let mut snapshot = self.collect_all().await;

        let poll_metric = {
            let mut count = self.poll_count.lock().await;
            *count += 1;
            Metric::counter(POLL_COUNTER_NAME, *count)
        };
        // PollCount is always the last element of a shipped batch
        snapshot.push(poll_metric);

        *self.metrics.lock().await = snapshot;
    }

    async fn collect_all(&self) -> Vec<Metric> {
        let done = CancellationToken::new();
        let _guard = done.clone().drop_guard();
        let (tx, mut rx) = mpsc::channel::<Vec<Metric>>(1);

        for collector in &self.collectors {
            let collector = collector.clone();
            let tx = tx.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let batch = {
                    let mut collector = collector.lock().await;
                    match collector.collect() {
                        Ok(points) => points,
                        Err(e) => {
                            tracing::warn!(collector = collector.name(), error = %e, "collection failed");
                            return;
                        }
                    }
                };
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = tx.send(batch) => {}
                }
            });
        }
        drop(tx);

        let mut merged = Vec::new();
        while let Some(batch) = rx.recv().await {
            merged.extend(batch);
        }
        merged
    }

    async fn send_metrics(&self) {
        let (body_bytes, consumed) = {
            let metrics = self.metrics.lock().await;
            if metrics.is_empty() {
                tracing::info!("nothing to send");
                return;
            }
            let consumed = match metrics.last().and_then(Metric::value) {
                Some(MetricValue::Counter(delta)) => delta,
                _ => {
                    tracing::error!("cannot read the poll counter from the snapshot");
                    return;
                }
            };
            let body = match serde_json::to_vec(&*metrics) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(error = %e, "error marshalling metrics");
                    return;
                }
            };
            (body, consumed)
        };

        let compressed = match compress::gzip(&body_bytes) {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::error!(error = %e, "error compressing metrics");
                return;
            }
        };

        let outgoing = match &self.encryptor {
            Some(encryptor) => match encryptor.encrypt(&compressed) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encrypt batch");
                    return;
                }
            },
            None => compressed,
        };

        // signed over the bytes exactly as they go on the wire
        let hash = if self.config.key.is_empty() {
            None
        } else {
            match sign::calculate(&outgoing, &self.config.key) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::error!(error = %e, "failed to sign batch");
                    return;
                }
            }
        };

        let url = format!("http://{}/updates", self.config.address);
        let cancel = CancellationToken::new();
        let result = retry::run_with_result(&cancel, classify_send, || {
            let mut request = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .header(CONTENT_ENCODING, "gzip")
                .body(outgoing.clone());
            if let Some(hash) = &hash {
                request = request.header(sign::HASH_HEADER, hash);
            }
            async move {
                let response = request.send().await.map_err(SendError::Transport)?;
                if !response.status().is_success() {
                    return Err(SendError::Status(response.status()));
                }
                Ok(response)
            }
        })
        .await;

        match result {
            Ok(response) => {
                tracing::info!(url = %url, status = response.status().as_u16(), "metrics batch sent");
                self.consume_poll_count(consumed).await;
            }
            // the counter is left as-is so the next report resends the ticks
            Err(e) => tracing::error!(error = %e, "error sending metrics"),
        }
    }

    pub(crate) async fn consume_poll_count(&self, consumed: i64) {
        let mut count = self.poll_count.lock().await;
        *count = (*count - consumed).max(0);
    }

    #[cfg(test)]
    pub(crate) async fn poll_count(&self) -> i64 {
        *self.poll_count.lock().await
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> Vec<Metric> {
        self.metrics.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn test_agent() -> Arc<Agent> {
        let config = AgentConfig::parse_from(["metrond-agent"]);
        Agent::new(config).unwrap()
    }

    #[tokio::test]
    async fn poll_tick_appends_poll_count_last() {
        let agent = test_agent();
        agent.clone().update_metrics().await;

        let snapshot = agent.snapshot().await;
        assert!(snapshot.len() > 1);
        let last = snapshot.last().unwrap();
        assert_eq!(last.id, POLL_COUNTER_NAME);
        assert_eq!(last.delta, Some(1));

        for metric in &snapshot {
            metric.check(true).unwrap();
        }
    }

    #[tokio::test]
    async fn poll_count_accumulates_across_ticks() {
        let agent = test_agent();
        agent.clone().update_metrics().await;
        agent.clone().update_metrics().await;
        agent.clone().update_metrics().await;

        assert_eq!(agent.poll_count().await, 3);
        let snapshot = agent.snapshot().await;
        assert_eq!(snapshot.last().unwrap().delta, Some(3));
    }

    #[tokio::test]
    async fn consumption_subtracts_exactly_what_was_shipped() {
        let agent = test_agent();
        agent.clone().update_metrics().await;
        agent.clone().update_metrics().await;

        agent.consume_poll_count(2).await;
        assert_eq!(agent.poll_count().await, 0);

        // ticks landing after the capture survive the decrement
        agent.clone().update_metrics().await;
        agent.clone().update_metrics().await;
        agent.consume_poll_count(1).await;
        assert_eq!(agent.poll_count().await, 1);
    }

    #[tokio::test]
    async fn consumption_clamps_at_zero() {
        let agent = test_agent();
        agent.clone().update_metrics().await;
        agent.consume_poll_count(100).await;
        assert_eq!(agent.poll_count().await, 0);
    }

    #[tokio::test]
    async fn snapshot_is_replaced_not_appended() {
        let agent = test_agent();
        agent.clone().update_metrics().await;
        let first_len = agent.snapshot().await.len();
        agent.clone().update_metrics().await;
        let second_len = agent.snapshot().await.len();

        // one PollCount metric per snapshot, not one per tick
        assert_eq!(first_len, second_len);
    }
}
