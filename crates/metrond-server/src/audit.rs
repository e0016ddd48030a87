//! Optional audit sink: every accepted update fans out a record to the
//! registered auditors. All failures are best-effort and only logged.

use async_trait::async_trait;
use metrond_common::classify::is_retriable_io;
use metrond_common::retry::{self, Classification};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub ts: i64,
    pub metrics: Vec<String>,
    pub ip_address: String,
}

impl AuditRecord {
    pub fn new(metrics: Vec<String>, ip_address: String) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp(),
            metrics,
            ip_address,
        }
    }
}

#[async_trait]
pub trait Auditor: Send + Sync {
    async fn notify(&self, record: AuditRecord);
}

/// Appends one JSON record per line.
pub struct FileAuditor {
    path: String,
}

impl FileAuditor {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Auditor for FileAuditor {
    async fn notify(&self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(json) => json + "\n",
            Err(e) => {
                tracing::error!(error = %e, "cannot marshal audit record");
                return;
            }
        };

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| std::io::Write::write_all(&mut file, line.as_bytes()));
        if let Err(e) = result {
            tracing::error!(path = %self.path, error = %e, "cannot write audit record");
        }
    }
}

/// POSTs each record as JSON, with classified retries.
pub struct WebhookAuditor {
    url: String,
    client: reqwest::Client,
}

impl WebhookAuditor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

fn classify_audit(err: &reqwest::Error) -> Classification {
    if err.is_timeout() || is_retriable_io(err) {
        Classification::Retriable
    } else {
        Classification::NonRetriable
    }
}

#[async_trait]
impl Auditor for WebhookAuditor {
    async fn notify(&self, record: AuditRecord) {
        let cancel = CancellationToken::new();
        let result = retry::run_with_result(&cancel, classify_audit, || {
            self.client.post(&self.url).json(&record).send()
        })
        .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(url = %self.url, "audit record sent");
            }
            Ok(response) => {
                tracing::error!(url = %self.url, status = response.status().as_u16(), "audit endpoint rejected record");
            }
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "error notifying audit endpoint");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_auditor_appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let auditor = FileAuditor::new(path.to_str().unwrap());

        auditor
            .notify(AuditRecord::new(
                vec!["Alloc".into(), "PollCount".into()],
                "127.0.0.1:9999".into(),
            ))
            .await;
        auditor
            .notify(AuditRecord::new(vec!["C".into()], "127.0.0.1:9999".into()))
            .await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["metrics"][0], "Alloc");
        assert_eq!(first["ip_address"], "127.0.0.1:9999");
        assert!(first["ts"].as_i64().unwrap() > 0);
    }
}
