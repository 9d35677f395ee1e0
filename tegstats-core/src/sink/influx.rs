//! Запись снапшотов в InfluxDB через HTTP API `/api/v2/write`.
//!
//! Точки сериализует `influxdb`, а отправка идёт собственным клиентом
//! `reqwest`, чтобы TLS-политика и адресация org/bucket задавались из конфига.
//! Строки line protocol копятся в буфере и отправляются, когда буфер
//! дорастает до размера пачки, когда истёк интервал сброса и при остановке.
//! Для InfluxDB 1.x используется режим совместимости: токен `user:pass`
//! и бакет `database/retention_policy`.

use super::points::snapshot_points;
use super::SnapshotSink;
use crate::collector::Snapshot;
use crate::config::InfluxDbConfig;
use crate::error::SinkError;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Buffer {
    lines: Vec<String>,
    last_flush: Instant,
}

pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    query: Vec<(&'static str, String)>,
    auth: Option<String>,
    prefix: String,
    batch_size: usize,
    flush_interval: Duration,
    buffer: Mutex<Buffer>,
}

impl std::fmt::Debug for InfluxSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxSink")
            .field("write_url", &self.write_url)
            .field("query", &self.query)
            .field("prefix", &self.prefix)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

impl InfluxSink {
    pub fn new(config: &InfluxDbConfig) -> Result<Self, SinkError> {
        let bucket = config.write_destination().ok_or_else(|| {
            SinkError::Config(
                "must configure at least one of bucket or database/retention policy".to_string(),
            )
        })?;
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.skip_verify_ssl)
            .timeout(Duration::from_secs(30))
            .build()?;
        let auth = config.auth_token();

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.address.trim_end_matches('/')),
            query: vec![
                ("org", config.organization.clone()),
                ("bucket", bucket),
                ("precision", "ns".to_string()),
            ],
            auth: (!auth.is_empty()).then(|| format!("Token {auth}")),
            prefix: config.measurement_prefix.clone(),
            batch_size: config.batch_size(),
            flush_interval: config.flush_interval(),
            buffer: Mutex::new(Buffer {
                lines: Vec::new(),
                last_flush: Instant::now(),
            }),
        })
    }

    /// Сколько строк ожидает отправки.
    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.lines.len()
    }

    async fn send(&self, lines: Vec<String>) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let count = lines.len();
        let mut request = self
            .client
            .post(&self.write_url)
            .query(&self.query)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(lines.join("\n"));
        if let Some(auth) = &self.auth {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                code: status.as_u16(),
                body,
            });
        }
        debug!(lines = count, "Wrote points to InfluxDB");
        Ok(())
    }

    async fn drain(&self) -> Vec<String> {
        let mut buffer = self.buffer.lock().await;
        buffer.last_flush = Instant::now();
        std::mem::take(&mut buffer.lines)
    }
}

#[async_trait]
impl SnapshotSink for InfluxSink {
    async fn write(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let mut lines = Vec::new();
        for point in snapshot_points(snapshot, &self.prefix) {
            if let Some(line) = point.to_line()? {
                lines.push(line);
            }
        }

        let due = {
            let mut buffer = self.buffer.lock().await;
            buffer.lines.extend(lines);
            buffer.lines.len() >= self.batch_size
                || buffer.last_flush.elapsed() >= self.flush_interval
        };

        if due {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let lines = self.drain().await;
        let count = lines.len();
        self.send(lines).await.inspect_err(|e| {
            warn!(lines = count, error = %e, "Dropping points after failed InfluxDB write");
        })
    }

    fn backend_name(&self) -> &str {
        "influxdb"
    }
}
