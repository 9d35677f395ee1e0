//! Приёмники снапшотов.
//!
//! Цикл опроса отдаёт каждый успешный снапшот в [`SnapshotSink`]. Ошибка
//! записи логируется и не останавливает опрос.

pub mod influx;
pub mod line_protocol;
pub mod points;

pub use influx::InfluxSink;

use crate::collector::Snapshot;
use crate::error::SinkError;
use async_trait::async_trait;
use tracing::info;

/// Приёмник снапшотов (хранилище временных рядов, лог и т.д.).
#[async_trait]
pub trait SnapshotSink: Send + Sync + 'static {
    /// Принять снапшот. Реализация может буферизовать данные.
    async fn write(&self, snapshot: &Snapshot) -> Result<(), SinkError>;

    /// Отправить всё, что накоплено в буфере.
    async fn flush(&self) -> Result<(), SinkError>;

    /// Имя бэкенда (для логирования и отладки).
    fn backend_name(&self) -> &str;
}

/// Приёмник для пробных запусков: пишет краткую сводку снапшота в лог.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn summary(snapshot: &Snapshot) -> String {
        let meters = &snapshot.meters.data;
        format!(
            "site={:.1}W battery={:.1}W load={:.1}W solar={:.1}W soe={:.2}% grid={} faults={} inverters={} device_alerts={}",
            meters.site.instant_power_watts,
            meters.battery.instant_power_watts,
            meters.load.instant_power_watts,
            meters.solar.instant_power_watts,
            snapshot.soe.data.percentage,
            snapshot.grid_status.data.grid_status,
            snapshot.system_status.data.grid_faults.len(),
            snapshot.vitals.data.inverters.len(),
            snapshot.vitals.data.alerts.len(),
        )
    }
}

#[async_trait]
impl SnapshotSink for LogSink {
    async fn write(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        info!("[SNAPSHOT] {}", Self::summary(snapshot));
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "log"
    }
}
