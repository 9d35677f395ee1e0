//! Ядро сборщика телеметрии домашнего энергошлюза.
//!
//! Цикл опроса ([`run_daemon`]) держит сессию на шлюзе, раз в интервал
//! параллельно опрашивает все эндпоинты ([`collector::collect_all`]) и
//! передаёт собранный снапшот в [`sink::SnapshotSink`].

pub mod collector;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod sink;
pub mod timefmt;
pub mod vitals;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use config::Config;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::collect_all;
use crate::error::{CollectCause, FetchError};
use crate::gateway::{endpoints, Credentials, Session, SessionManager, Transport, TransportConfig};
use crate::sink::SnapshotSink;

/// Callback функция для уведомления о готовности демона (например, для systemd notify).
pub type ReadyCallback = Box<dyn Fn() + Send + Sync>;

/// Callback функция для обновления статуса демона (например, для systemd notify).
pub type StatusCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Как часто логировать статистику и обновлять статус (в циклах).
const STATS_LOG_INTERVAL: u64 = 10;

/// Статистика циклов опроса.
///
/// Логируется каждые [`STATS_LOG_INTERVAL`] циклов и при завершении,
/// а также возвращается из [`run_daemon`].
///
/// ```
/// use std::time::Duration;
/// use tegstats_core::PollStats;
///
/// let mut stats = PollStats::new();
/// stats.record_successful_cycle(Duration::from_millis(100));
/// stats.record_successful_cycle(Duration::from_millis(300));
/// stats.record_failed_cycle();
///
/// assert_eq!(stats.total_cycles, 3);
/// assert_eq!(stats.average_cycle_duration(), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollStats {
    /// Общее количество циклов (успешных и с ошибками)
    pub total_cycles: u64,
    /// Циклы, собравшие полный снапшот
    pub successful_cycles: u64,
    /// Циклы, прерванные ошибкой эндпоинта
    pub failed_cycles: u64,
    /// Повторные входы после истечения сессии
    pub session_refreshes: u64,
    /// Снапшоты, принятые приёмником
    pub snapshots_written: u64,
    /// Ошибки записи в приёмник
    pub sink_errors: u64,
    /// Суммарная длительность успешных циклов
    pub total_duration: Duration,
    /// Самый долгий успешный цикл
    pub max_cycle_duration: Duration,
}

impl PollStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_successful_cycle(&mut self, duration: Duration) {
        self.total_cycles += 1;
        self.successful_cycles += 1;
        self.total_duration += duration;
        self.max_cycle_duration = self.max_cycle_duration.max(duration);
    }

    pub fn record_failed_cycle(&mut self) {
        self.total_cycles += 1;
        self.failed_cycles += 1;
    }

    pub fn record_session_refresh(&mut self) {
        self.session_refreshes += 1;
    }

    pub fn record_snapshot_written(&mut self) {
        self.snapshots_written += 1;
    }

    pub fn record_sink_error(&mut self) {
        self.sink_errors += 1;
    }

    /// Средняя длительность успешного цикла; ноль, если таких не было.
    pub fn average_cycle_duration(&self) -> Duration {
        if self.successful_cycles == 0 {
            return Duration::ZERO;
        }
        let avg_nanos = self.total_duration.as_nanos() / u128::from(self.successful_cycles);
        Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX))
    }

    /// Короткая строка для статуса сервиса.
    pub fn status_line(&self) -> String {
        format!(
            "cycles: {} ({} ok, {} failed), avg {}ms, written: {}",
            self.total_cycles,
            self.successful_cycles,
            self.failed_cycles,
            self.average_cycle_duration().as_millis(),
            self.snapshots_written
        )
    }

    pub fn log_stats(&self) {
        info!(
            "Poll stats: {} total cycles ({} successful, {} failed), \
             avg cycle: {:.2}ms, max cycle: {}ms, \
             snapshots written: {}, sink errors: {}, session refreshes: {}",
            self.total_cycles,
            self.successful_cycles,
            self.failed_cycles,
            self.average_cycle_duration().as_secs_f64() * 1000.0,
            self.max_cycle_duration.as_millis(),
            self.snapshots_written,
            self.sink_errors,
            self.session_refreshes
        );
    }
}

/// Нужно ли войти заново перед очередным циклом.
///
/// Сессии нет, либо текущий момент уже не раньше её срока истечения.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => now >= expires_at,
        None => true,
    }
}

/// Сколько спать до следующего цикла.
///
/// Цикл, превысивший интервал, не пропускает следующий: он начнётся сразу.
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

fn session_manager(config: &Config) -> Result<SessionManager> {
    let base_url = config.gateway.base_url()?;
    let mut transport = TransportConfig::new(base_url);
    transport.skip_verify_ssl = config.gateway.skip_verify_ssl;
    transport.request_timeout = config.gateway.request_timeout();

    let credentials = Credentials {
        email: config.gateway.email.clone(),
        password: config.gateway.password.clone(),
    };
    Ok(SessionManager::new(transport, credentials))
}

/// Перевести watch-канал завершения в токен отмены.
///
/// Закрытый канал тоже считается сигналом завершения.
fn spawn_shutdown_watcher(
    mut shutdown_rx: watch::Receiver<bool>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    if *shutdown_rx.borrow_and_update() {
        token.cancel();
    }
    tokio::spawn(async move {
        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }
            if shutdown_rx.changed().await.is_err() {
                debug!("Shutdown channel closed");
                break;
            }
        }
        token.cancel();
    })
}

async fn flush_sink(sink: &dyn SnapshotSink, stats: &mut PollStats) {
    if let Err(e) = sink.flush().await {
        stats.record_sink_error();
        warn!("Failed to flush {} sink: {}", sink.backend_name(), e);
    }
}

/// Основной цикл опроса.
///
/// Каждый цикл: при истёкшей (или ещё не полученной) сессии выполняется
/// вход, затем все эндпоинты опрашиваются параллельно, а снапшот передаётся
/// в `sink`. Следующий цикл начинается через `polling.interval` после
/// начала текущего.
///
/// # Ошибки
///
/// - ошибка входа фатальна, без сессии ни один цикл не пройдёт;
/// - ошибка цикла фатальна только при `polling.exit_on_fail`, иначе
///   логируется с указанием эндпоинта и цикл пропускается;
/// - ошибки записи в `sink` логируются и учитываются в статистике.
///
/// При получении сигнала завершения буфер приёмника сбрасывается, и
/// функция возвращает накопленную статистику.
pub async fn run_daemon(
    config: Config,
    sink: Arc<dyn SnapshotSink>,
    shutdown_rx: watch::Receiver<bool>,
    on_ready: Option<ReadyCallback>,
    on_status_update: Option<StatusCallback>,
) -> Result<PollStats> {
    info!(
        "Initializing tegstats collector for {} (sink = {})",
        config.gateway.address,
        sink.backend_name()
    );

    let manager = session_manager(&config)?;
    let descriptors = endpoints::all();
    let interval = config.polling.interval();

    let shutdown = CancellationToken::new();
    let watcher = spawn_shutdown_watcher(shutdown_rx, shutdown.clone());

    let mut stats = PollStats::new();
    let mut session: Option<Arc<Session>> = None;
    let mut ready_sent = false;

    let outcome: Result<()> = loop {
        if shutdown.is_cancelled() {
            info!("Shutdown signal received, exiting poll loop");
            break Ok(());
        }

        if needs_refresh(session.as_ref().map(|s| s.expires_at()), Utc::now()) {
            if session.is_some() {
                info!("Gateway session expired, logging in again");
                stats.record_session_refresh();
            }
            let authenticated = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received during login");
                    break Ok(());
                }
                result = manager.authenticate() => result,
            };
            match authenticated {
                Ok(fresh) => {
                    info!("Gateway session valid until {}", fresh.expires_at());
                    session = Some(Arc::new(fresh));
                }
                Err(e) => {
                    error!("Failed to authenticate with gateway: {}", e);
                    break Err(anyhow::Error::new(e).context("gateway authentication failed"));
                }
            }
            if !ready_sent {
                ready_sent = true;
                if let Some(ref callback) = on_ready {
                    callback();
                }
            }
        }

        let Some(current) = session.as_ref() else {
            break Err(anyhow::anyhow!("no gateway session after login"));
        };
        let transport: Arc<dyn Transport> = Arc::clone(current) as Arc<dyn Transport>;

        let cycle_start = Instant::now();
        match collect_all(transport, &descriptors, &shutdown).await {
            Ok(snapshot) => {
                stats.record_successful_cycle(cycle_start.elapsed());
                match sink.write(&snapshot).await {
                    Ok(()) => stats.record_snapshot_written(),
                    Err(e) => {
                        stats.record_sink_error();
                        warn!("Failed to write snapshot to {} sink: {}", sink.backend_name(), e);
                    }
                }
            }
            Err(e) if matches!(e.cause, CollectCause::Fetch(FetchError::Cancelled)) && shutdown.is_cancelled() => {
                debug!("Collection interrupted by shutdown");
                break Ok(());
            }
            Err(e) => {
                stats.record_failed_cycle();
                error!(endpoint = %e.endpoint, "Collection cycle failed: {}", e);
                if config.polling.exit_on_fail {
                    break Err(anyhow::Error::new(e).context("collection cycle failed and exit_on_fail is set"));
                }
            }
        }

        if stats.total_cycles > 0 && stats.total_cycles % STATS_LOG_INTERVAL == 0 {
            stats.log_stats();
            if let Some(ref callback) = on_status_update {
                callback(&stats.status_line());
            }
        }

        let elapsed = cycle_start.elapsed();
        let pause = sleep_duration(interval, elapsed);
        if pause.is_zero() {
            warn!(
                "Cycle took {}ms, longer than polling interval of {}ms; starting next cycle immediately",
                elapsed.as_millis(),
                interval.as_millis()
            );
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown signal received, exiting poll loop");
                break Ok(());
            }
            _ = tokio::time::sleep(pause) => {}
        }
    };

    watcher.abort();
    flush_sink(sink.as_ref(), &mut stats).await;
    stats.log_stats();

    match outcome {
        Ok(()) => {
            info!("tegstats collector stopped");
            Ok(stats)
        }
        Err(e) => Err(e).context("poll loop terminated"),
    }
}
