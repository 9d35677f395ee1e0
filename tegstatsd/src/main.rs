mod systemd;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tegstats_core::config::Config;
use tegstats_core::sink::{InfluxSink, LogSink, SnapshotSink};
use tegstats_core::{run_daemon, ReadyCallback, StatusCallback};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// Запись в InfluxDB
    Influx,
    /// Только сводка в лог
    Log,
}

#[derive(Parser, Debug)]
#[command(
    name = "tegstatsd",
    version,
    about = "Energy gateway telemetry collector"
)]
struct Args {
    /// Путь к конфигу
    #[arg(short, long, default_value = "/etc/tegstats/tegstats.yml")]
    config: String,

    /// Куда писать снапшоты; по умолчанию influx при наличии секции influxdb
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,
}

fn select_sink(requested: Option<SinkKind>, config: &Config) -> Result<Arc<dyn SnapshotSink>> {
    let kind = requested.unwrap_or(if config.influxdb.is_some() {
        SinkKind::Influx
    } else {
        SinkKind::Log
    });

    match kind {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        SinkKind::Influx => {
            let Some(influx) = config.influxdb.as_ref() else {
                bail!("--sink influx requires an influxdb section in the config");
            };
            let sink = InfluxSink::new(influx).context("failed to create InfluxDB sink")?;
            Ok(Arc::new(sink))
        }
    }
}

/// Ждать SIGINT или SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args.config)?;
    let sink = select_sink(args.sink, &config)?;

    tracing::info!(
        "Starting tegstatsd {} (config = {})",
        env!("CARGO_PKG_VERSION"),
        args.config
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Received SIGINT/SIGTERM, initiating graceful shutdown");
        let _ = shutdown_tx.send(true);
    });

    let on_ready: ReadyCallback = Box::new(|| {
        if let Err(e) = systemd::notify_ready() {
            tracing::debug!("{:#}", e);
        }
    });
    let on_status: StatusCallback = Box::new(systemd::notify_status);

    let stats = run_daemon(config, sink, shutdown_rx, Some(on_ready), Some(on_status)).await?;
    tracing::info!(
        "tegstatsd exited after {} cycles ({} snapshots written)",
        stats.total_cycles,
        stats.snapshots_written
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(with_influx: bool) -> Config {
        let mut yaml = String::from(
            r#"
gateway:
  address: "https://192.168.1.50"
  password: "secret"
polling:
  interval_secs: 10
"#,
        );
        if with_influx {
            yaml.push_str(
                r#"
influxdb:
  address: "http://localhost:8086"
  token: "t"
  organization: "home"
  bucket: "energy"
"#,
            );
        }
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        Config::load(file.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn default_args() {
        let args = Args::parse_from(["tegstatsd"]);
        assert_eq!(args.config, "/etc/tegstats/tegstats.yml");
        assert_eq!(args.sink, None);

        let args = Args::parse_from(["tegstatsd", "-c", "/tmp/t.yml", "--sink", "log"]);
        assert_eq!(args.config, "/tmp/t.yml");
        assert_eq!(args.sink, Some(SinkKind::Log));
    }

    #[test]
    fn sink_defaults_follow_config() {
        assert_eq!(select_sink(None, &config(false)).unwrap().backend_name(), "log");
        assert_eq!(select_sink(None, &config(true)).unwrap().backend_name(), "influxdb");
        assert_eq!(
            select_sink(Some(SinkKind::Log), &config(true))
                .unwrap()
                .backend_name(),
            "log"
        );
    }

    #[test]
    fn influx_sink_requires_section() {
        let Err(err) = select_sink(Some(SinkKind::Influx), &config(false)) else {
            panic!("influx sink without influxdb section must be rejected");
        };
        assert!(err.to_string().contains("influxdb section"));
    }
}
