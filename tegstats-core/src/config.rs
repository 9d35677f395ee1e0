use anyhow::{ensure, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Переменные окружения, перекрывающие секреты из файла.
pub const ENV_GATEWAY_PASSWORD: &str = "TEGSTATS_GATEWAY_PASSWORD";
pub const ENV_GATEWAY_EMAIL: &str = "TEGSTATS_GATEWAY_EMAIL";
pub const ENV_INFLUXDB_TOKEN: &str = "TEGSTATS_INFLUXDB_TOKEN";
pub const ENV_INFLUXDB_PASSWORD: &str = "TEGSTATS_INFLUXDB_PASSWORD";

/// Верхняя граница интервала опроса.
const MAX_POLL_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    /// Без этой секции снапшоты только логируются.
    #[serde(default)]
    pub influxdb: Option<InfluxDbConfig>,
    pub polling: PollingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Базовый адрес шлюза, например `https://192.168.1.50`.
    pub address: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Шлюз отдаёт самоподписанный сертификат.
    #[serde(default)]
    pub skip_verify_ssl: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub address: String,
    pub username: String,
    pub password: String,
    pub token: String,
    pub organization: String,
    pub bucket: String,
    pub database: String,
    pub retention_policy: String,
    pub measurement_prefix: String,
    pub skip_verify_ssl: bool,
    pub flush_interval_secs: u64,
    pub batch_size: usize,
}

impl InfluxDbConfig {
    pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;
    pub const DEFAULT_BATCH_SIZE: usize = 5000;

    pub fn flush_interval(&self) -> Duration {
        let secs = if self.flush_interval_secs == 0 {
            Self::DEFAULT_FLUSH_INTERVAL_SECS
        } else {
            self.flush_interval_secs
        };
        Duration::from_secs(secs)
    }

    pub fn batch_size(&self) -> usize {
        if self.batch_size == 0 {
            Self::DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    /// Токен v2 либо `user:pass` для совместимости с v1; пустая строка без авторизации.
    pub fn auth_token(&self) -> String {
        if !self.token.is_empty() {
            self.token.clone()
        } else if !self.username.is_empty() && !self.password.is_empty() {
            format!("{}:{}", self.username, self.password)
        } else {
            String::new()
        }
    }

    /// Бакет v2 либо `database/retention_policy` для v1.
    pub fn write_destination(&self) -> Option<String> {
        if !self.bucket.is_empty() {
            Some(self.bucket.clone())
        } else if !self.database.is_empty() && !self.retention_policy.is_empty() {
            Some(format!("{}/{}", self.database, self.retention_policy))
        } else {
            None
        }
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.address)
            .with_context(|| format!("influxdb.address is not a valid URL: {}", self.address))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "influxdb.address must use http or https (got {})",
            url.scheme()
        );
        ensure!(
            self.write_destination().is_some(),
            "must configure at least one of bucket or database/retention policy"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// Завершать процесс при неудачном цикле вместо перехода к следующему.
    #[serde(default)]
    pub exit_on_fail: bool,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {path}"))?;
        let mut cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse YAML config at {path}"))?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Перекрыть секреты значениями из окружения (пустые значения игнорируются).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(password) = get(ENV_GATEWAY_PASSWORD) {
            self.gateway.password = password;
        }
        if let Some(email) = get(ENV_GATEWAY_EMAIL) {
            self.gateway.email = email;
        }
        if let Some(influx) = self.influxdb.as_mut() {
            if let Some(token) = get(ENV_INFLUXDB_TOKEN) {
                influx.token = token;
            }
            if let Some(password) = get(ENV_INFLUXDB_PASSWORD) {
                influx.password = password;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.gateway.validate()?;
        ensure!(
            self.polling.interval_secs > 0,
            "polling.interval_secs must be positive (got {})",
            self.polling.interval_secs
        );
        ensure!(
            self.polling.interval_secs <= MAX_POLL_INTERVAL_SECS,
            "polling.interval_secs must be <= {} (1 hour) (got {})",
            MAX_POLL_INTERVAL_SECS,
            self.polling.interval_secs
        );
        if let Some(influx) = &self.influxdb {
            influx.validate()?;
        }
        Ok(())
    }
}

impl GatewayConfig {
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.address)
            .with_context(|| format!("gateway.address is not a valid URL: {}", self.address))
    }

    fn validate(&self) -> Result<()> {
        let url = self.base_url()?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "gateway.address must use http or https (got {})",
            url.scheme()
        );
        ensure!(
            !self.password.is_empty(),
            "gateway.password must be set (in the config file or {ENV_GATEWAY_PASSWORD})"
        );
        ensure!(
            self.request_timeout_secs > 0,
            "gateway.request_timeout_secs must be positive (got {})",
            self.request_timeout_secs
        );
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
