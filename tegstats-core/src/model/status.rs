//! Состояние самого шлюза: `/api/status`, `/api/system/networks/conn_tests`,
//! `/api/system/testing`, `/api/system/update/status`.

use crate::timefmt;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Status {
    #[serde(rename = "din")]
    pub gateway_id: String,
    /// Время запуска в старом формате `2021-10-19 09:12:50 +0800`.
    #[serde(deserialize_with = "timefmt::de::legacy")]
    pub start_time: Option<DateTime<FixedOffset>>,
    /// Несмотря на имя, это строка длительности (`89h51m33.77s`).
    #[serde(rename = "up_time_seconds", deserialize_with = "timefmt::de::duration")]
    pub uptime: Option<Duration>,
    pub is_new: bool,
    #[serde(rename = "version")]
    pub firmware_version: String,
    #[serde(rename = "git_hash")]
    pub firmware_git_hash: String,
    pub commission_count: i64,
    pub device_type: String,
    pub sync_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkConnectionTests {
    pub name: String,
    pub category: String,
    pub disruptive: bool,
    pub checks: Vec<NetworkConnectionCheck>,
    pub alert: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkConnectionCheck {
    pub name: String,
    pub status: String,
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub end_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemTesting {
    pub running: bool,
    pub status: String,
    pub hysteresis: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpdateStatus {
    pub state: String,
    pub info: UpdateInfo,
    pub current_time: i64,
    pub last_status_time: i64,
    #[serde(rename = "version")]
    pub firmware_version: String,
    pub offline_updating: bool,
    pub offline_update_error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpdateInfo {
    pub status: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decodes_legacy_start_and_uptime() {
        let body = r#"{
            "din": "1232100-00-E--TG0000000000A",
            "start_time": "2021-10-19 09:12:50 +0800",
            "up_time_seconds": "89h51m33.77086138s",
            "is_new": false,
            "version": "21.31.2 5fac4ea4",
            "git_hash": "5fac4ea4e7ac4ea5e3b7e18b1e1a7de2c4e4c3c6",
            "commission_count": 0,
            "device_type": "teg",
            "sync_type": "v2.1"
        }"#;

        let status: Status = serde_json::from_str(body).unwrap();
        assert_eq!(status.start_time.map(|t| t.timestamp()), Some(1634605970));
        assert_eq!(status.uptime, Some(Duration::new(323_493, 770_861_380)));
        assert_eq!(status.sync_type, "v2.1");
    }

    #[test]
    fn status_rejects_bad_uptime() {
        let body = r#"{"up_time_seconds": "forever"}"#;
        assert!(serde_json::from_str::<Status>(body).is_err());
    }
}
