//! `/api/solar_powerwall`: инвертор PVAC, блок PVS и их флаги тревог.

use super::null_as_default;
use crate::timefmt;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolarPowerwall {
    pub pvac_status: PvacStatus,
    pub pvs_status: PvsStatus,
    pub pv_power_limit: f64,
    pub power_status_setpoint: String,
    pub pvac_alerts: AlertBlock,
    pub pvs_alerts: AlertBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PvacStatus {
    pub state: String,
    pub disabled: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub disabled_reasons: Vec<String>,
    pub grid_state: String,
    pub inv_state: String,
    pub v_out: f64,
    pub f_out: f64,
    pub p_out: f64,
    pub q_out: f64,
    pub i_out: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub string_vitals: Vec<StringVitals>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StringVitals {
    pub string_id: i64,
    pub connected: bool,
    pub measured_voltage: f64,
    pub current: f64,
    pub measured_power: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PvsStatus {
    pub state: String,
    pub disabled: bool,
    pub enable_output: bool,
    pub v_ll: f64,
    pub self_test_state: String,
}

/// Блок тревог `pvac_alerts` или `pvs_alerts`.
///
/// Набор флагов зависит от прошивки, поэтому они хранятся словарём
/// «имя → значение». Нелогические поля, кроме известных, отбрасываются.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawAlertBlock")]
pub struct AlertBlock {
    pub last_rx_time: Option<DateTime<FixedOffset>>,
    pub received_mux_bitmask: i64,
    pub alert_matrix_index: i64,
    pub flags: BTreeMap<String, bool>,
}

impl AlertBlock {
    /// Имена взведённых флагов.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAlertBlock {
    #[serde(rename = "LastRxTime", deserialize_with = "timefmt::de::micros")]
    last_rx_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "ReceivedMuxBitmask")]
    received_mux_bitmask: i64,
    #[serde(rename = "PVAC_alertMatrixIndex")]
    alert_matrix_index: i64,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl From<RawAlertBlock> for AlertBlock {
    fn from(raw: RawAlertBlock) -> Self {
        let flags = raw
            .rest
            .into_iter()
            .filter_map(|(name, value)| value.as_bool().map(|on| (name, on)))
            .collect();
        Self {
            last_rx_time: raw.last_rx_time,
            received_mux_bitmask: raw.received_mux_bitmask,
            alert_matrix_index: raw.alert_matrix_index,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn alert_block_keeps_flags_and_micros_time() {
        let body = r#"{
            "pvac_alerts": {
                "LastRxTime": "2021-10-26T16:00:59.982491-07:00",
                "ReceivedMuxBitmask": 1,
                "PVAC_alertMatrixIndex": 0,
                "PVAC_a001_inv_L1_HW_overcurrent": false,
                "PVAC_a009_SwAppBoot": true
            },
            "pvs_alerts": {
                "LastRxTime": "",
                "ReceivedMuxBitmask": 0,
                "PVS_a021_RapidShutdown": false
            }
        }"#;

        let parsed: SolarPowerwall = serde_json::from_str(body).unwrap();
        let pvac = &parsed.pvac_alerts;
        assert_eq!(pvac.last_rx_time.map(|t| t.nanosecond()), Some(982_491_000));
        assert_eq!(pvac.received_mux_bitmask, 1);
        assert_eq!(pvac.flags.len(), 2);
        assert_eq!(pvac.active().collect::<Vec<_>>(), vec!["PVAC_a009_SwAppBoot"]);

        assert!(parsed.pvs_alerts.last_rx_time.is_none());
        assert_eq!(parsed.pvs_alerts.flags.get("PVS_a021_RapidShutdown"), Some(&false));
    }

    #[test]
    fn alert_block_rejects_malformed_last_rx_time() {
        let body = r#"{"pvac_alerts": {"LastRxTime": "yesterday"}}"#;
        assert!(serde_json::from_str::<SolarPowerwall>(body).is_err());
    }
}
