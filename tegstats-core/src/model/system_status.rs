//! `/api/system_status`: энергетика батарей и журнал `grid_faults`.

use super::null_as_default;
use crate::error::FaultDecodeError;
use crate::timefmt::{self, DecodedAlert};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemStatus {
    pub command_source: String,
    pub battery_target_power: f64,
    pub battery_target_reactive_power: f64,
    #[serde(rename = "nominal_full_pack_energy")]
    pub nominal_full_pack_energy_watt_hours: f64,
    #[serde(rename = "nominal_energy_remaining")]
    pub nominal_energy_remaining_watt_hours: f64,
    pub max_power_energy_remaining: f64,
    pub max_power_energy_to_be_charged: f64,
    #[serde(rename = "max_charge_power")]
    pub max_charge_power_watts: f64,
    #[serde(rename = "max_discharge_power")]
    pub max_discharge_power_watts: f64,
    pub max_apparent_power: f64,
    pub instantaneous_max_discharge_power: f64,
    pub instantaneous_max_charge_power: f64,
    pub grid_services_power: f64,
    pub system_island_state: String,
    pub available_blocks: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub battery_blocks: Vec<BatteryBlock>,
    pub ffr_power_availability_high: f64,
    pub ffr_power_availability_low: f64,
    pub load_charge_constraint: f64,
    pub max_sustained_ramp_rate: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub grid_faults: Vec<GridFault>,
    pub can_reboot: String,
    pub smart_inv_delta_p: f64,
    pub smart_inv_delta_q: f64,
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub last_toggle_timestamp: Option<DateTime<FixedOffset>>,
    pub solar_real_power_limit: f64,
    pub score: i64,
    pub blocks_controlled: i64,
    pub primary: bool,
    pub auxiliary_load: f64,
    pub all_enable_lines_high: bool,
    #[serde(rename = "inverter_nominal_usable_power")]
    pub inverter_nominal_usable_power_watts: f64,
    pub expected_energy_remaining: f64,
}

impl SystemStatus {
    /// Распаковать `decoded_alert` у каждой записи `grid_faults`.
    ///
    /// Ошибка одной записи остаётся в ней самой и не мешает остальным.
    /// Возвращает записи, которые распаковать не удалось.
    pub fn unwrap_faults(&mut self) -> Vec<&FaultDecodeError> {
        for fault in &mut self.grid_faults {
            fault.unwrap_decoded_alert();
        }
        self.grid_faults
            .iter()
            .filter_map(|fault| fault.decode_error.as_ref())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatteryBlock {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "PackagePartNumber")]
    pub package_part_number: String,
    #[serde(rename = "PackageSerialNumber")]
    pub package_serial_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub disabled_reasons: Vec<String>,
    pub pinv_state: String,
    pub pinv_grid_state: String,
    #[serde(rename = "nominal_energy_remaining")]
    pub nominal_energy_remaining_watt_hours: f64,
    pub nominal_full_pack_energy: f64,
    pub p_out: f64,
    pub q_out: f64,
    pub v_out: f64,
    pub f_out: f64,
    pub i_out: f64,
    pub energy_charged: f64,
    pub energy_discharged: f64,
    pub off_grid: bool,
    pub vf_mode: bool,
    pub wobble_detected: bool,
    pub charge_power_clamped: bool,
    pub backup_ready: bool,
    #[serde(rename = "OpSeqState")]
    pub op_seq_state: String,
    pub version: String,
}

impl BatteryBlock {
    /// Заряд блока в процентах; 0, если полная ёмкость не известна.
    pub fn charge_percent(&self) -> f64 {
        if self.nominal_full_pack_energy > 0.0 {
            self.nominal_energy_remaining_watt_hours / self.nominal_full_pack_energy * 100.0
        } else {
            0.0
        }
    }
}

/// Запись журнала `grid_faults`.
///
/// `decoded_alert` приходит строкой с JSON внутри; распакованные тройки
/// попадают в `alerts` после [`GridFault::unwrap_decoded_alert`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridFault {
    pub timestamp: i64,
    pub alert_name: String,
    pub alert_is_fault: bool,
    #[serde(rename = "decoded_alert", deserialize_with = "null_as_default")]
    pub decoded_alert_raw: String,
    pub alert_raw: i64,
    #[serde(rename = "git_hash")]
    pub firmware_git_hash: String,
    pub site_uid: String,
    #[serde(alias = "eco_type")]
    pub ecu_type: String,
    pub ecu_package_part_number: String,
    pub ecu_package_serial_number: String,
    #[serde(skip)]
    pub alerts: Vec<DecodedAlert>,
    #[serde(skip)]
    pub decode_error: Option<FaultDecodeError>,
}

impl GridFault {
    pub fn unwrap_decoded_alert(&mut self) {
        match timefmt::unwrap_decoded_alert(&self.decoded_alert_raw) {
            Ok(alerts) => {
                self.alerts = alerts;
                self.decode_error = None;
            }
            Err(e) => {
                self.alerts.clear();
                self.decode_error = Some(FaultDecodeError {
                    alert_name: self.alert_name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timefmt::AlertValue;

    #[test]
    fn broken_fault_does_not_affect_neighbours() {
        let body = r#"{
            "nominal_full_pack_energy": 27000,
            "grid_faults": [
                {"timestamp": 1634700000000, "alert_name": "PINV_a006_vfCheckUnderFrequency",
                 "alert_is_fault": false,
                 "decoded_alert": "[{\"name\":\"PINV_alertID\",\"value\":\"PINV_a006_vfCheckUnderFrequency\"},{\"name\":\"PINV_alertType\",\"value\":\"Warning\"},{\"name\":\"PINV_fInv\",\"value\":59.12,\"units\":\"Hz\"}]",
                 "alert_raw": 432108000000000000},
                {"alert_name": "broken", "decoded_alert": "[{\"name\":"},
                {"alert_name": "empty", "decoded_alert": ""}
            ]
        }"#;

        let mut status: SystemStatus = serde_json::from_str(body).unwrap();
        let failed: Vec<String> = status
            .unwrap_faults()
            .into_iter()
            .map(|e| e.alert_name.clone())
            .collect();
        assert_eq!(failed, vec!["broken".to_string()]);

        let first = &status.grid_faults[0];
        assert_eq!(first.alerts.len(), 3);
        assert_eq!(first.alerts[1].value, AlertValue::Text("Warning".into()));
        assert_eq!(first.alerts[2].value, AlertValue::Number(59.12));
        assert_eq!(first.alerts[2].units, "Hz");
        assert!(first.decode_error.is_none());

        assert!(status.grid_faults[1].alerts.is_empty());
        assert!(status.grid_faults[2].alerts.is_empty());
        assert!(status.grid_faults[2].decode_error.is_none());
    }

    #[test]
    fn charge_percent_handles_zero_pack() {
        let block = BatteryBlock {
            nominal_energy_remaining_watt_hours: 6750.0,
            nominal_full_pack_energy: 13500.0,
            ..Default::default()
        };
        assert_eq!(block.charge_percent(), 50.0);
        assert_eq!(BatteryBlock::default().charge_percent(), 0.0);
    }

    #[test]
    fn null_lists_become_empty() {
        let body = r#"{"battery_blocks": null, "grid_faults": null}"#;
        let status: SystemStatus = serde_json::from_str(body).unwrap();
        assert!(status.battery_blocks.is_empty());
        assert!(status.grid_faults.is_empty());
    }
}
