//! `/api/powerwalls`: состояние батарей и диагностика синхронизации.

use crate::timefmt;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Powerwalls {
    pub enumerating: bool,
    pub updating: bool,
    pub checking_if_offgrid: bool,
    pub running_phase_detection: bool,
    pub phase_detection_last_error: String,
    pub bubble_shedding: bool,
    pub on_grid_check_error: String,
    pub grid_qualifying: bool,
    pub grid_code_validating: bool,
    pub phase_detection_not_available: bool,
    pub powerwalls: Vec<Powerwall>,
    #[serde(rename = "gateway_din")]
    pub gateway_id: String,
    pub sync: PowerwallsSync,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Powerwall {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "PackagePartNumber")]
    pub package_part_number: String,
    #[serde(rename = "PackageSerialNumber")]
    pub package_serial_number: String,
    #[serde(rename = "type")]
    pub subtype: String,
    pub grid_state: String,
    pub grid_reconnection_time_seconds: i64,
    pub under_phase_detection: bool,
    pub updating: bool,
    pub commissioning_diagnostic: Diagnostic,
    pub update_diagnostic: Diagnostic,
    pub in_config: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PowerwallsSync {
    pub updating: bool,
    pub commissioning_diagnostic: Diagnostic,
    pub update_diagnostic: Diagnostic,
}

impl PowerwallsSync {
    pub fn diagnostics(&self) -> [&Diagnostic; 2] {
        [&self.commissioning_diagnostic, &self.update_diagnostic]
    }
}

/// Диагностика шлюза: набор проверок с общим именем и категорией.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Diagnostic {
    pub name: String,
    pub category: String,
    pub disruptive: bool,
    pub checks: Vec<DiagnosticCheck>,
    pub alert: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: String,
    /// Пустая строка у ещё не запускавшейся проверки даёт `None`.
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub end_time: Option<DateTime<FixedOffset>>,
    pub message: String,
    pub progress: i64,
}
