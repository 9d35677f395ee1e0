//! `/api/meters/aggregates` и `/api/meters/status`.

use crate::timefmt;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

/// Агрегаты по четырём счётчикам площадки.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetersAggregates {
    pub site: MeterAggregate,
    pub battery: MeterAggregate,
    pub load: MeterAggregate,
    pub solar: MeterAggregate,
}

impl MetersAggregates {
    /// Счётчики вместе с префиксами полей, под которыми они уходят в хранилище.
    pub fn named(&self) -> [(&'static str, &MeterAggregate); 4] {
        [
            ("site", &self.site),
            ("battery", &self.battery),
            ("load", &self.load),
            ("solar", &self.solar),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeterAggregate {
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub last_communication_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "instant_power")]
    pub instant_power_watts: f64,
    #[serde(rename = "instant_reactive_power")]
    pub instant_reactive_power_watts: f64,
    #[serde(rename = "instant_apparent_power")]
    pub instant_apparent_power_watts: f64,
    pub frequency: f64,
    #[serde(rename = "energy_exported")]
    pub energy_exported_watts: f64,
    #[serde(rename = "energy_imported")]
    pub energy_imported_watts: f64,
    pub instant_average_voltage: f64,
    pub instant_average_current: f64,
    pub i_a_current: f64,
    pub i_b_current: f64,
    pub i_c_current: f64,
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub last_phase_voltage_communication_time: Option<DateTime<FixedOffset>>,
    #[serde(deserialize_with = "timefmt::de::nanos")]
    pub last_phase_power_communication_time: Option<DateTime<FixedOffset>>,
    pub timeout: i64,
    pub num_meters_aggregated: i64,
    pub instant_total_current: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetersStatus {
    pub status: String,
    pub serial: String,
}
