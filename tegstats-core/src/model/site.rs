//! Конфигурация площадки: `/api/site_info`, `/api/sitemaster`, `/api/operation`,
//! `/api/solars`, `/api/system_status/grid_status`, `/api/system_status/soe`.

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiteInfo {
    pub measured_frequency: f64,
    #[serde(rename = "max_system_energy_kWh")]
    pub max_system_energy_kwh: f64,
    #[serde(rename = "max_system_power_kW")]
    pub max_system_power_kw: f64,
    pub site_name: String,
    pub timezone: String,
    pub net_meter_mode: String,
    #[serde(rename = "max_site_meter_power_kW")]
    pub max_site_meter_power_kw: i64,
    #[serde(rename = "min_site_meter_power_kW")]
    pub min_site_meter_power_kw: i64,
    #[serde(rename = "nominal_system_energy_kWh")]
    pub nominal_system_energy_kwh: f64,
    #[serde(rename = "nominal_system_power_kW")]
    pub nominal_system_power_kw: f64,
    pub panel_max_current: i64,
    pub grid_code: GridCode,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridCode {
    pub grid_code: String,
    pub grid_voltage_setting: i64,
    pub grid_freq_setting: i64,
    pub grid_phase_setting: String,
    pub country: String,
    pub state: String,
    pub utility: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sitemaster {
    pub status: String,
    pub running: bool,
    pub connected_to_tesla: bool,
    pub power_supply_mode: bool,
    pub can_reboot: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Operation {
    pub real_mode: String,
    pub backup_reserve_percent: f64,
    pub freq_shift_load_shed_soe: f64,
    pub freq_shift_load_shed_delta_f: f64,
}

/// Элемент списка `/api/solars`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Solar {
    pub brand: String,
    pub model: String,
    pub power_rating_watts: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridStatus {
    pub grid_status: String,
    pub grid_services_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StateOfEnergy {
    pub percentage: f64,
}
