//! Нормализация бинарных vitals в плоские записи.
//!
//! Каждое устройство из ответа `/api/devices/vitals` направляется в одно
//! семейство записей по коду типа ECU:
//! - [`EcuType::InverterStrings`] (296) - солнечный инвертор со строками A–D;
//! - [`EcuType::TemperatureSensor`] (224) - датчик температуры.
//!
//! Независимо от типа ECU непустой список тревог устройства даёт одну
//! запись [`AlertRecord`]. Показатели ищутся по имени в фиксированной
//! таблице; незнакомые имена пропускаются.

pub mod proto;

use crate::error::VitalsError;
use proto::vital::Value;
use proto::{DeviceWithVitals, DevicesWithVitals, Vital};

/// Известные коды типа ECU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcuType {
    /// Инвертор PVAC со строковыми каналами.
    InverterStrings,
    /// Датчик температуры THC.
    TemperatureSensor,
}

impl EcuType {
    pub const INVERTER_STRINGS_CODE: i32 = 296;
    pub const TEMPERATURE_SENSOR_CODE: i32 = 224;

    /// Незнакомый код не ошибка, а отсутствие совпадения.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::INVERTER_STRINGS_CODE => Some(Self::InverterStrings),
            Self::TEMPERATURE_SENSOR_CODE => Some(Self::TemperatureSensor),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::InverterStrings => Self::INVERTER_STRINGS_CODE,
            Self::TemperatureSensor => Self::TEMPERATURE_SENSOR_CODE,
        }
    }
}

/// Идентификация устройства, общая для всех семейств записей.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceIdentity {
    pub din: String,
    pub part_number: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub site_label: String,
    pub component_parent_din: String,
    pub firmware_version: String,
    pub ecu_type: Option<i32>,
}

/// Показатели одного строкового канала инвертора.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringChannel {
    pub current: Option<f64>,
    pub measured_voltage: Option<f64>,
    pub measured_power: Option<f64>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InverterRecord {
    pub device: DeviceIdentity,
    pub pvac_state: Option<String>,
    pub pvac_grid_state: Option<String>,
    pub pvac_inv_state: Option<String>,
    pub pvac_v_out: Option<f64>,
    pub pvac_f_out: Option<f64>,
    pub pvac_p_out: Option<f64>,
    pub pvac_q_out: Option<f64>,
    pub pvac_v_l1_ground: Option<f64>,
    pub pvac_v_l2_ground: Option<f64>,
    pub pvac_v_hv_minus_chassis_dc: Option<f64>,
    pub pvac_lifetime_energy_pv_total: Option<f64>,
    /// Каналы A, B, C, D.
    pub strings: [StringChannel; 4],
}

impl InverterRecord {
    pub const CHANNELS: [char; 4] = ['A', 'B', 'C', 'D'];
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemperatureRecord {
    pub device: DeviceIdentity,
    pub state: Option<String>,
    pub ambient_temp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertRecord {
    pub device: DeviceIdentity,
    pub alerts: Vec<String>,
}

/// Результат нормализации одного ответа vitals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceVitals {
    pub inverters: Vec<InverterRecord>,
    pub temperatures: Vec<TemperatureRecord>,
    pub alerts: Vec<AlertRecord>,
}

/// Разложить устройства по семействам записей.
pub fn normalize(payload: &DevicesWithVitals) -> Result<DeviceVitals, VitalsError> {
    let mut out = DeviceVitals::default();

    for (index, entry) in payload.devices.iter().enumerate() {
        // Без дескриптора нет ни DIN, ни кода ECU: такая запись ни во что не попадает.
        let Some(device) = identity(entry) else {
            if !entry.alerts.is_empty() {
                return Err(VitalsError::MissingDevice { index });
            }
            continue;
        };

        match device.ecu_type.and_then(EcuType::from_code) {
            Some(EcuType::InverterStrings) => {
                out.inverters.push(inverter(device.clone(), &entry.vitals)?);
            }
            Some(EcuType::TemperatureSensor) => {
                out.temperatures.push(temperature(device.clone(), &entry.vitals)?);
            }
            None => {}
        }

        if !entry.alerts.is_empty() {
            out.alerts.push(AlertRecord {
                device,
                alerts: entry.alerts.clone(),
            });
        }
    }

    Ok(out)
}

fn identity(entry: &DeviceWithVitals) -> Option<DeviceIdentity> {
    let device = entry.device.as_ref()?;
    Some(DeviceIdentity {
        din: device.din.clone(),
        part_number: device.part_number.clone(),
        serial_number: device.serial_number.clone(),
        manufacturer: device.manufacturer.clone(),
        site_label: device.site_label.clone(),
        component_parent_din: device.component_parent_din.clone(),
        firmware_version: device.firmware_version.clone(),
        ecu_type: device.ecu_attributes.as_ref().map(|a| a.ecu_type),
    })
}

fn number(din: &str, vital: &Vital) -> Result<Option<f64>, VitalsError> {
    match &vital.value {
        None => Ok(None),
        Some(Value::FloatValue(v)) => Ok(Some(*v)),
        Some(Value::IntValue(v)) => Ok(Some(*v as f64)),
        Some(_) => Err(VitalsError::NotNumeric {
            din: din.to_string(),
            name: vital.name.clone(),
        }),
    }
}

fn text(din: &str, vital: &Vital) -> Result<Option<String>, VitalsError> {
    match &vital.value {
        None => Ok(None),
        Some(Value::StringValue(v)) => Ok(Some(v.clone())),
        Some(_) => Err(VitalsError::NotText {
            din: din.to_string(),
            name: vital.name.clone(),
        }),
    }
}

/// `PVAC_PVCurrent_B` -> (`PVAC_PVCurrent`, 1).
fn split_channel(name: &str) -> Option<(&str, usize)> {
    let (base, suffix) = name.rsplit_once('_')?;
    let mut chars = suffix.chars();
    let channel = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let idx = InverterRecord::CHANNELS.iter().position(|c| *c == channel)?;
    Some((base, idx))
}

fn inverter(device: DeviceIdentity, vitals: &[Vital]) -> Result<InverterRecord, VitalsError> {
    let mut record = InverterRecord {
        device,
        ..Default::default()
    };
    let din = record.device.din.clone();

    for vital in vitals {
        match vital.name.as_str() {
            "PVAC_State" => record.pvac_state = text(&din, vital)?,
            "PVAC_GridState" => record.pvac_grid_state = text(&din, vital)?,
            "PVAC_InvState" => record.pvac_inv_state = text(&din, vital)?,
            "PVAC_Vout" => record.pvac_v_out = number(&din, vital)?,
            "PVAC_Fout" => record.pvac_f_out = number(&din, vital)?,
            "PVAC_Pout" => record.pvac_p_out = number(&din, vital)?,
            "PVAC_Qout" => record.pvac_q_out = number(&din, vital)?,
            "PVAC_VL1Ground" => record.pvac_v_l1_ground = number(&din, vital)?,
            "PVAC_VL2Ground" => record.pvac_v_l2_ground = number(&din, vital)?,
            "PVAC_VHvMinusChassisDC" => record.pvac_v_hv_minus_chassis_dc = number(&din, vital)?,
            "PVAC_LifetimeEnergyPV_Total" => {
                record.pvac_lifetime_energy_pv_total = number(&din, vital)?
            }
            name => {
                let Some((base, idx)) = split_channel(name) else {
                    continue;
                };
                let channel = &mut record.strings[idx];
                match base {
                    "PVAC_PVCurrent" => channel.current = number(&din, vital)?,
                    "PVAC_PVMeasuredVoltage" => channel.measured_voltage = number(&din, vital)?,
                    "PVAC_PVMeasuredPower" => channel.measured_power = number(&din, vital)?,
                    "PVAC_PvState" => channel.state = text(&din, vital)?,
                    _ => {}
                }
            }
        }
    }

    Ok(record)
}

fn temperature(device: DeviceIdentity, vitals: &[Vital]) -> Result<TemperatureRecord, VitalsError> {
    let mut record = TemperatureRecord {
        device,
        ..Default::default()
    };
    let din = record.device.din.clone();

    for vital in vitals {
        match vital.name.as_str() {
            "THC_State" => record.state = text(&din, vital)?,
            "THC_AmbientTemp" => record.ambient_temp = number(&din, vital)?,
            _ => {}
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::proto::{Device, EcuAttributes};
    use super::*;
    use prost::Message;

    fn device(din: &str, ecu_type: Option<i32>) -> Option<Device> {
        Some(Device {
            din: din.to_string(),
            part_number: "1538000-45-C".to_string(),
            serial_number: "TG1234".to_string(),
            ecu_attributes: ecu_type.map(|ecu_type| EcuAttributes { ecu_type }),
            ..Default::default()
        })
    }

    fn float(name: &str, v: f64) -> Vital {
        Vital {
            name: name.to_string(),
            value: Some(Value::FloatValue(v)),
        }
    }

    fn string(name: &str, v: &str) -> Vital {
        Vital {
            name: name.to_string(),
            value: Some(Value::StringValue(v.to_string())),
        }
    }

    fn entry(device: Option<Device>, vitals: Vec<Vital>, alerts: &[&str]) -> DeviceWithVitals {
        DeviceWithVitals {
            device,
            vitals,
            alerts: alerts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn inverter_device_yields_one_inverter_record() {
        let payload = DevicesWithVitals {
            devices: vec![entry(
                device("PVAC--1", Some(296)),
                vec![float("PVAC_Pout", 1234.5)],
                &[],
            )],
        };

        let out = normalize(&payload).unwrap();
        assert_eq!(out.inverters.len(), 1);
        assert_eq!(out.inverters[0].pvac_p_out, Some(1234.5));
        assert!(out.alerts.is_empty());
        assert!(out.temperatures.is_empty());
    }

    #[test]
    fn alerts_produce_record_for_any_ecu_type() {
        let payload = DevicesWithVitals {
            devices: vec![
                entry(
                    device("PVAC--1", Some(296)),
                    vec![float("PVAC_Pout", 1234.5)],
                    &["PVAC_a009_SwAppBoot"],
                ),
                entry(device("STSTSM--1", Some(207)), vec![], &["SYNC_a001_SW_App_Boot", "x"]),
                entry(device("NEURIO--1", None), vec![float("NEURIO_CT0_InstRealPower", 5.0)], &[]),
            ],
        };

        let out = normalize(&payload).unwrap();
        assert_eq!(out.inverters.len(), 1);
        assert_eq!(out.alerts.len(), 2);
        assert_eq!(out.alerts[0].device.din, "PVAC--1");
        assert_eq!(out.alerts[1].alerts, vec!["SYNC_a001_SW_App_Boot", "x"]);
    }

    #[test]
    fn temperature_device_routed_by_code() {
        let payload = DevicesWithVitals {
            devices: vec![entry(
                device("TETHC--1", Some(224)),
                vec![
                    string("THC_State", "THC_STATE_AUTONOMOUSCONTROL"),
                    float("THC_AmbientTemp", 21.4),
                    float("THC_Unknown", 1.0),
                ],
                &[],
            )],
        };

        let out = normalize(&payload).unwrap();
        assert_eq!(out.temperatures.len(), 1);
        let temp = &out.temperatures[0];
        assert_eq!(temp.state.as_deref(), Some("THC_STATE_AUTONOMOUSCONTROL"));
        assert_eq!(temp.ambient_temp, Some(21.4));
        assert_eq!(temp.device.ecu_type, Some(EcuType::TEMPERATURE_SENSOR_CODE));
    }

    #[test]
    fn string_channels_and_integer_values() {
        let payload = DevicesWithVitals {
            devices: vec![entry(
                device("PVAC--1", Some(296)),
                vec![
                    float("PVAC_PVCurrent_A", 4.5),
                    Vital {
                        name: "PVAC_PVMeasuredPower_D".to_string(),
                        value: Some(Value::IntValue(812)),
                    },
                    string("PVAC_PvState_B", "PV_Active"),
                    float("PVAC_PVCurrent_E", 9.9),
                    string("PVAC_State", "PVAC_Active"),
                    Vital {
                        name: "PVAC_Vout".to_string(),
                        value: None,
                    },
                ],
                &[],
            )],
        };

        let out = normalize(&payload).unwrap();
        let inv = &out.inverters[0];
        assert_eq!(inv.strings[0].current, Some(4.5));
        assert_eq!(inv.strings[1].state.as_deref(), Some("PV_Active"));
        assert_eq!(inv.strings[3].measured_power, Some(812.0));
        assert_eq!(inv.pvac_state.as_deref(), Some("PVAC_Active"));
        assert_eq!(inv.pvac_v_out, None);
    }

    #[test]
    fn wrong_vital_type_is_error() {
        let payload = DevicesWithVitals {
            devices: vec![entry(
                device("PVAC--1", Some(296)),
                vec![string("PVAC_Pout", "lots")],
                &[],
            )],
        };
        assert_eq!(
            normalize(&payload).unwrap_err(),
            VitalsError::NotNumeric {
                din: "PVAC--1".into(),
                name: "PVAC_Pout".into()
            }
        );
    }

    #[test]
    fn device_without_descriptor_produces_no_record() {
        let payload = DevicesWithVitals {
            devices: vec![
                entry(None, vec![], &[]),
                entry(None, vec![float("PVAC_Pout", 1.0)], &[]),
                entry(device("PVAC--1", Some(296)), vec![float("PVAC_Pout", 2.0)], &[]),
            ],
        };

        let out = normalize(&payload).unwrap();
        assert_eq!(out.inverters.len(), 1);
        assert_eq!(out.inverters[0].device.din, "PVAC--1");
        assert!(out.temperatures.is_empty());
        assert!(out.alerts.is_empty());
    }

    #[test]
    fn alerts_without_descriptor_are_error() {
        let payload = DevicesWithVitals {
            devices: vec![
                entry(device("PVAC--1", Some(296)), vec![], &[]),
                entry(None, vec![], &["SYNC_a001_SW_App_Boot"]),
            ],
        };
        assert_eq!(
            normalize(&payload).unwrap_err(),
            VitalsError::MissingDevice { index: 1 }
        );
    }

    #[test]
    fn wire_round_trip_through_prost() {
        let payload = DevicesWithVitals {
            devices: vec![entry(
                device("PVAC--1", Some(296)),
                vec![float("PVAC_Pout", 1234.5)],
                &["PVAC_a009_SwAppBoot"],
            )],
        };
        let bytes = payload.encode_to_vec();
        let decoded = DevicesWithVitals::decode(bytes.as_slice()).unwrap();

        let out = normalize(&decoded).unwrap();
        assert_eq!(out.inverters[0].pvac_p_out, Some(1234.5));
        assert_eq!(out.alerts.len(), 1);
    }

    #[test]
    fn unknown_codes_do_not_match() {
        assert_eq!(EcuType::from_code(296), Some(EcuType::InverterStrings));
        assert_eq!(EcuType::from_code(224), Some(EcuType::TemperatureSensor));
        assert_eq!(EcuType::from_code(207), None);
        assert_eq!(EcuType::InverterStrings.code(), 296);
    }
}
