//! Сообщения protobuf эндпоинта `/api/devices/vitals`.
//!
//! Описаны вручную через derive `prost`: тело ответа - одно сообщение
//! [`DevicesWithVitals`] без префикса длины.

/// Корневое сообщение: список устройств с их показателями.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DevicesWithVitals {
    #[prost(message, repeated, tag = "1")]
    pub devices: Vec<DeviceWithVitals>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceWithVitals {
    #[prost(message, optional, tag = "1")]
    pub device: Option<Device>,
    #[prost(message, repeated, tag = "2")]
    pub vitals: Vec<Vital>,
    #[prost(string, repeated, tag = "3")]
    pub alerts: Vec<String>,
}

/// Атрибуты устройства.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Device {
    #[prost(string, tag = "1")]
    pub din: String,
    #[prost(string, tag = "2")]
    pub part_number: String,
    #[prost(string, tag = "3")]
    pub serial_number: String,
    #[prost(string, tag = "4")]
    pub manufacturer: String,
    #[prost(string, tag = "5")]
    pub site_label: String,
    #[prost(string, tag = "6")]
    pub component_parent_din: String,
    #[prost(string, tag = "7")]
    pub firmware_version: String,
    #[prost(message, optional, tag = "11")]
    pub ecu_attributes: Option<EcuAttributes>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EcuAttributes {
    #[prost(int32, tag = "1")]
    pub ecu_type: i32,
}

/// Именованный показатель устройства.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Vital {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "vital::Value", tags = "3, 4, 5, 6")]
    pub value: Option<vital::Value>,
}

pub mod vital {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        FloatValue(f64),
        #[prost(string, tag = "5")]
        StringValue(String),
        #[prost(bool, tag = "6")]
        BoolValue(bool),
    }
}
