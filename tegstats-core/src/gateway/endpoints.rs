//! Статическая таблица эндпоинтов шлюза.

use std::fmt;

/// Способ декодирования тела ответа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    Json,
    Protobuf,
}

/// Эндпоинт шлюза, опрашиваемый в каждом цикле.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    MetersAggregates,
    MetersStatus,
    Operation,
    Powerwalls,
    SiteInfo,
    Sitemaster,
    Solars,
    SolarPowerwall,
    NetworkConnectionTests,
    Status,
    SystemTesting,
    UpdateStatus,
    SystemStatus,
    GridStatus,
    StateOfEnergy,
    Vitals,
}

impl Endpoint {
    pub const ALL: [Endpoint; 16] = [
        Endpoint::MetersAggregates,
        Endpoint::MetersStatus,
        Endpoint::Operation,
        Endpoint::Powerwalls,
        Endpoint::SiteInfo,
        Endpoint::Sitemaster,
        Endpoint::Solars,
        Endpoint::SolarPowerwall,
        Endpoint::NetworkConnectionTests,
        Endpoint::Status,
        Endpoint::SystemTesting,
        Endpoint::UpdateStatus,
        Endpoint::SystemStatus,
        Endpoint::GridStatus,
        Endpoint::StateOfEnergy,
        Endpoint::Vitals,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::MetersAggregates => "/api/meters/aggregates",
            Endpoint::MetersStatus => "/api/meters/status",
            Endpoint::Operation => "/api/operation",
            Endpoint::Powerwalls => "/api/powerwalls",
            Endpoint::SiteInfo => "/api/site_info",
            Endpoint::Sitemaster => "/api/sitemaster",
            Endpoint::Solars => "/api/solars",
            Endpoint::SolarPowerwall => "/api/solar_powerwall",
            Endpoint::NetworkConnectionTests => "/api/system/networks/conn_tests",
            Endpoint::Status => "/api/status",
            Endpoint::SystemTesting => "/api/system/testing",
            Endpoint::UpdateStatus => "/api/system/update/status",
            Endpoint::SystemStatus => "/api/system_status",
            Endpoint::GridStatus => "/api/system_status/grid_status",
            Endpoint::StateOfEnergy => "/api/system_status/soe",
            Endpoint::Vitals => "/api/devices/vitals",
        }
    }

    pub fn decode_kind(self) -> DecodeKind {
        match self {
            Endpoint::Vitals => DecodeKind::Protobuf,
            _ => DecodeKind::Json,
        }
    }

    pub fn descriptor(self) -> EndpointDescriptor {
        EndpointDescriptor {
            endpoint: self,
            path: self.path(),
            kind: self.decode_kind(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Описание эндпоинта: путь, способ декодирования и форма записи
/// (задаётся вариантом [`Endpoint`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub endpoint: Endpoint,
    pub path: &'static str,
    pub kind: DecodeKind,
}

/// Все эндпоинты, опрашиваемые в одном цикле.
pub fn all() -> Vec<EndpointDescriptor> {
    Endpoint::ALL.iter().map(|e| e.descriptor()).collect()
}
