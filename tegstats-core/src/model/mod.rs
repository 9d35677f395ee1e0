//! Типизированные записи эндпоинтов шлюза.
//!
//! Каждая структура соответствует телу ответа одного эндпоинта. Отсутствующие
//! поля получают значения по умолчанию (прошивки шлюза отличаются набором полей),
//! а текстовые метки времени разбираются при десериализации через
//! [`crate::timefmt::de`]: пустая строка даёт `None`, мусор - ошибку декодирования.

pub mod meters;
pub mod powerwalls;
pub mod site;
pub mod solar;
pub mod status;
pub mod system_status;

pub use meters::{MeterAggregate, MetersAggregates, MetersStatus};
pub use powerwalls::{Diagnostic, DiagnosticCheck, Powerwall, Powerwalls, PowerwallsSync};
pub use site::{GridCode, GridStatus, Operation, SiteInfo, Sitemaster, Solar, StateOfEnergy};
pub use solar::{AlertBlock, PvacStatus, PvsStatus, SolarPowerwall, StringVitals};
pub use status::{
    NetworkConnectionCheck, NetworkConnectionTests, Status, SystemTesting, UpdateInfo,
    UpdateStatus,
};
pub use system_status::{BatteryBlock, GridFault, SystemStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// `null` вместо списка или строки трактуется как значение по умолчанию.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Запись эндпоинта вместе с моментом, когда её тело было получено.
///
/// Шлюз не присылает время ответа, поэтому метку ставит сборщик.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured<T> {
    pub captured_at: DateTime<Utc>,
    pub data: T,
}

impl<T> Captured<T> {
    pub fn new(captured_at: DateTime<Utc>, data: T) -> Self {
        Self { captured_at, data }
    }
}
