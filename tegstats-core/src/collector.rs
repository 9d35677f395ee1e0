//! Параллельный сбор всех эндпоинтов в один снапшот.
//!
//! На каждый эндпоинт запускается отдельная задача в [`JoinSet`]. Задача
//! получает тело, ставит метку времени и выполняет пост-обработку
//! (распаковку `grid_faults`, нормализацию vitals). На первой ошибке
//! общий [`CancellationToken`] прерывает остальные запросы, после чего
//! набор задач дочитывается до конца: к возврату из [`collect_all`]
//! ни одной задачи в полёте не остаётся.

use crate::error::{CollectCause, CollectError, DecodeError, FetchError};
use crate::gateway::{fetch, Endpoint, EndpointDescriptor, Payload, RawRecord, Transport};
use crate::model::*;
use crate::vitals::{self, DeviceVitals};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Согласованный результат одного цикла: по записи на каждый эндпоинт.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub meters: Captured<MetersAggregates>,
    pub meters_status: Captured<MetersStatus>,
    pub operation: Captured<Operation>,
    pub powerwalls: Captured<Powerwalls>,
    pub site_info: Captured<SiteInfo>,
    pub sitemaster: Captured<Sitemaster>,
    pub solars: Captured<Vec<Solar>>,
    pub solar_powerwall: Captured<SolarPowerwall>,
    pub network: Captured<NetworkConnectionTests>,
    pub status: Captured<Status>,
    pub system_testing: Captured<SystemTesting>,
    pub update_status: Captured<UpdateStatus>,
    pub system_status: Captured<SystemStatus>,
    pub grid_status: Captured<GridStatus>,
    pub soe: Captured<StateOfEnergy>,
    pub vitals: Captured<DeviceVitals>,
}

/// Запись эндпоинта после пост-обработки.
#[derive(Debug, Clone, PartialEq)]
enum Record {
    Plain(Payload),
    Vitals(DeviceVitals),
}

/// Накопитель записей; снапшот собирается только когда есть все.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    meters: Option<Captured<MetersAggregates>>,
    meters_status: Option<Captured<MetersStatus>>,
    operation: Option<Captured<Operation>>,
    powerwalls: Option<Captured<Powerwalls>>,
    site_info: Option<Captured<SiteInfo>>,
    sitemaster: Option<Captured<Sitemaster>>,
    solars: Option<Captured<Vec<Solar>>>,
    solar_powerwall: Option<Captured<SolarPowerwall>>,
    network: Option<Captured<NetworkConnectionTests>>,
    status: Option<Captured<Status>>,
    system_testing: Option<Captured<SystemTesting>>,
    update_status: Option<Captured<UpdateStatus>>,
    system_status: Option<Captured<SystemStatus>>,
    grid_status: Option<Captured<GridStatus>>,
    soe: Option<Captured<StateOfEnergy>>,
    vitals: Option<Captured<DeviceVitals>>,
}

impl SnapshotBuilder {
    fn insert(&mut self, captured: Captured<Record>) {
        let at = captured.captured_at;
        match captured.data {
            Record::Vitals(v) => self.vitals = Some(Captured::new(at, v)),
            Record::Plain(payload) => match payload {
                Payload::MetersAggregates(v) => self.meters = Some(Captured::new(at, v)),
                Payload::MetersStatus(v) => self.meters_status = Some(Captured::new(at, v)),
                Payload::Operation(v) => self.operation = Some(Captured::new(at, v)),
                Payload::Powerwalls(v) => self.powerwalls = Some(Captured::new(at, v)),
                Payload::SiteInfo(v) => self.site_info = Some(Captured::new(at, v)),
                Payload::Sitemaster(v) => self.sitemaster = Some(Captured::new(at, v)),
                Payload::Solars(v) => self.solars = Some(Captured::new(at, v)),
                Payload::SolarPowerwall(v) => self.solar_powerwall = Some(Captured::new(at, v)),
                Payload::NetworkConnectionTests(v) => self.network = Some(Captured::new(at, v)),
                Payload::Status(v) => self.status = Some(Captured::new(at, v)),
                Payload::SystemTesting(v) => self.system_testing = Some(Captured::new(at, v)),
                Payload::UpdateStatus(v) => self.update_status = Some(Captured::new(at, v)),
                Payload::SystemStatus(v) => self.system_status = Some(Captured::new(at, v)),
                Payload::GridStatus(v) => self.grid_status = Some(Captured::new(at, v)),
                Payload::StateOfEnergy(v) => self.soe = Some(Captured::new(at, v)),
                // Сырые vitals всегда проходят нормализацию до вставки.
                Payload::Vitals(_) => {}
            },
        }
    }

    fn has(&self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::MetersAggregates => self.meters.is_some(),
            Endpoint::MetersStatus => self.meters_status.is_some(),
            Endpoint::Operation => self.operation.is_some(),
            Endpoint::Powerwalls => self.powerwalls.is_some(),
            Endpoint::SiteInfo => self.site_info.is_some(),
            Endpoint::Sitemaster => self.sitemaster.is_some(),
            Endpoint::Solars => self.solars.is_some(),
            Endpoint::SolarPowerwall => self.solar_powerwall.is_some(),
            Endpoint::NetworkConnectionTests => self.network.is_some(),
            Endpoint::Status => self.status.is_some(),
            Endpoint::SystemTesting => self.system_testing.is_some(),
            Endpoint::UpdateStatus => self.update_status.is_some(),
            Endpoint::SystemStatus => self.system_status.is_some(),
            Endpoint::GridStatus => self.grid_status.is_some(),
            Endpoint::StateOfEnergy => self.soe.is_some(),
            Endpoint::Vitals => self.vitals.is_some(),
        }
    }

    /// Первый эндпоинт, для которого ещё нет записи.
    pub fn first_missing(&self) -> Option<Endpoint> {
        Endpoint::ALL.into_iter().find(|e| !self.has(*e))
    }

    /// Собрать снапшот; любая недостающая запись делает его невалидным.
    pub fn build(self) -> Result<Snapshot, CollectError> {
        fn take<T>(slot: Option<T>, endpoint: Endpoint) -> Result<T, CollectError> {
            slot.ok_or_else(|| CollectError::new(endpoint, CollectCause::Missing))
        }

        Ok(Snapshot {
            meters: take(self.meters, Endpoint::MetersAggregates)?,
            meters_status: take(self.meters_status, Endpoint::MetersStatus)?,
            operation: take(self.operation, Endpoint::Operation)?,
            powerwalls: take(self.powerwalls, Endpoint::Powerwalls)?,
            site_info: take(self.site_info, Endpoint::SiteInfo)?,
            sitemaster: take(self.sitemaster, Endpoint::Sitemaster)?,
            solars: take(self.solars, Endpoint::Solars)?,
            solar_powerwall: take(self.solar_powerwall, Endpoint::SolarPowerwall)?,
            network: take(self.network, Endpoint::NetworkConnectionTests)?,
            status: take(self.status, Endpoint::Status)?,
            system_testing: take(self.system_testing, Endpoint::SystemTesting)?,
            update_status: take(self.update_status, Endpoint::UpdateStatus)?,
            system_status: take(self.system_status, Endpoint::SystemStatus)?,
            grid_status: take(self.grid_status, Endpoint::GridStatus)?,
            soe: take(self.soe, Endpoint::StateOfEnergy)?,
            vitals: take(self.vitals, Endpoint::Vitals)?,
        })
    }
}

/// Пост-обработка ответа внутри задачи эндпоинта.
fn process(raw: RawRecord) -> Result<Captured<Record>, FetchError> {
    let RawRecord {
        endpoint,
        captured_at,
        payload,
        body,
    } = raw;

    let record = match payload {
        Payload::Vitals(devices) => {
            let normalized = vitals::normalize(&devices).map_err(|e| DecodeError::new(e, body))?;
            Record::Vitals(normalized)
        }
        Payload::SystemStatus(mut status) => {
            for failed in status.unwrap_faults() {
                warn!(endpoint = %endpoint, "{}", failed);
            }
            Record::Plain(Payload::SystemStatus(status))
        }
        other => Record::Plain(other),
    };

    Ok(Captured::new(captured_at, record))
}

/// Опросить все эндпоинты параллельно и собрать снапшот.
///
/// Возвращает ошибку первого упавшего эндпоинта; остальные запросы
/// отменяются, а их задачи дожидаются завершения до возврата.
/// Отмена `shutdown` прерывает сбор так же, как ошибка эндпоинта.
pub async fn collect_all(
    transport: Arc<dyn Transport>,
    descriptors: &[EndpointDescriptor],
    shutdown: &CancellationToken,
) -> Result<Snapshot, CollectError> {
    let cancel = shutdown.child_token();
    let mut tasks = JoinSet::new();

    for descriptor in descriptors.iter().copied() {
        let transport = Arc::clone(&transport);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                fetched = fetch(transport.as_ref(), &descriptor) => fetched.and_then(process),
            };
            (descriptor.endpoint, result)
        });
    }

    let mut builder = SnapshotBuilder::default();
    let mut failure: Option<CollectError> = None;
    let mut cancelled: Option<Endpoint> = None;
    let mut panicked: Option<String> = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((endpoint, Ok(record))) => {
                debug!(endpoint = %endpoint, "Collected endpoint");
                builder.insert(record);
            }
            Ok((endpoint, Err(FetchError::Cancelled))) => {
                cancelled.get_or_insert(endpoint);
            }
            Ok((endpoint, Err(e))) => {
                if failure.is_none() {
                    failure = Some(CollectError::new(endpoint, e));
                    cancel.cancel();
                } else {
                    debug!(endpoint = %endpoint, error = %e, "Additional endpoint failure ignored");
                }
            }
            Err(join_error) => {
                if panicked.is_none() {
                    panicked = Some(join_error.to_string());
                    cancel.cancel();
                }
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    if let Some(reason) = panicked {
        let endpoint = builder.first_missing().unwrap_or(Endpoint::MetersAggregates);
        return Err(CollectError::new(endpoint, CollectCause::Task(reason)));
    }
    if let Some(endpoint) = cancelled {
        return Err(CollectError::new(endpoint, FetchError::Cancelled));
    }

    builder.build()
}
