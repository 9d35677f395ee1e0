//! Запрос одного эндпоинта и декодирование тела в типизированную запись.

use super::{DecodeKind, Endpoint, EndpointDescriptor, Transport};
use crate::error::{DecodeError, FetchError};
use crate::model::*;
use crate::vitals::proto::DevicesWithVitals;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use prost::Message;
use serde::de::DeserializeOwned;

/// Декодированное тело одного эндпоинта.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    MetersAggregates(MetersAggregates),
    MetersStatus(MetersStatus),
    Operation(Operation),
    Powerwalls(Powerwalls),
    SiteInfo(SiteInfo),
    Sitemaster(Sitemaster),
    Solars(Vec<Solar>),
    SolarPowerwall(SolarPowerwall),
    NetworkConnectionTests(NetworkConnectionTests),
    Status(Status),
    SystemTesting(SystemTesting),
    UpdateStatus(UpdateStatus),
    SystemStatus(SystemStatus),
    GridStatus(GridStatus),
    StateOfEnergy(StateOfEnergy),
    Vitals(DevicesWithVitals),
}

/// Ответ эндпоинта с моментом получения.
///
/// Сырое тело хранится для диагностики ошибок последующей обработки.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub endpoint: Endpoint,
    pub captured_at: DateTime<Utc>,
    pub payload: Payload,
    pub body: Bytes,
}

fn json<T: DeserializeOwned>(body: &Bytes) -> Result<T, DecodeError> {
    serde_json::from_slice(body).map_err(|e| DecodeError::new(e, body.clone()))
}

fn vitals(body: &Bytes) -> Result<Payload, DecodeError> {
    DevicesWithVitals::decode(body.as_ref())
        .map(Payload::Vitals)
        .map_err(|e| DecodeError::new(e, body.clone()))
}

/// Декодировать тело ответа согласно описанию эндпоинта.
pub fn decode(descriptor: &EndpointDescriptor, body: &Bytes) -> Result<Payload, DecodeError> {
    // Единственное бинарное сообщение шлюза.
    if descriptor.kind == DecodeKind::Protobuf {
        return vitals(body);
    }

    Ok(match descriptor.endpoint {
        Endpoint::MetersAggregates => Payload::MetersAggregates(json(body)?),
        Endpoint::MetersStatus => Payload::MetersStatus(json(body)?),
        Endpoint::Operation => Payload::Operation(json(body)?),
        Endpoint::Powerwalls => Payload::Powerwalls(json(body)?),
        Endpoint::SiteInfo => Payload::SiteInfo(json(body)?),
        Endpoint::Sitemaster => Payload::Sitemaster(json(body)?),
        Endpoint::Solars => Payload::Solars(json(body)?),
        Endpoint::SolarPowerwall => Payload::SolarPowerwall(json(body)?),
        Endpoint::NetworkConnectionTests => Payload::NetworkConnectionTests(json(body)?),
        Endpoint::Status => Payload::Status(json(body)?),
        Endpoint::SystemTesting => Payload::SystemTesting(json(body)?),
        Endpoint::UpdateStatus => Payload::UpdateStatus(json(body)?),
        Endpoint::SystemStatus => Payload::SystemStatus(json(body)?),
        Endpoint::GridStatus => Payload::GridStatus(json(body)?),
        Endpoint::StateOfEnergy => Payload::StateOfEnergy(json(body)?),
        Endpoint::Vitals => vitals(body)?,
    })
}

/// Один аутентифицированный GET и декодирование ответа. Без повторов.
pub async fn fetch(
    transport: &dyn Transport,
    descriptor: &EndpointDescriptor,
) -> Result<RawRecord, FetchError> {
    let body = transport.get(descriptor.path).await?;
    let captured_at = Utc::now();
    let payload = decode(descriptor, &body)?;
    Ok(RawRecord {
        endpoint: descriptor.endpoint,
        captured_at,
        payload,
        body,
    })
}
