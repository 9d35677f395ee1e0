//! Типы ошибок ядра сборщика.
//!
//! Таксономия повторяет жизненный цикл опроса:
//! - [`AuthError`] - фатальная ошибка входа (без сессии ни один цикл не пройдёт);
//! - [`FetchError`] - ошибка одного эндпоинта, делает недействительным текущий цикл;
//! - [`DecodeError`] - ответ получен, но его форма не совпала с ожидаемой;
//! - [`FaultDecodeError`] - не удалось распаковать одну запись `grid_faults`,
//!   на остальной снапшот не влияет;
//! - [`CollectError`] - ошибка цикла с указанием эндпоинта;
//! - [`SinkError`] - ошибка записи снапшота, опрос продолжается.

use crate::gateway::endpoints::Endpoint;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Сколько байт сырого тела показывать в тексте ошибки.
const RAW_BODY_PREVIEW: usize = 512;

fn preview(body: &[u8]) -> String {
    let end = body.len().min(RAW_BODY_PREVIEW);
    let mut text = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > RAW_BODY_PREVIEW {
        text.push_str("...");
    }
    text
}

/// Ошибка входа на шлюз.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("login request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("expected {expected} HTTP status code but got {code}; raw body {body}")]
    UnexpectedStatus {
        expected: u16,
        code: u16,
        body: String,
    },

    #[error("malformed login response: {reason}")]
    MalformedResponse { reason: String },
}

/// Ошибка запроса одного эндпоинта.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("expected {expected} HTTP status code but got {got}; raw body {body}")]
    UnexpectedStatus { expected: u16, got: u16, body: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("session expired at {expired_at}, refusing to fetch")]
    SessionExpired { expired_at: DateTime<Utc> },

    #[error("fetch cancelled")]
    Cancelled,
}

/// Причина неудачного декодирования тела ответа.
#[derive(Debug, Error)]
pub enum DecodeCause {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("invalid vitals: {0}")]
    Vitals(#[from] VitalsError),
}

/// Тело ответа не удалось привести к типизированной записи.
///
/// Сырое тело сохраняется целиком, в `Display` попадает только начало.
#[derive(Debug, Error)]
#[error("{cause}; raw body {}", preview(.raw_body))]
pub struct DecodeError {
    pub cause: DecodeCause,
    pub raw_body: Bytes,
}

impl DecodeError {
    pub fn new(cause: impl Into<DecodeCause>, raw_body: Bytes) -> Self {
        Self {
            cause: cause.into(),
            raw_body,
        }
    }
}

/// Не удалось распаковать `decoded_alert` одной записи `grid_faults`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to unwrap decoded alert of fault {alert_name}: {reason}")]
pub struct FaultDecodeError {
    pub alert_name: String,
    pub reason: String,
}

/// Ошибка разбора одного из текстовых форматов времени шлюза.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot parse {input:?} as {format} timestamp: {reason}")]
pub struct TimeParseError {
    pub format: &'static str,
    pub input: String,
    pub reason: String,
}

/// Ошибка разбора строки длительности вида `89h51m33.77s`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DurationParseError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("negative duration {0:?}")]
    Negative(String),

    #[error("duration {0:?} overflows")]
    Overflow(String),
}

/// Ошибка нормализации бинарных vitals.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VitalsError {
    #[error("device #{index} carries alerts but has no device descriptor")]
    MissingDevice { index: usize },

    #[error("vital {name} of device {din} is not numeric")]
    NotNumeric { din: String, name: String },

    #[error("vital {name} of device {din} is not a string")]
    NotText { din: String, name: String },
}

/// Причина провала цикла сбора.
#[derive(Debug, Error)]
pub enum CollectCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no result was produced")]
    Missing,

    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Ошибка цикла сбора, всегда с указанием эндпоинта.
#[derive(Debug, Error)]
#[error("error when collecting {endpoint}: {cause}")]
pub struct CollectError {
    pub endpoint: Endpoint,
    pub cause: CollectCause,
}

impl CollectError {
    pub fn new(endpoint: Endpoint, cause: impl Into<CollectCause>) -> Self {
        Self {
            endpoint,
            cause: cause.into(),
        }
    }
}

/// Ошибка записи снапшота в хранилище.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink rejected write with HTTP status {code}: {body}")]
    Rejected { code: u16, body: String },

    #[error("sink misconfigured: {0}")]
    Config(String),

    #[error("failed to serialize point: {0}")]
    Point(#[from] influxdb::Error),
}
