//! Взаимодействие со шлюзом: вход, сессия и запросы к эндпоинтам.

pub mod endpoints;
pub mod fetch;
pub mod session;

pub use endpoints::{DecodeKind, Endpoint, EndpointDescriptor};
pub use fetch::{fetch, Payload, RawRecord};
pub use session::{session_expiry, Credentials, Session, SessionManager};

use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use std::time::Duration;

/// Код ответа, который шлюз отдаёт на любой успешный запрос.
pub const EXPECTED_STATUS: u16 = 200;

/// Параметры HTTP-клиента шлюза.
///
/// Политика проверки TLS фиксируется при создании клиента и не меняется
/// у уже открытых соединений.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: Url,
    pub skip_verify_ssl: bool,
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            skip_verify_ssl: false,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Полный URL для пути эндпоинта с сохранением префикса базового пути.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    pub(crate) fn client_builder(&self) -> reqwest::ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .danger_accept_invalid_certs(self.skip_verify_ssl)
            .timeout(self.request_timeout)
            .default_headers(headers)
    }
}

/// Аутентифицированный GET к шлюзу.
///
/// Реализуется [`Session`]; в тестах заменяется заглушкой.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Bytes, FetchError>;
}
