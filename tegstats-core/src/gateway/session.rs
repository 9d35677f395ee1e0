//! Вход на шлюз и жизненный цикл сессии.
//!
//! После входа HTTP-клиент сессии несёт две cookie для адреса шлюза:
//! `AuthCookie` с токеном и `UserRecord` с base64 от сырого тела ответа.
//! Токен шлюза живёт 24 часа; сессия считается истёкшей на пять минут
//! раньше, чтобы она не истекла посреди цикла.

use super::{Transport, TransportConfig, EXPECTED_STATUS};
use crate::error::{AuthError, FetchError};
use crate::timefmt;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const LOGIN_PATH: &str = "/api/login/Basic";
const SERVICE_ACCOUNT: &str = "customer";

/// Срок жизни сессии от момента входа: 24 часа минус 5 минут запаса.
pub fn session_lifetime() -> TimeDelta {
    TimeDelta::hours(23) + TimeDelta::minutes(55)
}

/// Момент, после которого сессию нельзя использовать.
pub fn session_expiry(login_time: DateTime<FixedOffset>) -> DateTime<Utc> {
    login_time.with_timezone(&Utc) + session_lifetime()
}

/// Учётные данные владельца шлюза.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    email: &'a str,
    force_sm_off: bool,
}

/// Тело ответа на вход.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub roles: Vec<String>,
    pub token: String,
    pub provider: String,
    #[serde(rename = "loginTime")]
    pub login_time: String,
}

/// Действующая сессия шлюза.
///
/// Не меняется после создания: при обновлении цикл опроса заменяет её новой.
pub struct Session {
    client: reqwest::Client,
    config: TransportConfig,
    token: String,
    user_record: String,
    login_time: DateTime<FixedOffset>,
    expires_at: DateTime<Utc>,
    profile: LoginResponse,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// base64 от сырого тела ответа на вход.
    pub fn user_record(&self) -> &str {
        &self.user_record
    }

    pub fn login_time(&self) -> DateTime<FixedOffset> {
        self.login_time
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn profile(&self) -> &LoginResponse {
        &self.profile
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.config.base_url.as_str())
            .field("login_time", &self.login_time)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for Session {
    async fn get(&self, path: &str) -> Result<Bytes, FetchError> {
        if self.is_expired_at(Utc::now()) {
            return Err(FetchError::SessionExpired {
                expired_at: self.expires_at,
            });
        }

        let transport = |source| FetchError::Transport {
            path: path.to_string(),
            source,
        };

        let response = self
            .client
            .get(self.config.url_for(path))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?;

        if status != EXPECTED_STATUS {
            return Err(FetchError::UnexpectedStatus {
                expected: EXPECTED_STATUS,
                got: status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

/// Выполняет вход на шлюз и выдаёт новые сессии.
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: TransportConfig,
    credentials: Credentials,
}

impl SessionManager {
    pub fn new(config: TransportConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Войти на шлюз и построить сессию с cookie для последующих запросов.
    pub async fn authenticate(&self) -> Result<Session, AuthError> {
        let url = self.config.url_for(LOGIN_PATH);
        debug!(url = %url, "Logging in to gateway");

        let login_client = self.config.client_builder().build().map_err(AuthError::Client)?;
        let payload = LoginRequest {
            username: SERVICE_ACCOUNT,
            password: &self.credentials.password,
            email: &self.credentials.email,
            force_sm_off: false,
        };

        let response = login_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(AuthError::Transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(AuthError::Transport)?;

        if status != EXPECTED_STATUS {
            return Err(AuthError::UnexpectedStatus {
                expected: EXPECTED_STATUS,
                code: status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let profile: LoginResponse =
            serde_json::from_slice(&body).map_err(|e| AuthError::MalformedResponse {
                reason: format!("invalid JSON: {e}"),
            })?;
        if profile.token.is_empty() {
            return Err(AuthError::MalformedResponse {
                reason: "missing token".to_string(),
            });
        }
        let login_time =
            timefmt::parse_nanos(&profile.login_time).map_err(|e| AuthError::MalformedResponse {
                reason: format!("error when parsing authentication time, {e}"),
            })?;

        let user_record = STANDARD.encode(&body);
        let jar = Jar::default();
        jar.add_cookie_str(
            &format!("AuthCookie={}; Path=/", profile.token),
            &self.config.base_url,
        );
        jar.add_cookie_str(
            &format!("UserRecord={user_record}; Path=/"),
            &self.config.base_url,
        );

        let client = self
            .config
            .client_builder()
            .cookie_provider(Arc::new(jar))
            .build()
            .map_err(AuthError::Client)?;

        let expires_at = session_expiry(login_time);
        info!(
            login_time = %login_time,
            expires_at = %expires_at,
            "Authenticated to gateway"
        );

        Ok(Session {
            client,
            config: self.config.clone(),
            token: profile.token.clone(),
            user_record,
            login_time,
            expires_at,
            profile,
        })
    }
}
