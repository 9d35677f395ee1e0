//! Мок шлюза для интеграционных тестов: вход и все эндпоинты на 127.0.0.1.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, TimeDelta, Utc};
use prost::Message;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tegstats_core::config::Config;
use tegstats_core::gateway::{Credentials, SessionManager, TransportConfig};
use tegstats_core::vitals::proto::{
    vital::Value, Device, DeviceWithVitals, DevicesWithVitals, EcuAttributes, Vital,
};

pub const TOKEN: &str = "tok-0123456789abcdef";
pub const GATEWAY_DIN: &str = "1232100-00-E--TG123456789012";
pub const INVERTER_DIN: &str = "1538000-45-C--CN321293D0021C";
pub const THC_DIN: &str = "1234567-89-A--TH0012345";
pub const SYNC_DIN: &str = "1841000-01-B--NK1234567";

/// Тела JSON-эндпоинтов.
pub const JSON_FIXTURES: [(&str, &str); 15] = [
    ("/api/meters/aggregates", include_str!("../fixtures/meters_aggregates.json")),
    ("/api/meters/status", include_str!("../fixtures/meters_status.json")),
    ("/api/operation", include_str!("../fixtures/operation.json")),
    ("/api/powerwalls", include_str!("../fixtures/powerwalls.json")),
    ("/api/site_info", include_str!("../fixtures/site_info.json")),
    ("/api/sitemaster", include_str!("../fixtures/sitemaster.json")),
    ("/api/solars", include_str!("../fixtures/solars.json")),
    ("/api/solar_powerwall", include_str!("../fixtures/solar_powerwall.json")),
    ("/api/system/networks/conn_tests", include_str!("../fixtures/conn_tests.json")),
    ("/api/status", include_str!("../fixtures/status.json")),
    ("/api/system/testing", include_str!("../fixtures/system_testing.json")),
    ("/api/system/update/status", include_str!("../fixtures/update_status.json")),
    ("/api/system_status", include_str!("../fixtures/system_status.json")),
    ("/api/system_status/grid_status", include_str!("../fixtures/grid_status.json")),
    ("/api/system_status/soe", include_str!("../fixtures/soe.json")),
];

pub const VITALS_PATH: &str = "/api/devices/vitals";

/// Ответ на очередной вход.
#[derive(Debug, Clone)]
pub enum LoginReply {
    /// Успешный вход; `loginTime` сдвинут в прошлое на `age`.
    Ok { age: TimeDelta },
    Status(u16),
    BadLoginTime,
}

#[derive(Default)]
pub struct GatewayState {
    pub logins: AtomicUsize,
    pub requests: AtomicUsize,
    pub unauthorized: AtomicUsize,
    /// Ответы на входы по порядку; когда очередь пуста, вход успешен.
    pub login_replies: Mutex<VecDeque<LoginReply>>,
    /// Эндпоинт, отвечающий 500.
    pub failing_path: Mutex<Option<String>>,
    pub last_login_body: Mutex<Option<serde_json::Value>>,
}

impl GatewayState {
    pub fn queue_login(&self, reply: LoginReply) {
        self.login_replies.lock().unwrap().push_back(reply);
    }

    pub fn fail_path(&self, path: &str) {
        *self.failing_path.lock().unwrap() = Some(path.to_string());
    }
}

pub struct MockGateway {
    pub addr: SocketAddr,
    pub state: Arc<GatewayState>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let state = Arc::new(GatewayState::default());

        let mut router = Router::new().route("/api/login/Basic", post(login));
        for (path, body) in JSON_FIXTURES {
            router = router.route(
                path,
                get(move |State(state): State<Arc<GatewayState>>, headers: HeaderMap| async move {
                    serve(&state, &headers, path, "application/json", Bytes::from_static(body.as_bytes()))
                }),
            );
        }
        router = router.route(
            VITALS_PATH,
            get(|State(state): State<Arc<GatewayState>>, headers: HeaderMap| async move {
                serve(
                    &state,
                    &headers,
                    VITALS_PATH,
                    "application/octet-stream",
                    Bytes::from(vitals_fixture().encode_to_vec()),
                )
            }),
        );
        let app = router.with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn session_manager(&self) -> SessionManager {
        let url = reqwest::Url::parse(&self.base_url()).expect("mock url");
        SessionManager::new(
            TransportConfig::new(url),
            Credentials {
                email: "owner@example.com".to_string(),
                password: "secret".to_string(),
            },
        )
    }

    pub fn config(&self, interval_secs: u64, exit_on_fail: bool) -> Config {
        let yaml = format!(
            r#"
gateway:
  address: "{}"
  email: "owner@example.com"
  password: "secret"
  request_timeout_secs: 5
polling:
  interval_secs: {interval_secs}
  exit_on_fail: {exit_on_fail}
"#,
            self.base_url()
        );
        let config: Config = serde_yaml::from_str(&yaml).expect("mock config");
        config.validate().expect("mock config is valid");
        config
    }
}

fn login_body(age: TimeDelta) -> serde_json::Value {
    let login_time = (Utc::now() - age).to_rfc3339_opts(SecondsFormat::Nanos, false);
    serde_json::json!({
        "email": "owner@example.com",
        "firstname": "Tesla",
        "lastname": "Energy",
        "roles": ["Home_Owner"],
        "token": TOKEN,
        "provider": "Basic",
        "loginTime": login_time,
    })
}

async fn login(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<serde_json::Value>,
) -> Response {
    state.logins.fetch_add(1, Ordering::SeqCst);
    *state.last_login_body.lock().unwrap() = Some(request);

    let reply = state
        .login_replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(LoginReply::Ok { age: TimeDelta::zero() });

    match reply {
        LoginReply::Ok { age } => Json(login_body(age)).into_response(),
        LoginReply::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            "{\"code\":401,\"error\":\"bad credentials\",\"message\":\"Login Error\"}",
        )
            .into_response(),
        LoginReply::BadLoginTime => {
            let mut body = login_body(TimeDelta::zero());
            body["loginTime"] = serde_json::Value::from("yesterday at noon");
            Json(body).into_response()
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let cookies: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .collect();
    cookies.contains(&format!("AuthCookie={TOKEN}").as_str())
        && cookies.iter().any(|c| c.starts_with("UserRecord=") && c.len() > "UserRecord=".len())
}

fn serve(
    state: &GatewayState,
    headers: &HeaderMap,
    path: &str,
    content_type: &'static str,
    body: Bytes,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if !authorized(headers) {
        state.unauthorized.fetch_add(1, Ordering::SeqCst);
        return (StatusCode::UNAUTHORIZED, "{\"code\":401,\"error\":\"Token invalid\"}")
            .into_response();
    }
    if state.failing_path.lock().unwrap().as_deref() == Some(path) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "gateway busy").into_response();
    }
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn float(name: &str, v: f64) -> Vital {
    Vital {
        name: name.to_string(),
        value: Some(Value::FloatValue(v)),
    }
}

fn text(name: &str, v: &str) -> Vital {
    Vital {
        name: name.to_string(),
        value: Some(Value::StringValue(v.to_string())),
    }
}

fn device(din: &str, ecu_type: Option<i32>) -> Option<Device> {
    let (part_number, serial_number) = din.split_once("--").unwrap_or((din, ""));
    Some(Device {
        din: din.to_string(),
        part_number: part_number.to_string(),
        serial_number: serial_number.to_string(),
        manufacturer: "TESLA".to_string(),
        component_parent_din: GATEWAY_DIN.to_string(),
        firmware_version: "c58c2df39aa0e3".to_string(),
        ecu_attributes: ecu_type.map(|ecu_type| EcuAttributes { ecu_type }),
        ..Default::default()
    })
}

/// Бинарные vitals: инвертор, датчик температуры, устройство с тревогами
/// и устройство неизвестного типа.
pub fn vitals_fixture() -> DevicesWithVitals {
    DevicesWithVitals {
        devices: vec![
            DeviceWithVitals {
                device: device(INVERTER_DIN, Some(296)),
                vitals: vec![
                    text("PVAC_State", "PVAC_Active"),
                    text("PVAC_GridState", "Grid_Compliant"),
                    float("PVAC_Pout", 1234.5),
                    float("PVAC_Fout", 50.014),
                    float("PVAC_Vout", 241.9),
                    float("PVAC_PVCurrent_A", 1.9),
                    float("PVAC_PVMeasuredVoltage_A", 351.2),
                    float("PVAC_PVMeasuredPower_A", 667.28),
                    text("PVAC_PvState_A", "PV_Active"),
                    text("PVAC_PvState_B", "PV_Disabled"),
                    float("PVAC_Fan_Speed_Actual_RPM", 1920.0),
                ],
                alerts: vec![],
            },
            DeviceWithVitals {
                device: device(THC_DIN, Some(224)),
                vitals: vec![
                    text("THC_State", "THC_STATE_AUTONOMOUSCONTROL"),
                    float("THC_AmbientTemp", 23.5),
                ],
                alerts: vec!["THC_w155_Backup_Genealogy_Updated".to_string()],
            },
            DeviceWithVitals {
                device: device(SYNC_DIN, None),
                vitals: vec![text("firmwareVersion", "2021-10-01")],
                alerts: vec![
                    "SYNC_a001_SW_App_Boot".to_string(),
                    "SYNC_a046_DoCloseArguments".to_string(),
                ],
            },
            DeviceWithVitals {
                device: device("0000000-00-0--UNKNOWN", Some(999)),
                vitals: vec![float("Something", 1.0)],
                alerts: vec![],
            },
        ],
    }
}
