//! Интеграционные тесты входа на шлюз и сессии против мок-шлюза.

mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{TimeDelta, Utc};
use common::{LoginReply, MockGateway, TOKEN};
use std::sync::atomic::Ordering;
use tegstats_core::error::{AuthError, FetchError};
use tegstats_core::gateway::{fetch, session_expiry, Endpoint, Payload, Transport};

#[tokio::test]
async fn test_login_sends_fixed_payload_and_sets_cookies() {
    let gateway = MockGateway::start().await;
    let session = gateway
        .session_manager()
        .authenticate()
        .await
        .expect("login succeeds");

    assert_eq!(session.token(), TOKEN);
    assert_eq!(session.profile().firstname, "Tesla");
    assert_eq!(session.profile().roles, vec!["Home_Owner".to_string()]);

    let login = gateway
        .state
        .last_login_body
        .lock()
        .unwrap()
        .clone()
        .expect("login body recorded");
    assert_eq!(login["username"], "customer");
    assert_eq!(login["password"], "secret");
    assert_eq!(login["email"], "owner@example.com");
    assert_eq!(login["force_sm_off"], false);

    // UserRecord несёт base64 от всего тела ответа на вход.
    let raw = STANDARD.decode(session.user_record()).expect("valid base64");
    let record: serde_json::Value = serde_json::from_slice(&raw).expect("login body JSON");
    assert_eq!(record["token"], TOKEN);

    let raw = fetch(&session, &Endpoint::Status.descriptor())
        .await
        .expect("authorized fetch");
    match raw.payload {
        Payload::Status(status) => assert_eq!(status.gateway_id, common::GATEWAY_DIN),
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(gateway.state.unauthorized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expiry_is_login_time_plus_23h55m() {
    let gateway = MockGateway::start().await;
    let session = gateway.session_manager().authenticate().await.unwrap();

    assert_eq!(session.expires_at(), session_expiry(session.login_time()));
    assert_eq!(
        session.expires_at() - session.login_time().with_timezone(&Utc),
        TimeDelta::hours(23) + TimeDelta::minutes(55)
    );
}

#[tokio::test]
async fn test_unexpected_login_status() {
    let gateway = MockGateway::start().await;
    gateway.state.queue_login(LoginReply::Status(401));

    let err = gateway.session_manager().authenticate().await.unwrap_err();
    match err {
        AuthError::UnexpectedStatus {
            expected,
            code,
            body,
        } => {
            assert_eq!(expected, 200);
            assert_eq!(code, 401);
            assert!(body.contains("bad credentials"), "{body}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_login_time() {
    let gateway = MockGateway::start().await;
    gateway.state.queue_login(LoginReply::BadLoginTime);

    let err = gateway.session_manager().authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse { .. }));
    assert!(err
        .to_string()
        .contains("error when parsing authentication time"));
}

#[tokio::test]
async fn test_expired_session_refuses_to_fetch() {
    let gateway = MockGateway::start().await;
    gateway.state.queue_login(LoginReply::Ok {
        age: TimeDelta::hours(23) + TimeDelta::minutes(56),
    });

    let session = gateway.session_manager().authenticate().await.unwrap();
    assert!(session.is_expired_at(Utc::now()));

    let err = session.get("/api/status").await.unwrap_err();
    assert!(matches!(err, FetchError::SessionExpired { .. }));
    assert_eq!(gateway.state.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_gateway_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = reqwest::Url::parse(&format!("http://{addr}")).unwrap();
    let manager = tegstats_core::gateway::SessionManager::new(
        tegstats_core::gateway::TransportConfig::new(url),
        tegstats_core::gateway::Credentials {
            email: String::new(),
            password: "secret".to_string(),
        },
    );
    let err = manager.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)), "{err:?}");
}
