//! Gateway behaviour against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap

use queuepass_client::gateway::{Gateway, SignInRequest, VerifyCodeRequest};
use queuepass_client::mocks::MemoryStorage;
use queuepass_client::session::{SessionAction, SessionHandle, SessionState, TicketStatus, UserPatch};
use queuepass_client::{ClientConfig, ClientError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn signed_in_session() -> SessionHandle {
    let session = SessionHandle::new(SessionState::default(), Arc::new(MemoryStorage::new()));
    session.login("jwt", UserPatch::phone("+77001234567")).await.unwrap();
    session
}

fn gateway_for(server: &MockServer, session: SessionHandle) -> Gateway<SessionHandle> {
    let config = ClientConfig::default()
        .with_api_base_url(server.uri())
        .with_request_timeout(Duration::from_secs(5));
    Gateway::new(&config.api, session).unwrap()
}

fn credentials() -> SignInRequest {
    SignInRequest {
        phone_number: "+77001234567".to_string(),
        password: "Secret#123".to_string(),
    }
}

#[tokio::test]
async fn test_sign_in_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-in"))
        .and(body_json(json!({"phoneNumber": "+77001234567", "password": "Secret#123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "ok",
            "token": "jwt-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionHandle::new(SessionState::default(), Arc::new(MemoryStorage::new()));
    let gateway = gateway_for(&server, session);

    assert_eq!(gateway.sign_in(&credentials()).await.unwrap(), "jwt-1");
}

#[tokio::test]
async fn test_sign_in_without_token_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-in"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Wrong password"
        })))
        .mount(&server)
        .await;

    let session = SessionHandle::new(SessionState::default(), Arc::new(MemoryStorage::new()));
    let gateway = gateway_for(&server, session);

    assert_eq!(
        gateway.sign_in(&credentials()).await,
        Err(ClientError::Rejected("Wrong password".to_string()))
    );
}

#[tokio::test]
async fn test_verify_code_requires_success_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verification/verify-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Code expired",
            "token": "ignored"
        })))
        .mount(&server)
        .await;

    let session = SessionHandle::new(SessionState::default(), Arc::new(MemoryStorage::new()));
    let gateway = gateway_for(&server, session);

    let result = gateway
        .verify_code(&VerifyCodeRequest {
            phone_number: "+77001234567".to_string(),
            code: "123456".to_string(),
        })
        .await;
    assert_eq!(result, Err(ClientError::Rejected("Code expired".to_string())));
}

#[tokio::test]
async fn test_protected_calls_carry_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tickets"))
        .and(header("authorization", "Bearer jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "WAITING",
            "createdAt": "2025-01-01T08:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server, signed_in_session().await);
    let ticket = gateway.create_ticket().await.unwrap();

    assert_eq!(ticket.status, TicketStatus::Waiting);
    assert_eq!(ticket.created_at, "2025-01-01T08:00:00");
    assert_eq!(ticket.queue_position, None);
}

#[tokio::test]
async fn test_absent_ticket_shapes() {
    for response in [
        ResponseTemplate::new(404).set_body_json(json!({"message": "No ticket"})),
        ResponseTemplate::new(200),
        ResponseTemplate::new(200).set_body_string("null"),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets"))
            .respond_with(response)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, signed_in_session().await);
        assert_eq!(gateway.get_ticket().await.unwrap(), None);
    }
}

#[tokio::test]
async fn test_existing_ticket_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "CALLED",
            "createdAt": "2025-01-01T08:00:00",
            "queuePosition": 0,
            "waitingTime": 0
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server, signed_in_session().await);
    let ticket = gateway.get_ticket().await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Called);
    assert_eq!(ticket.queue_position, Some(0));
}

#[tokio::test]
async fn test_server_message_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/tickets"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Queue closed"})))
        .mount(&server)
        .await;

    let session = signed_in_session().await;
    let gateway = gateway_for(&server, session.clone());

    let error = gateway.delete_ticket().await.unwrap_err();
    assert_eq!(
        error,
        ClientError::Server {
            status: 500,
            message: "Queue closed".to_string()
        }
    );
    assert_eq!(error.notice().description, "Queue closed");
    // Only 401 ends the session
    assert!(session.is_authenticated().await);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let config = ClientConfig::default()
        .with_api_base_url("http://127.0.0.1:9")
        .with_request_timeout(Duration::from_secs(2));
    let session = SessionHandle::new(SessionState::default(), Arc::new(MemoryStorage::new()));
    let gateway = Gateway::new(&config.api, session).unwrap();

    let error = gateway.sign_in(&credentials()).await.unwrap_err();
    assert!(error.is_network(), "unexpected error: {error:?}");
}

#[tokio::test]
async fn test_unauthorized_public_call_keeps_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/sign-in"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;

    let session = signed_in_session().await;
    let gateway = gateway_for(&server, session.clone());

    let error = gateway.sign_in(&credentials()).await.unwrap_err();
    assert!(error.is_unauthorized());
    assert!(session.is_authenticated().await);
}

#[tokio::test]
async fn test_concurrent_unauthorized_calls_expire_session_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(5)
        .mount(&server)
        .await;

    let session = signed_in_session().await;
    let mut actions = session.subscribe();
    let gateway = Arc::new(gateway_for(&server, session.clone()));

    let calls: Vec<_> = (0..5)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.get_ticket().await })
        })
        .collect();
    for call in calls {
        assert!(call.await.unwrap().unwrap_err().is_unauthorized());
    }

    assert!(!session.is_authenticated().await);
    assert!(session.token().await.is_none());

    let mut expired = 0;
    while let Ok(Ok(action)) = tokio::time::timeout(Duration::from_millis(100), actions.recv()).await {
        if action == SessionAction::SessionExpired {
            expired += 1;
        }
    }
    assert_eq!(expired, 1);
}

#[tokio::test]
async fn test_unauthorized_for_replaced_token_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/tickets"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = signed_in_session().await;
    let gateway = gateway_for(&server, session.clone());
    assert!(gateway.complete_ticket().await.unwrap_err().is_unauthorized());
    assert!(!session.is_authenticated().await);

    // A new login is not undone by a rejection aimed at the old token
    session.login("jwt-2", UserPatch::phone("+77001234567")).await.unwrap();
    session.reject_session("jwt").await.unwrap();
    assert!(session.is_authenticated().await);
}
