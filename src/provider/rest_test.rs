use super::*;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::auth::{AuthErrorKind, SessionFacade};
use crate::config::SubscriptionPolicy;
use crate::provider::AuthEvent;
use crate::provider::federated::FederatedCredential;

// =============================================================================
// STUB SERVER
// =============================================================================

#[derive(Default)]
struct Stub {
    replies: Mutex<HashMap<String, VecDeque<(StatusCode, Value)>>>,
    requests: Mutex<Vec<(String, String, Value)>>,
}

impl Stub {
    fn reply(&self, method: &str, status: StatusCode, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_owned())
            .or_default()
            .push_back((status, body));
    }

    fn requests(&self, method: &str) -> Vec<(String, Value)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _, _)| m == method)
            .map(|(_, query, body)| (query.clone(), body.clone()))
            .collect()
    }
}

async fn dispatch(State(stub): State<Arc<Stub>>, uri: Uri, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let method = uri
        .path()
        .rsplit_once("accounts:")
        .map(|(_, m)| m.to_owned())
        .unwrap_or_default();
    let query = uri.query().unwrap_or_default().to_owned();
    stub.requests.lock().unwrap().push((method.clone(), query, body));
    let reply = stub.replies.lock().unwrap().get_mut(&method).and_then(VecDeque::pop_front);
    match reply {
        Some((status, body)) => (status, Json(body)),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": { "code": 404, "message": "NOT_SCRIPTED" } }))),
    }
}

async fn spawn_stub() -> (Arc<Stub>, IdentityConfig) {
    let stub = Arc::new(Stub::default());
    let app = axum::Router::new().fallback(dispatch).with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (stub, IdentityConfig::new("test-key", &format!("http://{addr}/v1/")))
}

fn grant(uid: &str, email: &str) -> Value {
    json!({
        "kind": "identitytoolkit#VerifyPasswordResponse",
        "localId": uid,
        "email": email,
        "displayName": "",
        "idToken": format!("id-token-{uid}"),
        "refreshToken": "refresh",
        "expiresIn": "3600",
    })
}

fn error_body(message: &str) -> Value {
    json!({ "error": { "code": 400, "message": message, "errors": [{ "message": message }] } })
}

// =============================================================================
// translate_server_error
// =============================================================================

#[test]
fn translate_known_server_codes() {
    let cases = [
        ("EMAIL_EXISTS", codes::EMAIL_IN_USE),
        ("INVALID_EMAIL", codes::INVALID_EMAIL),
        ("EMAIL_NOT_FOUND", codes::USER_NOT_FOUND),
        ("INVALID_PASSWORD", codes::WRONG_PASSWORD),
        ("USER_DISABLED", codes::USER_DISABLED),
        ("TOO_MANY_ATTEMPTS_TRY_LATER", codes::TOO_MANY_REQUESTS),
        ("INVALID_LOGIN_CREDENTIALS", codes::INVALID_CREDENTIAL),
        ("TOKEN_EXPIRED", codes::USER_TOKEN_EXPIRED),
        ("INVALID_ID_TOKEN", codes::INVALID_USER_TOKEN),
    ];
    for (raw, code) in cases {
        assert_eq!(translate_server_error(raw).code, code, "{raw}");
    }
}

#[test]
fn translate_splits_detail() {
    let err = translate_server_error("WEAK_PASSWORD : Password should be at least 6 characters");
    assert_eq!(err.code, codes::WEAK_PASSWORD);
    assert_eq!(err.message, "Password should be at least 6 characters");
}

#[test]
fn translate_unknown_code_keeps_it_readable() {
    let err = translate_server_error("PROJECT_NOT_FOUND");
    assert_eq!(err.code, "auth/project-not-found");
    assert_eq!(err.message, "PROJECT_NOT_FOUND");
}

#[test]
fn unparsable_error_body_is_internal() {
    let err = error_from_response(502, "<html>bad gateway</html>");
    assert_eq!(err.code, codes::INTERNAL_ERROR);
    assert!(err.message.contains("502"));
}

// =============================================================================
// account calls
// =============================================================================

#[tokio::test]
async fn sign_in_posts_credentials_and_notifies() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signInWithPassword", StatusCode::OK, grant("u1", "a@b.com"));
    let provider = RestIdentityProvider::new(&config).unwrap();
    let mut sub = provider.subscribe().unwrap();
    assert_eq!(sub.next().await, Some(AuthEvent::Changed(None)));

    let identity = provider.sign_in("a@b.com", "Abcd123!").await.unwrap();
    assert_eq!(identity.uid, "u1");
    assert_eq!(identity.id_token, "id-token-u1");
    assert_eq!(identity.display_name, None, "blank display names are dropped");
    assert_eq!(sub.next().await, Some(AuthEvent::Changed(Some(identity))));

    let requests = stub.requests("signInWithPassword");
    assert_eq!(requests.len(), 1);
    let (query, body) = &requests[0];
    assert_eq!(query, "key=test-key");
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["password"], "Abcd123!");
    assert_eq!(body["returnSecureToken"], true);
}

#[tokio::test]
async fn sign_up_error_is_translated() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signUp", StatusCode::BAD_REQUEST, error_body("EMAIL_EXISTS"));
    let provider = RestIdentityProvider::new(&config).unwrap();

    let err = provider.create_account("a@b.com", "Abcd123!").await.unwrap_err();
    assert_eq!(err.code, codes::EMAIL_IN_USE);
    assert!(provider.listeners.current().is_none());
}

#[tokio::test]
async fn rejected_login_shows_a_readable_message() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signInWithPassword", StatusCode::BAD_REQUEST, error_body("INVALID_LOGIN_CREDENTIALS"));
    let provider: Arc<dyn IdentityProvider> = Arc::new(RestIdentityProvider::new(&config).unwrap());
    let facade = SessionFacade::start(provider, SubscriptionPolicy::default());

    let err = facade.sign_in("a@b.com", "wrong").await.unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::Unknown);
    assert_eq!(err.to_string(), "Something went wrong. Please try again");
    assert_eq!(err.provider_code(), Some(codes::INVALID_CREDENTIAL));
    assert_eq!(err.diagnostic(), "INVALID_LOGIN_CREDENTIALS");
}

#[tokio::test]
async fn password_reset_requests_reset_mail() {
    let (stub, config) = spawn_stub().await;
    stub.reply("sendOobCode", StatusCode::OK, json!({ "email": "a@b.com" }));
    let provider = RestIdentityProvider::new(&config).unwrap();

    provider.send_password_reset("a@b.com").await.unwrap();
    let (_, body) = &stub.requests("sendOobCode")[0];
    assert_eq!(body["requestType"], "PASSWORD_RESET");
    assert_eq!(body["email"], "a@b.com");
}

#[tokio::test]
async fn update_profile_notifies_current_identity() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signUp", StatusCode::OK, grant("u1", "a@b.com"));
    stub.reply("update", StatusCode::OK, json!({ "localId": "u1", "email": "a@b.com", "displayName": "Name" }));
    let provider = RestIdentityProvider::new(&config).unwrap();
    let identity = provider.create_account("a@b.com", "Abcd123!").await.unwrap();
    let mut sub = provider.subscribe().unwrap();
    let _ = sub.next().await;

    provider.update_profile(&identity, &ProfileUpdate::display_name("Name")).await.unwrap();

    let (_, body) = &stub.requests("update")[0];
    assert_eq!(body["idToken"], "id-token-u1");
    assert_eq!(body["displayName"], "Name");
    match sub.next().await {
        Some(AuthEvent::Changed(Some(updated))) => {
            assert_eq!(updated.display_name.as_deref(), Some("Name"));
            assert_eq!(updated.id_token, "id-token-u1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn reload_reads_lookup_and_keeps_token() {
    let (stub, config) = spawn_stub().await;
    stub.reply(
        "lookup",
        StatusCode::OK,
        json!({ "users": [{ "localId": "u1", "email": "a@b.com", "displayName": "Fresh", "photoUrl": "https://img.test/u1.png" }] }),
    );
    stub.reply("lookup", StatusCode::OK, json!({ "users": [{ "localId": "u1", "disabled": true }] }));
    stub.reply("lookup", StatusCode::OK, json!({}));
    stub.reply("lookup", StatusCode::BAD_REQUEST, error_body("TOKEN_EXPIRED"));
    let provider = RestIdentityProvider::new(&config).unwrap();
    let stale = Identity {
        uid: "u1".into(),
        id_token: "tok".into(),
        email: Some("a@b.com".into()),
        display_name: None,
        photo_url: None,
    };

    let fresh = provider.reload(&stale).await.unwrap();
    assert_eq!(fresh.display_name.as_deref(), Some("Fresh"));
    assert_eq!(fresh.photo_url.as_deref(), Some("https://img.test/u1.png"));
    assert_eq!(fresh.id_token, "tok");

    assert_eq!(provider.reload(&stale).await.unwrap_err().code, codes::USER_DISABLED);
    assert_eq!(provider.reload(&stale).await.unwrap_err().code, codes::USER_NOT_FOUND);
    assert_eq!(provider.reload(&stale).await.unwrap_err().code, codes::USER_TOKEN_EXPIRED);
}

#[tokio::test]
async fn sign_out_is_local_and_notifies() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signInWithPassword", StatusCode::OK, grant("u1", "a@b.com"));
    let provider = RestIdentityProvider::new(&config).unwrap();
    provider.sign_in("a@b.com", "Abcd123!").await.unwrap();
    let mut sub = provider.subscribe().unwrap();
    let _ = sub.next().await;

    provider.sign_out().await.unwrap();
    assert_eq!(sub.next().await, Some(AuthEvent::Changed(None)));
    assert_eq!(stub.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_service_is_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let provider = RestIdentityProvider::new(&IdentityConfig::new("k", &format!("http://{addr}/v1"))).unwrap();

    let err = provider.sign_in("a@b.com", "Abcd123!").await.unwrap_err();
    assert_eq!(err.code, codes::NETWORK_REQUEST_FAILED);
}

// =============================================================================
// federated
// =============================================================================

struct FixedFlow {
    gate: Option<Arc<Notify>>,
}

#[async_trait::async_trait]
impl FederatedFlow for FixedFlow {
    async fn authorize(&self, request: &FederatedRequest) -> Result<FederatedCredential, ProviderError> {
        assert_eq!(request.custom_parameters.get("prompt").map(String::as_str), Some("select_account"));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(FederatedCredential { id_token: "google-id-token".into() })
    }
}

#[tokio::test]
async fn federated_without_flow_is_unsupported() {
    let (_stub, config) = spawn_stub().await;
    let provider = RestIdentityProvider::new(&config).unwrap();
    let err = provider.sign_in_with_federated().await.unwrap_err();
    assert_eq!(err.code, codes::OPERATION_NOT_SUPPORTED);
}

#[tokio::test]
async fn federated_exchanges_idp_token() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signInWithIdp", StatusCode::OK, grant("g1", "g@b.com"));
    let provider = RestIdentityProvider::new(&config)
        .unwrap()
        .with_federated_flow(Arc::new(FixedFlow { gate: None }));

    let identity = provider.sign_in_with_federated().await.unwrap();
    assert_eq!(identity.uid, "g1");

    let (_, body) = &stub.requests("signInWithIdp")[0];
    let post_body = body["postBody"].as_str().unwrap();
    assert!(post_body.contains("id_token=google-id-token"));
    assert!(post_body.contains("providerId=google.com"));
    assert_eq!(body["requestUri"], "http://localhost");
}

#[tokio::test]
async fn second_federated_attempt_while_pending_is_cancelled() {
    let (stub, config) = spawn_stub().await;
    stub.reply("signInWithIdp", StatusCode::OK, grant("g1", "g@b.com"));
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(
        RestIdentityProvider::new(&config)
            .unwrap()
            .with_federated_flow(Arc::new(FixedFlow { gate: Some(gate.clone()) })),
    );

    let first = tokio::spawn({
        let provider = provider.clone();
        async move { provider.sign_in_with_federated().await }
    });
    while !provider.federated_in_flight.load(Ordering::Acquire) {
        tokio::task::yield_now().await;
    }

    let err = provider.sign_in_with_federated().await.unwrap_err();
    assert_eq!(err.code, codes::CANCELLED_POPUP_REQUEST);

    gate.notify_one();
    assert_eq!(first.await.unwrap().unwrap().uid, "g1");
    assert!(!provider.federated_in_flight.load(Ordering::Acquire));
}
