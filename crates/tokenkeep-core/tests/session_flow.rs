//! End-to-end session behaviour against a local login/protected server.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Json;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use tokenkeep_core::api::Interceptor;
use tokenkeep_core::auth::token::{self, Claims};
use tokenkeep_core::auth::{AuthSessionManager, AuthState, MemorySessionStore, SessionStore};
use tokenkeep_core::models::SubjectId;
use tokenkeep_core::{AuthApi, AuthError, AuthenticatedHttpClient};

/// How the fake server builds the token for an account
#[derive(Clone, Copy)]
enum Issue {
    Valid,
    Slow,
    AlreadyExpired,
    Garbage,
}

struct Account {
    id: i64,
    username: &'static str,
    password: &'static str,
    role: &'static str,
    issue: Issue,
}

const ACCOUNTS: &[Account] = &[
    Account { id: 1, username: "admin", password: "password", role: "admin", issue: Issue::Valid },
    Account { id: 2, username: "user", password: "userpass", role: "user", issue: Issue::Valid },
    Account { id: 3, username: "slow", password: "slowpass", role: "user", issue: Issue::Slow },
    Account { id: 4, username: "stale", password: "stalepass", role: "user", issue: Issue::AlreadyExpired },
    Account { id: 5, username: "broken", password: "brokenpass", role: "user", issue: Issue::Garbage },
];

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

fn issue_token(id: i64, username: &str, role: &str, exp: i64) -> String {
    token::encode_unsigned(&Claims {
        user_id: SubjectId::Number(id),
        username: username.to_string(),
        role: role.to_string(),
        exp,
        iat: Some(Utc::now().timestamp()),
    })
    .unwrap()
}

async fn login(Json(body): Json<LoginBody>) -> Response {
    let Some(account) = ACCOUNTS
        .iter()
        .find(|a| a.username == body.username && a.password == body.password)
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid username or password" })),
        )
            .into_response();
    };

    let now = Utc::now().timestamp();
    let token = match account.issue {
        Issue::Valid => issue_token(account.id, account.username, account.role, now + 86_400),
        Issue::Slow => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            issue_token(account.id, account.username, account.role, now + 86_400)
        }
        Issue::AlreadyExpired => issue_token(account.id, account.username, account.role, now - 10),
        Issue::Garbage => "not-a-token".to_string(),
    };

    Json(json!({
        "token": token,
        "user": { "id": account.id, "username": account.username, "role": account.role }
    }))
    .into_response()
}

async fn profile(headers: HeaderMap) -> Response {
    let claims = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(token::decode);

    match claims {
        Some(claims) => Json(json!({ "username": claims.username, "role": claims.role })).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Missing authorization header" })),
        )
            .into_response(),
    }
}

async fn revoked() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn slow_revoked() -> StatusCode {
    tokio::time::sleep(Duration::from_millis(300)).await;
    StatusCode::UNAUTHORIZED
}

async fn forbidden() -> (StatusCode, &'static str) {
    (StatusCode::FORBIDDEN, "admins only")
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/profile", get(profile))
        .route("/api/revoked", get(revoked))
        .route("/api/slow-revoked", get(slow_revoked))
        .route("/api/forbidden", get(forbidden));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn manager_for(base_url: &str, store: Arc<MemorySessionStore>) -> Arc<AuthSessionManager> {
    let api = AuthApi::new(base_url, Duration::from_secs(5)).unwrap();
    Arc::new(AuthSessionManager::new(api, store))
}

#[tokio::test]
async fn test_login_then_protected_request() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();

    let user = manager.login("admin", "password").await.unwrap();
    assert_eq!(user.id, SubjectId::Number(1));
    assert_eq!(user.role, "admin");
    assert!(manager.has_role("admin"));

    let token = manager.current_token().expect("token after login");
    assert_eq!(store.load().unwrap(), Some(token));

    let client = AuthenticatedHttpClient::new(manager.clone());
    let body: Value = client
        .get_json(&format!("{}/api/profile", base))
        .await
        .unwrap();
    assert_eq!(body["username"], "admin");
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_bad_password_surfaces_server_message() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();

    let err = manager.login("admin", "wrong").await.unwrap_err();
    match err {
        AuthError::InvalidCredentials(msg) => assert_eq!(msg, "Invalid username or password"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(manager.state(), AuthState::Anonymous);
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn test_login_rejects_unusable_tokens() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();

    let err = manager.login("stale", "stalepass").await.unwrap_err();
    assert!(matches!(err, AuthError::Expired), "got {:?}", err);

    let err = manager.login("broken", "brokenpass").await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken), "got {:?}", err);

    assert!(!manager.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_server_is_network_failure() {
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for("http://127.0.0.1:9", store);
    manager.hydrate();

    let err = manager.login("admin", "password").await.unwrap_err();
    assert!(matches!(err, AuthError::NetworkFailure(_)), "got {:?}", err);
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn test_unauthorized_response_forces_logout() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();
    manager.login("user", "userpass").await.unwrap();

    let client = AuthenticatedHttpClient::new(manager.clone());
    let err = client
        .execute(client.get(format!("{}/api/revoked", base)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired), "got {:?}", err);

    assert_eq!(manager.state(), AuthState::Anonymous);
    assert_eq!(manager.current_token(), None);
    assert_eq!(store.load().unwrap(), None);

    // Nothing is sent once the session is gone
    let err = client
        .execute(client.get(format!("{}/api/profile", base)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated), "got {:?}", err);
}

#[tokio::test]
async fn test_other_error_statuses_pass_through() {
    let base = spawn_server().await;
    let manager = manager_for(&base, Arc::new(MemorySessionStore::new()));
    manager.hydrate();
    manager.login("user", "userpass").await.unwrap();

    let client = AuthenticatedHttpClient::new(manager.clone());
    let response = client
        .execute(client.get(format!("{}/api/forbidden", base)))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(response.text().await.unwrap(), "admins only");
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_anonymous_request_fails_fast() {
    let base = spawn_server().await;
    let manager = manager_for(&base, Arc::new(MemorySessionStore::new()));
    manager.hydrate();

    let client = AuthenticatedHttpClient::new(manager);
    let err = client
        .get_json::<Value>(&format!("{}/api/profile", base))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated), "got {:?}", err);
}

#[tokio::test]
async fn test_hydration_reproduces_login_user() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());

    let first = manager_for(&base, store.clone());
    first.hydrate();
    let user = first.login("admin", "password").await.unwrap();
    let token = first.current_token().unwrap();

    // Next process start, same persisted slot
    let second = manager_for(&base, store.clone());
    let state = second.hydrate();
    assert_eq!(state.user(), Some(&user));
    assert_eq!(second.current_token(), Some(token));
}

#[tokio::test]
async fn test_requests_wait_for_hydration() {
    let base = spawn_server().await;
    let now = Utc::now().timestamp();
    let store = Arc::new(MemorySessionStore::with_token(issue_token(2, "user", "user", now + 3600)));
    let manager = manager_for(&base, store);
    assert!(manager.is_loading());

    let client = AuthenticatedHttpClient::new(manager.clone());
    let url = format!("{}/api/profile", base);
    let pending = tokio::spawn(async move { client.get_json::<Value>(&url).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    manager.hydrate();
    let body = pending.await.unwrap().unwrap();
    assert_eq!(body["username"], "user");
}

#[tokio::test]
async fn test_logout_during_pending_login_wins() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();

    let (result, ()) = tokio::join!(manager.login("slow", "slowpass"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.logout();
    });

    assert!(matches!(result, Err(AuthError::Superseded)), "got {:?}", result);
    assert_eq!(manager.state(), AuthState::Anonymous);
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn test_overlapping_logins_last_resolved_wins() {
    let base = spawn_server().await;
    let manager = manager_for(&base, Arc::new(MemorySessionStore::new()));
    manager.hydrate();

    // "slow" is dispatched first but resolves after "admin"
    let (slow, fast) = tokio::join!(
        manager.login("slow", "slowpass"),
        manager.login("admin", "password")
    );
    assert!(slow.is_ok());
    assert!(fast.is_ok());

    let user = manager.current_user().unwrap();
    assert_eq!(user.username, "slow");
}

#[tokio::test]
async fn test_subscribers_observe_transitions() {
    let base = spawn_server().await;
    let manager = manager_for(&base, Arc::new(MemorySessionStore::new()));
    let mut rx = manager.subscribe();
    assert!(rx.borrow().is_loading());

    manager.hydrate();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), AuthState::Anonymous);

    manager.login("user", "userpass").await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().user().map(|u| u.role.as_str()), Some("user"));

    manager.logout();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), AuthState::Anonymous);
}

#[tokio::test]
async fn test_late_unauthorized_for_replaced_token_keeps_new_session() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();
    manager.login("user", "userpass").await.unwrap();

    let client = AuthenticatedHttpClient::new(manager.clone());
    let (stale, admin) = tokio::join!(
        client.execute(client.get(format!("{}/api/slow-revoked", base))),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            manager.logout();
            manager.login("admin", "password").await.unwrap()
        }
    );

    assert!(matches!(stale, Err(AuthError::SessionExpired)), "got {:?}", stale);
    assert_eq!(manager.current_user(), Some(admin));
    let token = manager.current_token().expect("admin session survives");
    assert_eq!(store.load().unwrap(), Some(token));
}

/// Turns every 4xx into an error of its own.
struct RejectClientErrors;

impl Interceptor for RejectClientErrors {
    fn after_receive(&self, response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        if response.status().is_client_error() {
            return Err(AuthError::InvalidResponse(format!("status {}", response.status())));
        }
        Ok(response)
    }
}

#[tokio::test]
async fn test_custom_interceptor_cannot_swallow_unauthorized() {
    let base = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager_for(&base, store.clone());
    manager.hydrate();
    manager.login("user", "userpass").await.unwrap();

    let client = AuthenticatedHttpClient::new(manager.clone()).with_interceptor(RejectClientErrors);

    // The custom step still runs for other statuses
    let err = client
        .execute(client.get(format!("{}/api/forbidden", base)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResponse(_)), "got {:?}", err);
    assert!(manager.is_authenticated());

    let err = client
        .execute(client.get(format!("{}/api/revoked", base)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired), "got {:?}", err);
    assert!(!manager.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn test_request_without_hydration_gives_up() {
    let base = spawn_server().await;
    let manager = manager_for(&base, Arc::new(MemorySessionStore::new()));

    let client = AuthenticatedHttpClient::new(manager.clone())
        .with_hydration_wait(Duration::from_millis(100));
    let err = client
        .execute(client.get(format!("{}/api/profile", base)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated), "got {:?}", err);
    assert!(manager.is_loading());
}
