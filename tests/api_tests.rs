use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use kadro::api::AppState;
use kadro::config::Config;
use kadro::db::NewUser;
use kadro::entities::users::{UserStatus, UserType};
use std::sync::Arc;
use tower::ServiceExt;

/// Bootstrap admin credentials seeded by the initial migration.
const ADMIN_PASSWORD: &str = "ChangeMe!123";

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    // A single connection keeps every query on the same in-memory database.
    config.database.max_connections = 1;
    config.database.min_connections = 1;
    config.server.secure_cookies = false;

    let state = kadro::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");

    (kadro::api::router(state.clone()), state)
}

async fn seed_user(state: &AppState, name: &str, password: &str, first_login: bool) -> i32 {
    let hash = state.hasher.hash(password).unwrap();
    state
        .store
        .insert_user(NewUser {
            name: name.to_string(),
            password_hash: hash,
            status: UserStatus::Active,
            user_type: UserType::Normal,
            is_first_login: first_login,
            password_expiry_date: None,
            valid_until: None,
            created_by: None,
        })
        .await
        .expect("Failed to seed user")
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or_default().to_string())
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn happy_login_creates_usable_session() {
    let (app, state) = spawn_app().await;
    let alice_id = seed_user(&state, "alice", "Str0ng!Pass", false).await;

    let response = app
        .clone()
        .oneshot(login_request("alice", "Str0ng!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("login should set a session cookie");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["userId"], alice_id);

    let user = state.store.get_user_by_name("alice").await.unwrap().unwrap();
    assert_eq!(user.num_failed_login_attempts, 0);
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn login_accepts_form_encoded_bodies() {
    let (app, state) = spawn_app().await;
    seed_user(&state, "alice", "Str0ng!Pass", false).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=alice&password=Str0ng!Pass"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gate_rejects_requests_without_session() {
    let (app, _state) = spawn_app().await;

    for uri in ["/api/system/status", "/api/employees", "/api/me/profile"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri: {uri}");
    }
}

#[tokio::test]
async fn unknown_endpoint_is_404() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/frobnicate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_attempts_count_up_and_lock_the_account() {
    let (app, state) = spawn_app().await;
    let alice_id = seed_user(&state, "alice", "Str0ng!Pass", false).await;

    // Counter strictly increases per failed attempt.
    for expected in 1..=4 {
        let response = app
            .clone()
            .oneshot(login_request("alice", "wrong-password"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let user = state.store.get_user_by_id(alice_id).await.unwrap().unwrap();
        assert_eq!(user.num_failed_login_attempts, expected);
        assert_eq!(user.status, UserStatus::Active);
    }

    // Fifth failure crosses the seeded threshold.
    let response = app
        .clone()
        .oneshot(login_request("alice", "wrong-password"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let user = state.store.get_user_by_id(alice_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Locked);
    assert!(user.lock_until.is_some());

    // Even the correct password cannot get through the lock window, and the
    // attempt extends the window.
    let before = state
        .store
        .get_user_by_id(alice_id)
        .await
        .unwrap()
        .unwrap()
        .lock_until
        .unwrap();
    let response = app
        .clone()
        .oneshot(login_request("alice", "Str0ng!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let user = state.store.get_user_by_id(alice_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Locked);
    assert!(user.lock_until.unwrap() >= before);
    assert_eq!(user.num_failed_login_attempts, 6);
}

#[tokio::test]
async fn timed_lock_clears_after_the_window() {
    let (app, state) = spawn_app().await;
    let alice_id = seed_user(&state, "alice", "Str0ng!Pass", false).await;

    // Put the account into a timed lock whose window has already passed
    // (seeded lockout_duration is 30 minutes).
    state
        .store
        .lock_user(alice_id, Utc::now() - Duration::minutes(45))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(login_request("alice", "Str0ng!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let user = state.store.get_user_by_id(alice_id).await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Active);
    assert_eq!(user.num_failed_login_attempts, 0);
    assert!(user.lock_until.is_none());
}

#[tokio::test]
async fn permanent_lock_survives_authentication_attempts() {
    use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};

    let (app, state) = spawn_app().await;
    let alice_id = seed_user(&state, "alice", "Str0ng!Pass", false).await;

    // Administrative permanent lock: LOCKED with no window.
    let user = kadro::entities::users::Entity::find_by_id(alice_id)
        .one(&state.store.conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: kadro::entities::users::ActiveModel = user.into();
    active.status = Set(UserStatus::Locked);
    active.lock_until = Set(None);
    active.update(&state.store.conn).await.unwrap();

    // The correct password never gets through, and the lock never decays.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(login_request("alice", "Str0ng!Pass"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let user = state.store.get_user_by_id(alice_id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Locked);
        assert!(user.lock_until.is_none());
    }
}

#[tokio::test]
async fn first_login_flow_requires_token_attested_change() {
    let (app, state) = spawn_app().await;
    let bob_id = seed_user(&state, "bob", "TempPw0rd!", true).await;

    // Login succeeds credential-wise but defers to the mandatory change.
    let response = app
        .clone()
        .oneshot(login_request("bob", "TempPw0rd!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("remedial session cookie");
    let body = body_json(response).await;
    let token = body["data"]["tempToken"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["reason"], "First Login");
    assert!(token.len() >= 32);

    // The remedial session is not authenticated: the gate and the probe both
    // reject it.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A wrong token is rejected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/change-password")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({
                        "newPassword": "NewStr0ng!",
                        "confirmNewPassword": "NewStr0ng!",
                        "token": "0000000000000000000000000000000000000000000000000000000000000000",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The real token goes through.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/change-password")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({
                        "newPassword": "NewStr0ng!",
                        "confirmNewPassword": "NewStr0ng!",
                        "token": token,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bob = state.store.get_user_by_id(bob_id).await.unwrap().unwrap();
    assert!(!bob.is_first_login);
    assert!(bob.last_login_at.is_some());

    // The remedial session was destroyed with the change.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Old password no longer works; the new one logs in without a token.
    let response = app
        .clone()
        .oneshot(login_request("bob", "TempPw0rd!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(login_request("bob", "NewStr0ng!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["tempToken"].is_null());
}

#[tokio::test]
async fn seeded_admin_must_rotate_password() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(login_request("admin", ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["reason"], "First Login");
}

#[tokio::test]
async fn login_cycles_the_session_id() {
    let (app, state) = spawn_app().await;
    seed_user(&state, "alice", "Str0ng!Pass", false).await;
    seed_user(&state, "bob", "TempPw0rd!", true).await;

    // Obtain a session id from a remedial login.
    let response = app
        .clone()
        .oneshot(login_request("bob", "TempPw0rd!"))
        .await
        .unwrap();
    let presented = session_cookie(&response).unwrap();

    // Logging in while presenting that session must issue a different id.
    let mut request = login_request("alice", "Str0ng!Pass");
    request
        .headers_mut()
        .insert(header::COOKIE, presented.parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let issued = session_cookie(&response).unwrap();
    assert_ne!(issued, presented);

    // The presented session was destroyed outright.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(header::COOKIE, &presented)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (app, state) = spawn_app().await;
    seed_user(&state, "alice", "Str0ng!Pass", false).await;

    let response = app
        .clone()
        .oneshot(login_request("alice", "Str0ng!Pass"))
        .await
        .unwrap();
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logout is safe on an already-dead session.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn voluntary_change_requires_current_password_and_policy() {
    let (app, state) = spawn_app().await;
    seed_user(&state, "alice", "Str0ng!Pass", false).await;

    let response = app
        .clone()
        .oneshot(login_request("alice", "Str0ng!Pass"))
        .await
        .unwrap();
    let cookie = session_cookie(&response).unwrap();

    let change = |current: &str, new: &str, confirm: &str| {
        Request::builder()
            .method("PUT")
            .uri("/api/me/password")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, &cookie)
            .body(Body::from(
                serde_json::json!({
                    "currentPassword": current,
                    "newPassword": new,
                    "confirmNewPassword": confirm,
                })
                .to_string(),
            ))
            .unwrap()
    };

    // Wrong current password.
    let response = app
        .clone()
        .oneshot(change("wrong", "Another1!Pass", "Another1!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Confirmation mismatch.
    let response = app
        .clone()
        .oneshot(change("Str0ng!Pass", "Another1!Pass", "Different1!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Policy violation (too short).
    let response = app
        .clone()
        .oneshot(change("Str0ng!Pass", "Ab1!", "Ab1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid change.
    let response = app
        .clone()
        .oneshot(change("Str0ng!Pass", "Another1!Pass", "Another1!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(login_request("alice", "Another1!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn recently_used_passwords_are_banned() {
    let (_app, state) = spawn_app().await;
    seed_user(&state, "alice", "Hist0ry!Zero", false).await;

    // Rotate through three compliant passwords (seeded history_size is 3).
    for password in ["Hist0ry!One", "Hist0ry!Two", "Hist0ry!Three"] {
        state
            .auth
            .change_password_attested("alice", password, password)
            .await
            .expect("rotation should succeed");
    }

    // Each of the three most recent passwords is rejected without mutating
    // the user.
    let before = state.store.get_user_by_name("alice").await.unwrap().unwrap();
    for password in ["Hist0ry!One", "Hist0ry!Two", "Hist0ry!Three"] {
        let result = state
            .auth
            .change_password_attested("alice", password, password)
            .await;
        assert!(
            matches!(result, Err(kadro::services::AuthError::Validation(_))),
            "expected history ban for {password}"
        );
    }
    let after = state.store.get_user_by_name("alice").await.unwrap().unwrap();
    assert_eq!(before.password_hash, after.password_hash);

    // The original password has aged out of the consulted window.
    state
        .auth
        .change_password_attested("alice", "Hist0ry!Zero", "Hist0ry!Zero")
        .await
        .expect("password outside the history window is allowed again");
}

#[tokio::test]
async fn expired_password_defers_to_mandatory_change() {
    let (app, state) = spawn_app().await;
    let hash = state.hasher.hash("Str0ng!Pass").unwrap();
    state
        .store
        .insert_user(NewUser {
            name: "carol".to_string(),
            password_hash: hash,
            status: UserStatus::Active,
            user_type: UserType::Normal,
            is_first_login: false,
            password_expiry_date: Some(Utc::now().date_naive() - Duration::days(1)),
            valid_until: None,
            created_by: None,
        })
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(login_request("carol", "Str0ng!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["reason"], "Password Expired");
    let token = body["data"]["tempToken"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/change-password")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from(
                    serde_json::json!({
                        "newPassword": "Fresh1!Password",
                        "confirmNewPassword": "Fresh1!Password",
                        "token": token,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The expiry is cleared by the rotation; the next login is plain.
    let user = state.store.get_user_by_name("carol").await.unwrap().unwrap();
    assert!(user.password_expiry_date.is_none());

    let response = app
        .clone()
        .oneshot(login_request("carol", "Fresh1!Password"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["tempToken"].is_null());
}

#[tokio::test]
async fn deactivated_users_get_generic_rejection() {
    let (app, state) = spawn_app().await;
    let alice_id = seed_user(&state, "alice", "Str0ng!Pass", false).await;
    state.store.deactivate_user(alice_id, None).await.unwrap();

    let response = app
        .clone()
        .oneshot(login_request("alice", "Str0ng!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Identical body to an unknown user; no enumeration signal.
    let deactivated_body = body_json(response).await;
    let response = app
        .clone()
        .oneshot(login_request("nobody", "Str0ng!Pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(deactivated_body, body_json(response).await);
}
