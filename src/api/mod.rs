use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, PasswordHasher, PasswordPolicy, SeaOrmAuthService,
};

mod account;
pub mod auth;
mod employees;
mod error;
mod extract;
mod observability;
mod system;
mod types;
mod users;

pub use error::ApiError;
pub use extract::BodyPayload;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub auth: Arc<dyn AuthService>,

    pub policy: Arc<PasswordPolicy>,

    pub hasher: PasswordHasher,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

/// Connects the store, loads the password-settings catalogue once, and wires
/// the authentication engine. A broken policy catalogue aborts boot here.
pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;

    let settings = store.load_password_settings().await?;
    let policy = Arc::new(PasswordPolicy::from_settings(&settings)?);
    let hasher = PasswordHasher::new(&config.security)?;

    let auth: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        hasher.clone(),
        policy.clone(),
    ));

    Ok(Arc::new(AppState {
        config,
        store,
        auth,
        policy,
        hasher,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.config.server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session.inactivity_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/session", get(auth::session_probe))
        .route("/health", get(system::health))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .fallback(unknown_endpoint)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::track_requests))
}

fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me/profile", get(account::get_profile))
        .route("/me/password", put(account::change_own_password))
        .route(
            "/employees",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route(
            "/employees/{id}",
            get(employees::get_employee).put(employees::update_employee),
        )
        .route(
            "/employees/{id}/terminate",
            post(employees::terminate_employee),
        )
        .route("/users/{id}/deactivate", post(users::deactivate_user))
        .route("/users/{id}/unlock", post(users::unlock_user))
        .route("/system/status", get(system::get_status))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn(auth::session_gate))
}

async fn unknown_endpoint() -> ApiError {
    ApiError::NotFound("Unknown endpoint".to_string())
}
