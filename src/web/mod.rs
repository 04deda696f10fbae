use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::db::JsonStore;
use crate::monitoring::MonitorService;
use crate::server::config::ServerConfig;
use crate::web::{middleware::auth, routes::*};

pub use error::AppError;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub const SESSION_COOKIE: &str = "token";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonStore>,
    pub monitor: Arc<MonitorService>,
    pub config: Arc<ServerConfig>,
}

pub(crate) fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub(crate) fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(
    store: Arc<JsonStore>,
    monitor: Arc<MonitorService>,
    config: Arc<ServerConfig>,
) -> Router {
    let app_state = Arc::new(AppState {
        store,
        monitor,
        config,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let protected = auth_routes::create_protected_router()
        .merge(config_routes::create_config_router())
        .merge(monitor_routes::create_monitor_router())
        .merge(notification_routes::create_notification_router())
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth));

    let api = auth_routes::create_public_router()
        .route("/health", get(health_check_handler))
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .with_state(app_state)
}
