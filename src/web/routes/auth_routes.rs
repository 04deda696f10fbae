use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::services::auth_service;
use crate::web::models::{ChangePasswordRequest, LoginRequest};
use crate::web::{clear_session, session_cookie, AppError, AppState};

pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new().route("/change_password", post(change_password))
}

#[axum::debug_handler]
async fn login(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let token = auth_service::login_user(
        &app_state.store,
        &payload.username,
        &payload.password,
        &app_state.config.jwt_secret,
    )?;
    info!(username = %payload.username, "User logged in.");

    let jar = jar.add(session_cookie(token, app_state.config.secure_cookie));
    Ok((
        jar,
        Json(json!({ "success": true, "message": "登录成功", "redirect": "/" })),
    ))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (
        clear_session(jar),
        Json(json!({ "success": true, "message": "已成功退出" })),
    )
}

#[axum::debug_handler]
async fn change_password(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    auth_service::change_password(
        &app_state.store,
        &payload.old_password,
        &payload.new_password,
    )?;
    Ok((
        clear_session(jar),
        Json(json!({
            "success": true,
            "message": "密码修改成功，请重新登录",
            "redirect": "/login"
        })),
    ))
}
