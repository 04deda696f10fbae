use axum::{extract::State, routing::get, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::db::models::PASSWORD_KEY;
use crate::services::auth_service;
use crate::web::{clear_session, AppError, AppState};

// Mounted under /api
pub fn create_config_router() -> Router<Arc<AppState>> {
    Router::new().route("/config", get(get_config).post(update_config))
}

#[axum::debug_handler]
async fn get_config(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(Json(app_state.store.settings().to_public_json()?))
}

/// Merges the posted keys into the stored settings. A non-empty `password`
/// is hashed separately and ends the current session.
#[axum::debug_handler]
async fn update_config(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(patch): Json<Map<String, Value>>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let new_password = patch
        .get(PASSWORD_KEY)
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let mut settings = app_state.store.settings();
    settings
        .merge(patch)
        .map_err(|e| AppError::InvalidInput(format!("配置格式无效: {e}")))?;
    app_state.store.save_settings(&settings)?;
    info!("Settings updated.");

    match new_password {
        Some(password) => {
            auth_service::set_password(&app_state.store, &password)?;
            Ok((
                clear_session(jar),
                Json(json!({
                    "success": true,
                    "message": "配置和密码均已更新...",
                    "redirect": "/login"
                })),
            ))
        }
        None => Ok((
            jar,
            Json(json!({ "success": true, "message": "配置保存成功" })),
        )),
    }
}
