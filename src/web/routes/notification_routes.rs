use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::models::NotificationRecord;
use crate::web::{AppError, AppState};

// Mounted under /api
pub fn create_notification_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notify/test", post(send_test))
        .route(
            "/notifications",
            get(list_notifications).delete(clear_notifications),
        )
}

async fn send_test(State(app_state): State<Arc<AppState>>) -> Json<Value> {
    let outcome = app_state.monitor.send_test().await;
    Json(json!({ "success": outcome.delivered, "message": outcome.message }))
}

async fn list_notifications(
    State(app_state): State<Arc<AppState>>,
) -> Json<Vec<NotificationRecord>> {
    Json(app_state.monitor.history())
}

async fn clear_notifications(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    app_state.monitor.clear_history()?;
    Ok(Json(json!({ "success": true, "message": "通知记录已清除" })))
}
