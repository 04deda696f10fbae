use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::models::MonitorStatus;
use crate::web::models::{CheckStorageRequest, MonitorStatusRequest, StorageStatusResponse};
use crate::web::{AppError, AppState};

// Mounted under /api
pub fn create_monitor_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/monitor_status", get(get_monitor_status).post(set_monitor_status))
        .route("/storage_status", get(storage_status))
        .route("/storage_list", get(storage_status))
        .route("/check_storage", post(check_storage))
}

async fn get_monitor_status(State(app_state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(app_state.monitor.status())
}

#[axum::debug_handler]
async fn set_monitor_status(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<MonitorStatusRequest>,
) -> Result<Json<Value>, AppError> {
    match payload.is_monitoring {
        Some(true) => {
            let (Some(interval), Some(start_time)) = (payload.interval, payload.start_time) else {
                return Err(AppError::InvalidInput("启动监控缺少参数".to_string()));
            };
            let status = app_state.monitor.start(interval, start_time).await?;
            Ok(Json(json!({
                "success": true,
                "message": "监控已在后台启动",
                "status": status
            })))
        }
        Some(false) => {
            let status = app_state.monitor.stop().await;
            Ok(Json(json!({
                "success": true,
                "message": "监控已在后台停止",
                "status": status
            })))
        }
        None => Err(AppError::InvalidInput("请求无效".to_string())),
    }
}

async fn storage_status(State(app_state): State<Arc<AppState>>) -> Json<StorageStatusResponse> {
    let summary = app_state.monitor.probe_once().await;
    Json(StorageStatusResponse::from(&summary))
}

#[axum::debug_handler]
async fn check_storage(
    State(app_state): State<Arc<AppState>>,
    payload: Option<Json<CheckStorageRequest>>,
) -> Json<Value> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let summary = app_state
        .monitor
        .manual_check(request.storage_path, request.api_key)
        .await;
    Json(json!({
        "success": summary.success,
        "message": "检查完成",
        "data": StorageStatusResponse::from(&summary)
    }))
}
