//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                 GET   健康检查
//! - /api/synthesize           POST  提交批量合成任务
//! - /api/podcast              POST  提交播客合成任务
//! - /api/jobs/status          POST  查询任务状态
//! - /api/jobs/{id}/audio      GET   下载合成音频（WAV）
//! - /ws/jobs/{id}             WS    任务进度与状态事件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/jobs/:job_id", get(handlers::job_websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/synthesize", post(handlers::synthesize))
        .route("/podcast", post(handlers::podcast))
        .nest("/jobs", job_routes())
}

/// Job 路由
fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", post(handlers::job_status))
        .route("/:job_id/audio", get(handlers::job_audio))
}
