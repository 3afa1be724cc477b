//! Job Handlers - 任务状态与合成音频

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::application::{GetJobAudioQuery, GetJobStatusQuery};
use crate::infrastructure::http::dto::{ApiResponse, JobStatusDto, JobStatusRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobStatusRequest>,
) -> Result<Json<ApiResponse<JobStatusDto>>, ApiError> {
    let result = state
        .get_job_status_handler
        .handle(GetJobStatusQuery { job_id: req.job_id })?;

    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn job_audio(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let result = state
        .get_job_audio_handler
        .handle(GetJobAudioQuery { job_id: job_id.clone() })?;

    let disposition = format!("attachment; filename=\"{}.wav\"", job_id);
    Ok((
        [
            (header::CONTENT_TYPE, result.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.audio_data,
    )
        .into_response())
}
