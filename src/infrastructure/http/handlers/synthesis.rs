//! Synthesis Handlers - 提交批量/播客合成任务

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{SubmitPodcastCommand, SubmitSynthesisCommand};
use crate::infrastructure::http::dto::{
    ApiResponse, PodcastRequest, SubmitJobResponseDto, SynthesizeRequest,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<Json<ApiResponse<SubmitJobResponseDto>>, ApiError> {
    let cmd = SubmitSynthesisCommand {
        segments: req.segments,
        settings: req.settings,
    };

    let result = state.submit_synthesis_handler.handle(cmd)?;
    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn podcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PodcastRequest>,
) -> Result<Json<ApiResponse<SubmitJobResponseDto>>, ApiError> {
    let cmd = SubmitPodcastCommand {
        script: req.script,
        speakers: req.speakers,
        settings: req.settings,
    };

    let result = state.submit_podcast_handler.handle(cmd)?;
    Ok(Json(ApiResponse::success(result.into())))
}
