//! Data Transfer Objects

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::application::ports::{SegmentSpec, SpeakerSpec};
use crate::application::{JobStatusResponse, SubmitJobResponse};
use crate::domain::SynthesisSettings;

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Synthesis DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub segments: Vec<SegmentSpec>,
    #[serde(default)]
    pub settings: SynthesisSettings,
}

#[derive(Debug, Deserialize)]
pub struct PodcastRequest {
    pub script: String,
    pub speakers: BTreeMap<String, SpeakerSpec>,
    #[serde(default)]
    pub settings: SynthesisSettings,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponseDto {
    pub job_id: String,
    pub kind: String,
}

impl From<SubmitJobResponse> for SubmitJobResponseDto {
    fn from(r: SubmitJobResponse) -> Self {
        Self {
            job_id: r.job_id,
            kind: r.kind.as_str().to_string(),
        }
    }
}

// ============================================================================
// Job DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct JobStatusRequest {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProgressDto {
    pub value: f64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusDto {
    pub job_id: String,
    pub kind: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<JobStatusResponse> for JobStatusDto {
    fn from(r: JobStatusResponse) -> Self {
        Self {
            job_id: r.job_id,
            kind: r.kind.as_str().to_string(),
            state: r.state.as_str().to_string(),
            progress: r.progress.map(|p| ProgressDto {
                value: p.value,
                message: p.message,
            }),
            error: r.error,
            duration_ms: r.duration_ms,
            created_at: r.created_at.to_rfc3339(),
            completed_at: r.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}
