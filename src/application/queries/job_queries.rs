//! Job Queries - 任务查询

use chrono::{DateTime, Utc};

use crate::application::ports::{JobKind, JobState};
use crate::domain::Progress;

/// 查询任务状态
#[derive(Debug, Clone)]
pub struct GetJobStatusQuery {
    pub job_id: String,
}

/// 任务状态响应
#[derive(Debug, Clone)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 获取合成音频
#[derive(Debug, Clone)]
pub struct GetJobAudioQuery {
    pub job_id: String,
}

/// 合成音频响应
#[derive(Debug, Clone)]
pub struct GetJobAudioResponse {
    pub audio_data: Vec<u8>,
    pub content_type: String,
}
