//! Job Manager Port - 合成任务管理
//!
//! 定义任务管理的抽象接口，具体实现在 infrastructure/memory 层

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Progress, RunState, SynthesisSettings};

/// Job Manager 错误
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job queue is full")]
    QueueFull,

    #[error("Job queue is closed")]
    QueueClosed,
}

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Batch,
    Podcast,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Batch => "batch",
            JobKind::Podcast => "podcast",
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Chunking,
    Running,
    Stitching,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Chunking => "chunking",
            JobState::Running => "running",
            JobState::Stitching => "stitching",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl From<RunState> for JobState {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Idle => JobState::Pending,
            RunState::Chunking => JobState::Chunking,
            RunState::Running { .. } => JobState::Running,
            RunState::Stitching => JobState::Stitching,
            RunState::Done => JobState::Done,
            RunState::Failed => JobState::Failed,
        }
    }
}

/// 一段合成输入（参考音频以 URL 或本地路径给出）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub ref_audio_url: String,
    /// 为空时由转写模型生成
    #[serde(default)]
    pub ref_text: Option<String>,
    pub gen_text: String,
}

/// 播客说话人参考数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSpec {
    pub ref_audio_url: String,
    #[serde(default)]
    pub ref_text: Option<String>,
}

/// 任务请求
#[derive(Debug, Clone)]
pub enum JobRequest {
    Batch {
        segments: Vec<SegmentSpec>,
        settings: SynthesisSettings,
    },
    Podcast {
        script: String,
        speakers: BTreeMap<String, SpeakerSpec>,
        settings: SynthesisSettings,
    },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Batch { .. } => JobKind::Batch,
            JobRequest::Podcast { .. } => JobKind::Podcast,
        }
    }
}

/// 合成产物
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl JobOutput {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// 合成任务
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: Option<Progress>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub output: Option<JobOutput>,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            kind,
            state: JobState::Pending,
            progress: None,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            output: None,
        }
    }
}

/// Job Manager Port
///
/// 管理合成任务的生命周期，所有状态存储在内存中
pub trait JobManagerPort: Send + Sync {
    /// 登记任务并放入队列，返回 job_id
    fn submit(&self, request: JobRequest) -> Result<String, JobError>;

    /// 取出任务请求（每个任务只能取一次）
    fn take_request(&self, job_id: &str) -> Option<JobRequest>;

    fn get_job(&self, job_id: &str) -> Option<Job>;

    fn set_state(&self, job_id: &str, state: JobState) -> Result<(), JobError>;

    fn set_progress(&self, job_id: &str, progress: Progress) -> Result<(), JobError>;

    /// 设置任务失败并记录错误
    fn set_failed(&self, job_id: &str, error: String) -> Result<(), JobError>;

    /// 设置任务完成并保存产物
    fn set_completed(&self, job_id: &str, output: JobOutput) -> Result<(), JobError>;
}
