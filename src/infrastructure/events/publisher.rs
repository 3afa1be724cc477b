//! Event Publisher Implementation
//!
//! WebSocket 事件推送实现

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::JobState;
use crate::domain::Progress;

/// WebSocket 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WsEvent {
    /// 合成进度（0..=100）
    Progress {
        job_id: String,
        value: f64,
        message: String,
    },
    /// 任务状态变更
    JobStateChanged {
        job_id: String,
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl WsEvent {
    pub fn is_terminal(&self) -> bool {
        match self {
            WsEvent::JobStateChanged { state, .. } => {
                state == JobState::Done.as_str() || state == JobState::Failed.as_str()
            }
            WsEvent::Progress { .. } => false,
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    /// job_id -> broadcast sender
    job_channels: DashMap<String, broadcast::Sender<WsEvent>>,
    capacity: usize,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            job_channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅任务事件（通道不存在时创建）
    pub fn subscribe(&self, job_id: &str) -> broadcast::Receiver<WsEvent> {
        self.job_channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 任务结束后释放通道
    pub fn unregister_job(&self, job_id: &str) {
        self.job_channels.remove(job_id);
    }

    /// 发布进度事件
    pub fn publish_progress(&self, job_id: &str, progress: &Progress) {
        self.publish(
            job_id,
            WsEvent::Progress {
                job_id: job_id.to_string(),
                value: progress.value,
                message: progress.message.clone(),
            },
        );
    }

    /// 发布运行中状态（带块序号）
    pub fn publish_running(&self, job_id: &str, current: usize, total: usize) {
        self.publish(
            job_id,
            WsEvent::JobStateChanged {
                job_id: job_id.to_string(),
                state: JobState::Running.as_str().to_string(),
                current: Some(current),
                total: Some(total),
                duration_ms: None,
                error: None,
            },
        );
    }

    /// 发布状态变更
    pub fn publish_state(&self, job_id: &str, state: JobState) {
        self.publish(
            job_id,
            WsEvent::JobStateChanged {
                job_id: job_id.to_string(),
                state: state.as_str().to_string(),
                current: None,
                total: None,
                duration_ms: None,
                error: None,
            },
        );
    }

    /// 发布任务完成事件（带时长）
    pub fn publish_job_done(&self, job_id: &str, duration_ms: u64) {
        self.publish(
            job_id,
            WsEvent::JobStateChanged {
                job_id: job_id.to_string(),
                state: JobState::Done.as_str().to_string(),
                current: None,
                total: None,
                duration_ms: Some(duration_ms),
                error: None,
            },
        );
    }

    /// 发布任务失败事件
    pub fn publish_job_failed(&self, job_id: &str, error: &str) {
        self.publish(
            job_id,
            WsEvent::JobStateChanged {
                job_id: job_id.to_string(),
                state: JobState::Failed.as_str().to_string(),
                current: None,
                total: None,
                duration_ms: None,
                error: Some(error.to_string()),
            },
        );
    }

    /// 发布事件到指定任务
    fn publish(&self, job_id: &str, event: WsEvent) {
        if let Some(sender) = self.job_channels.get(job_id) {
            if let Err(e) = sender.send(event) {
                tracing::debug!(
                    job_id = %job_id,
                    error = %e,
                    "Failed to publish event (no receivers)"
                );
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
