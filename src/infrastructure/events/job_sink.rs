//! Job Progress Sink - 单个任务的进度接收方
//!
//! 进度写入任务存储并推送给 WebSocket 订阅者；
//! 终止状态由 worker 在保存产物或错误后发布

use std::sync::Arc;

use super::EventPublisher;
use crate::application::ports::{JobManagerPort, JobState, ProgressSink};
use crate::domain::{Progress, RunState};

pub struct JobProgressSink {
    job_id: String,
    job_manager: Arc<dyn JobManagerPort>,
    publisher: Arc<EventPublisher>,
}

impl JobProgressSink {
    pub fn new(
        job_id: impl Into<String>,
        job_manager: Arc<dyn JobManagerPort>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_manager,
            publisher,
        }
    }
}

impl ProgressSink for JobProgressSink {
    fn emit(&self, event: &str, progress: Progress) {
        tracing::trace!(
            job_id = %self.job_id,
            event = event,
            value = progress.value,
            message = %progress.message,
            "Progress"
        );
        self.publisher.publish_progress(&self.job_id, &progress);
        if let Err(e) = self.job_manager.set_progress(&self.job_id, progress) {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record progress");
        }
    }

    fn state_changed(&self, state: RunState) {
        if state.is_terminal() {
            return;
        }
        let job_state = JobState::from(state);
        if let Err(e) = self.job_manager.set_state(&self.job_id, job_state) {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record job state");
            return;
        }
        match state {
            RunState::Running { current, total } => {
                self.publisher.publish_running(&self.job_id, current, total)
            }
            _ => self.publisher.publish_state(&self.job_id, job_state),
        }
    }
}
