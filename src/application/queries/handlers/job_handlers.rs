//! Job Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{AudioEncoderPort, JobManagerPort, JobState};
use crate::application::queries::job_queries::*;

/// GetJobStatus Handler - 查询任务状态与最近一次进度
pub struct GetJobStatusHandler {
    job_manager: Arc<dyn JobManagerPort>,
}

impl GetJobStatusHandler {
    pub fn new(job_manager: Arc<dyn JobManagerPort>) -> Self {
        Self { job_manager }
    }

    pub fn handle(&self, query: GetJobStatusQuery) -> Result<JobStatusResponse, ApplicationError> {
        let job = self
            .job_manager
            .get_job(&query.job_id)
            .ok_or_else(|| ApplicationError::not_found("Job", &query.job_id))?;

        Ok(JobStatusResponse {
            duration_ms: job.output.as_ref().map(|o| o.duration_ms()),
            job_id: job.job_id,
            kind: job.kind,
            state: job.state,
            progress: job.progress,
            error: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        })
    }
}

/// GetJobAudio Handler - 编码已完成任务的合成产物
pub struct GetJobAudioHandler {
    job_manager: Arc<dyn JobManagerPort>,
    encoder: Arc<dyn AudioEncoderPort>,
}

impl GetJobAudioHandler {
    pub fn new(job_manager: Arc<dyn JobManagerPort>, encoder: Arc<dyn AudioEncoderPort>) -> Self {
        Self {
            job_manager,
            encoder,
        }
    }

    pub fn handle(&self, query: GetJobAudioQuery) -> Result<GetJobAudioResponse, ApplicationError> {
        let job = self
            .job_manager
            .get_job(&query.job_id)
            .ok_or_else(|| ApplicationError::not_found("Job", &query.job_id))?;

        let output = match (job.state, job.output) {
            (JobState::Done, Some(output)) => output,
            (state, _) => {
                return Err(ApplicationError::validation(format!(
                    "Job {} has no audio (state: {})",
                    query.job_id,
                    state.as_str()
                )))
            }
        };

        let audio_data = self
            .encoder
            .encode(&output.samples, output.sample_rate)
            .map_err(|e| ApplicationError::internal(e.to_string()))?;

        tracing::debug!(
            job_id = %query.job_id,
            bytes = audio_data.len(),
            duration_ms = output.duration_ms(),
            "Job audio encoded"
        );

        Ok(GetJobAudioResponse {
            audio_data,
            content_type: self.encoder.content_type().to_string(),
        })
    }
}
