//! Synthesis Command Handlers - 校验请求并放入任务队列

use std::sync::Arc;

use crate::application::commands::synthesis_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{JobManagerPort, JobRequest};
use crate::domain::SynthesisSettings;

fn validate_settings(settings: &SynthesisSettings) -> Result<(), ApplicationError> {
    settings.validate().map_err(ApplicationError::validation)
}

/// SubmitSynthesis Handler - 提交批量合成任务
pub struct SubmitSynthesisHandler {
    job_manager: Arc<dyn JobManagerPort>,
}

impl SubmitSynthesisHandler {
    pub fn new(job_manager: Arc<dyn JobManagerPort>) -> Self {
        Self { job_manager }
    }

    pub fn handle(&self, cmd: SubmitSynthesisCommand) -> Result<SubmitJobResponse, ApplicationError> {
        if cmd.segments.is_empty() {
            return Err(ApplicationError::validation("segments must not be empty"));
        }
        for (index, segment) in cmd.segments.iter().enumerate() {
            if segment.ref_audio_url.trim().is_empty() {
                return Err(ApplicationError::validation(format!(
                    "segments[{}].ref_audio_url is empty",
                    index
                )));
            }
            if segment.gen_text.trim().is_empty() {
                return Err(ApplicationError::validation(format!(
                    "segments[{}].gen_text is empty",
                    index
                )));
            }
        }
        validate_settings(&cmd.settings)?;

        let count = cmd.segments.len();
        let request = JobRequest::Batch {
            segments: cmd.segments,
            settings: cmd.settings,
        };
        let kind = request.kind();
        let job_id = self.job_manager.submit(request)?;

        tracing::info!(job_id = %job_id, segments = count, "Synthesis job submitted");
        Ok(SubmitJobResponse { job_id, kind })
    }
}

/// SubmitPodcast Handler - 提交播客合成任务
pub struct SubmitPodcastHandler {
    job_manager: Arc<dyn JobManagerPort>,
}

impl SubmitPodcastHandler {
    pub fn new(job_manager: Arc<dyn JobManagerPort>) -> Self {
        Self { job_manager }
    }

    pub fn handle(&self, cmd: SubmitPodcastCommand) -> Result<SubmitJobResponse, ApplicationError> {
        if cmd.script.trim().is_empty() {
            return Err(ApplicationError::validation("script must not be empty"));
        }
        if cmd.speakers.is_empty() {
            return Err(ApplicationError::validation("speakers must not be empty"));
        }
        validate_settings(&cmd.settings)?;

        let speakers = cmd.speakers.len();
        let request = JobRequest::Podcast {
            script: cmd.script,
            speakers: cmd.speakers,
            settings: cmd.settings,
        };
        let kind = request.kind();
        let job_id = self.job_manager.submit(request)?;

        tracing::info!(job_id = %job_id, speakers = speakers, "Podcast job submitted");
        Ok(SubmitJobResponse { job_id, kind })
    }
}
