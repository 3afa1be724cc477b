//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    SubmitPodcastHandler, SubmitSynthesisHandler,
    // Query handlers
    GetJobAudioHandler, GetJobStatusHandler,
    // Ports
    AudioEncoderPort, JobManagerPort,
};
use crate::infrastructure::events::EventPublisher;

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub job_manager: Arc<dyn JobManagerPort>,
    pub event_publisher: Arc<EventPublisher>,

    // ========== Command Handlers ==========
    pub submit_synthesis_handler: SubmitSynthesisHandler,
    pub submit_podcast_handler: SubmitPodcastHandler,

    // ========== Query Handlers ==========
    pub get_job_status_handler: GetJobStatusHandler,
    pub get_job_audio_handler: GetJobAudioHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        job_manager: Arc<dyn JobManagerPort>,
        audio_encoder: Arc<dyn AudioEncoderPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            // Ports
            job_manager: job_manager.clone(),
            event_publisher,

            // Command handlers
            submit_synthesis_handler: SubmitSynthesisHandler::new(job_manager.clone()),
            submit_podcast_handler: SubmitPodcastHandler::new(job_manager.clone()),

            // Query handlers
            get_job_status_handler: GetJobStatusHandler::new(job_manager.clone()),
            get_job_audio_handler: GetJobAudioHandler::new(job_manager, audio_encoder),
        }
    }
}
