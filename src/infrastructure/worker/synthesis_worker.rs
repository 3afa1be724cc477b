//! Synthesis Worker - Background Synthesis Job Processor
//!
//! 任务共享同一个 ttsEngine 实例并重置其监听器，因此严格串行执行（FIFO）

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::application::commands::handlers::RunSynthesisJobHandler;
use crate::application::error::ApplicationError;
use crate::application::ports::{JobManagerPort, JobOutput, ProgressSink};
use crate::infrastructure::events::{EventPublisher, JobProgressSink};

/// 合成 Worker
///
/// 后台任务处理器，从队列消费 job_id 并执行合成
pub struct SynthesisWorker {
    queue_receiver: mpsc::Receiver<String>,
    job_manager: Arc<dyn JobManagerPort>,
    handler: Arc<RunSynthesisJobHandler>,
    event_publisher: Arc<EventPublisher>,
}

impl SynthesisWorker {
    pub fn new(
        queue_receiver: mpsc::Receiver<String>,
        job_manager: Arc<dyn JobManagerPort>,
        handler: Arc<RunSynthesisJobHandler>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            queue_receiver,
            job_manager,
            handler,
            event_publisher,
        }
    }

    /// 启动 Worker，队列关闭后返回
    pub async fn run(mut self) {
        tracing::info!("SynthesisWorker started");

        while let Some(job_id) = self.queue_receiver.recv().await {
            self.process_job(&job_id).await;
        }

        tracing::info!("SynthesisWorker stopped");
    }

    /// 处理单个任务
    async fn process_job(&self, job_id: &str) {
        let request = match self.job_manager.take_request(job_id) {
            Some(r) => r,
            None => {
                tracing::warn!(job_id = %job_id, "Job request not found, skipping");
                return;
            }
        };

        let kind = request.kind();
        tracing::info!(job_id = %job_id, kind = ?kind, "Job started");
        let started = Instant::now();

        let sink: Arc<dyn ProgressSink> = Arc::new(JobProgressSink::new(
            job_id,
            self.job_manager.clone(),
            self.event_publisher.clone(),
        ));

        let result = self.handler.handle(request, sink).await;
        self.finish(job_id, result, started);
        self.event_publisher.unregister_job(job_id);
    }

    fn finish(
        &self,
        job_id: &str,
        result: Result<JobOutput, ApplicationError>,
        started: Instant,
    ) {
        match result {
            Ok(output) => {
                let duration_ms = output.duration_ms();
                if let Err(e) = self.job_manager.set_completed(job_id, output) {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to store job output");
                    return;
                }
                self.event_publisher.publish_job_done(job_id, duration_ms);
                tracing::info!(
                    job_id = %job_id,
                    duration_ms = duration_ms,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
            }
            Err(e) => {
                let message = e.user_message();
                if let Err(e) = self.job_manager.set_failed(job_id, message.clone()) {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to update job state");
                }
                self.event_publisher.publish_job_failed(job_id, &message);
                tracing::warn!(job_id = %job_id, error = %message, "Job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::testing::{tone, ScriptedRegistry};
    use crate::application::pipeline::{ReferencePreparer, SynthesisOrchestrator};
    use crate::application::ports::{
        AudioDecoderPort, AudioIoError, JobRequest, JobState, ReferenceFetcherPort, SegmentSpec,
    };
    use crate::domain::{SynthesisSettings, Tensor, Value};
    use crate::infrastructure::memory::InMemoryJobManager;
    use async_trait::async_trait;

    struct BytesFetcher;

    #[async_trait]
    impl ReferenceFetcherPort for BytesFetcher {
        async fn fetch(&self, _source: &str) -> Result<Vec<u8>, AudioIoError> {
            Ok(vec![0u8; 4])
        }
    }

    struct ToneDecoder;

    #[async_trait]
    impl AudioDecoderPort for ToneDecoder {
        async fn decode(&self, _data: Vec<u8>, _target_rate: u32) -> Result<Tensor, AudioIoError> {
            Ok(Tensor::waveform(tone(4800)))
        }
    }

    fn batch(gen_text: &str) -> JobRequest {
        JobRequest::Batch {
            segments: vec![SegmentSpec {
                ref_audio_url: "/refs/a.wav".to_string(),
                ref_text: Some("reference".to_string()),
                gen_text: gen_text.to_string(),
            }],
            settings: SynthesisSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_worker_runs_jobs_in_order() {
        let registry = Arc::new(ScriptedRegistry::default());
        let preparer = ReferencePreparer::new(
            Arc::new(BytesFetcher),
            Arc::new(ToneDecoder),
            registry.clone(),
            10_000,
        );
        let handler = Arc::new(RunSynthesisJobHandler::new(
            SynthesisOrchestrator::new(registry.clone(), Value::Null),
            preparer,
        ));

        let (tx, rx) = mpsc::channel(10);
        let jobs = InMemoryJobManager::new(tx).arc();
        let publisher = EventPublisher::new().arc();

        let ok_id = jobs.submit(batch("Hello there.")).unwrap();
        let failed_id = jobs.submit(batch("FAIL here.")).unwrap();
        let mut events = publisher.subscribe(&failed_id);

        let worker = SynthesisWorker::new(rx, jobs.clone(), handler, publisher.clone());
        let handle = tokio::spawn(worker.run());

        // 等待第二个任务的终止事件
        loop {
            let event = events.recv().await.unwrap();
            if event.is_terminal() {
                break;
            }
        }

        let ok = jobs.get_job(&ok_id).unwrap();
        assert_eq!(ok.state, JobState::Done);
        assert_eq!(ok.output.unwrap().samples.len(), registry.tts().output_len());

        let failed = jobs.get_job(&failed_id).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.error_message.unwrap().contains("synthetic failure"));
        assert_eq!(failed.progress.unwrap().value, 0.0);

        handle.abort();
    }
}
