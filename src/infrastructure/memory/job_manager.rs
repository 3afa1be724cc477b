//! In-Memory Job Manager Implementation

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::application::ports::{Job, JobError, JobManagerPort, JobOutput, JobRequest, JobState};
use crate::domain::Progress;

/// 已结束任务（含合成产物）的保留策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRetention {
    /// 结束后保留时长（秒）
    pub ttl_secs: u64,
    /// 最多保留的已结束任务数，超出时先淘汰最早结束的
    pub max_finished: usize,
}

impl Default for JobRetention {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_finished: 64,
        }
    }
}

/// 内存任务管理器
pub struct InMemoryJobManager {
    /// job_id -> Job
    jobs: DashMap<String, Job>,
    /// job_id -> 尚未被 worker 取走的请求
    requests: DashMap<String, JobRequest>,
    /// 任务队列发送端
    queue_sender: mpsc::Sender<String>,
    retention: JobRetention,
}

impl InMemoryJobManager {
    pub fn new(queue_sender: mpsc::Sender<String>) -> Self {
        Self {
            jobs: DashMap::new(),
            requests: DashMap::new(),
            queue_sender,
            retention: JobRetention::default(),
        }
    }

    pub fn with_retention(mut self, retention: JobRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 淘汰过期或超出容量的已结束任务，返回淘汰数量
    ///
    /// 未结束的任务不受影响
    pub fn evict_finished(&self, now: DateTime<Utc>) -> usize {
        let ttl = i64::try_from(self.retention.ttl_secs).unwrap_or(i64::MAX);

        let mut finished: Vec<(String, DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter(|entry| entry.state.is_terminal())
            .filter_map(|entry| entry.completed_at.map(|at| (entry.key().clone(), at)))
            .collect();
        finished.sort_by_key(|(_, at)| *at);

        let overflow = finished.len().saturating_sub(self.retention.max_finished);
        let mut evicted = 0;
        for (index, (job_id, completed_at)) in finished.iter().enumerate() {
            let expired = (now - *completed_at).num_seconds() >= ttl;
            if (index < overflow || expired) && self.jobs.remove(job_id).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(evicted = evicted, remaining = self.jobs.len(), "Finished jobs evicted");
        }
        evicted
    }

    /// 定期按 TTL 清理（空闲时也会释放产物）
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.evict_finished(Utc::now());
            }
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobManagerPort for InMemoryJobManager {
    fn submit(&self, request: JobRequest) -> Result<String, JobError> {
        let job = Job::new(request.kind());
        let job_id = job.job_id.clone();

        self.jobs.insert(job_id.clone(), job);
        self.requests.insert(job_id.clone(), request);

        // 发送到队列，失败时撤销登记
        if let Err(e) = self.queue_sender.try_send(job_id.clone()) {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to enqueue job");
            self.jobs.remove(&job_id);
            self.requests.remove(&job_id);
            return Err(match e {
                TrySendError::Full(_) => JobError::QueueFull,
                TrySendError::Closed(_) => JobError::QueueClosed,
            });
        }

        tracing::debug!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    fn take_request(&self, job_id: &str) -> Option<JobRequest> {
        self.requests.remove(job_id).map(|(_, request)| request)
    }

    fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    fn set_state(&self, job_id: &str, state: JobState) -> Result<(), JobError> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let old_state = job.state;
        job.state = state;

        if state.is_terminal() {
            job.completed_at = Some(Utc::now());
        }

        tracing::debug!(
            job_id = %job_id,
            old_state = ?old_state,
            new_state = ?state,
            "Job state changed"
        );
        Ok(())
    }

    fn set_progress(&self, job_id: &str, progress: Progress) -> Result<(), JobError> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.progress = Some(progress);
        Ok(())
    }

    fn set_failed(&self, job_id: &str, error: String) -> Result<(), JobError> {
        {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

            job.state = JobState::Failed;
            job.error_message = Some(error);
            job.completed_at = Some(Utc::now());
        }
        self.evict_finished(Utc::now());
        Ok(())
    }

    fn set_completed(&self, job_id: &str, output: JobOutput) -> Result<(), JobError> {
        {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

            job.state = JobState::Done;
            job.output = Some(output);
            job.completed_at = Some(Utc::now());
        }
        // 写锁已释放，才能遍历
        self.evict_finished(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{JobKind, SegmentSpec};
    use crate::domain::SynthesisSettings;

    fn request() -> JobRequest {
        JobRequest::Batch {
            segments: vec![SegmentSpec {
                ref_audio_url: "/tmp/ref.wav".to_string(),
                ref_text: None,
                gen_text: "Hello".to_string(),
            }],
            settings: SynthesisSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let (tx, mut rx) = mpsc::channel(100);
        let manager = InMemoryJobManager::new(tx);

        // Submit
        let job_id = manager.submit(request()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), job_id);

        let job = manager.get_job(&job_id).unwrap();
        assert_eq!(job.kind, JobKind::Batch);
        assert_eq!(job.state, JobState::Pending);

        // 请求只能取一次
        assert!(manager.take_request(&job_id).is_some());
        assert!(manager.take_request(&job_id).is_none());

        manager.set_state(&job_id, JobState::Running).unwrap();
        manager
            .set_progress(&job_id, Progress::new(40.0, "NFE Step 13/32"))
            .unwrap();
        manager
            .set_completed(
                &job_id,
                JobOutput {
                    samples: Arc::new(vec![0.0; 2400]),
                    sample_rate: 24000,
                },
            )
            .unwrap();

        let job = manager.get_job(&job_id).unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(job.completed_at.is_some());
        assert_eq!(job.output.unwrap().duration_ms(), 100);
    }

    #[tokio::test]
    async fn test_set_failed() {
        let (tx, _rx) = mpsc::channel(100);
        let manager = InMemoryJobManager::new(tx);
        let job_id = manager.submit(request()).unwrap();

        manager.set_failed(&job_id, "boom".to_string()).unwrap();
        let job = manager.get_job(&job_id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_submit() {
        let (tx, _rx) = mpsc::channel(1);
        let manager = InMemoryJobManager::new(tx);

        manager.submit(request()).unwrap();
        let err = manager.submit(request()).unwrap_err();
        assert!(matches!(err, JobError::QueueFull));
        assert_eq!(manager.len(), 1);
    }

    fn finish(manager: &InMemoryJobManager) -> String {
        let job_id = manager.submit(request()).unwrap();
        manager.take_request(&job_id);
        manager
            .set_completed(
                &job_id,
                JobOutput {
                    samples: Arc::new(vec![0.0; 24000]),
                    sample_rate: 24000,
                },
            )
            .unwrap();
        job_id
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_finished() {
        let (tx, _rx) = mpsc::channel(100);
        let manager = InMemoryJobManager::new(tx).with_retention(JobRetention {
            ttl_secs: 3600,
            max_finished: 2,
        });

        let pending = manager.submit(request()).unwrap();
        let first = finish(&manager);
        std::thread::sleep(Duration::from_millis(5));
        let second = finish(&manager);
        std::thread::sleep(Duration::from_millis(5));
        let third = finish(&manager);

        assert!(manager.get_job(&first).is_none());
        assert!(manager.get_job(&second).is_some());
        assert!(manager.get_job(&third).is_some());
        assert_eq!(manager.get_job(&pending).unwrap().state, JobState::Pending);
        assert_eq!(manager.len(), 3);
    }

    #[tokio::test]
    async fn test_ttl_evicts_expired_jobs() {
        let (tx, _rx) = mpsc::channel(100);
        let manager = InMemoryJobManager::new(tx).with_retention(JobRetention {
            ttl_secs: 60,
            max_finished: 10,
        });

        let running = manager.submit(request()).unwrap();
        manager.set_state(&running, JobState::Running).unwrap();
        let done = finish(&manager);
        let failed = manager.submit(request()).unwrap();
        manager.set_failed(&failed, "boom".to_string()).unwrap();

        assert_eq!(manager.evict_finished(Utc::now()), 0);
        assert_eq!(manager.evict_finished(Utc::now() + chrono::Duration::seconds(61)), 2);
        assert!(manager.get_job(&done).is_none());
        assert!(manager.get_job(&failed).is_none());
        assert_eq!(manager.get_job(&running).unwrap().state, JobState::Running);
    }

    #[tokio::test]
    async fn test_sweeper_frees_expired_jobs() {
        let (tx, _rx) = mpsc::channel(100);
        let manager = InMemoryJobManager::new(tx)
            .with_retention(JobRetention {
                ttl_secs: 1,
                max_finished: 10,
            })
            .arc();
        let sweeper = manager.spawn_sweeper(Duration::from_millis(100));

        let job_id = manager.submit(request()).unwrap();
        manager.set_failed(&job_id, "boom".to_string()).unwrap();
        assert!(manager.get_job(&job_id).is_some());

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(manager.get_job(&job_id).is_none());
        assert!(manager.is_empty());
        sweeper.abort();
    }

    #[test]
    fn test_unknown_job() {
        let (tx, _rx) = mpsc::channel(1);
        let manager = InMemoryJobManager::new(tx);
        assert!(matches!(
            manager.set_state("missing", JobState::Done),
            Err(JobError::NotFound(_))
        ));
    }
}
