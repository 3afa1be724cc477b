//! 端到端合成流水线：真实模型执行上下文 + Fake 推理后端

use std::sync::Arc;
use std::time::Duration;

use clonecast::application::ports::{
    AudioEncoderPort, JobManagerPort, JobRequest, JobState, ModelRegistryPort, SegmentSpec,
    SpeakerSpec,
};
use clonecast::application::{ReferencePreparer, RunSynthesisJobHandler, SynthesisOrchestrator};
use clonecast::domain::{SynthesisSettings, Value};
use clonecast::infrastructure::adapters::{
    FakeInferenceBackend, HttpReferenceFetcher, SymphoniaDecoder, WavEncoder,
};
use clonecast::infrastructure::events::{EventPublisher, WsEvent};
use clonecast::infrastructure::memory::InMemoryJobManager;
use clonecast::infrastructure::models::{AdapterRegistry, ModelManager};
use clonecast::infrastructure::worker::SynthesisWorker;
use tokio::sync::mpsc;

struct Harness {
    _dir: tempfile::TempDir,
    reference: String,
    models: Arc<ModelManager>,
    jobs: Arc<InMemoryJobManager>,
    publisher: Arc<EventPublisher>,
    worker: Option<SynthesisWorker>,
}

/// 1 秒 24 kHz 正弦参考音频
fn write_reference(dir: &tempfile::TempDir) -> String {
    let samples: Vec<f32> = (0..24000)
        .map(|i| 0.5 * (i as f32 * 2.0 * std::f32::consts::PI * 330.0 / 24000.0).sin())
        .collect();
    let wav = WavEncoder.encode(&samples, 24000).unwrap();
    let path = dir.path().join("reference.wav");
    std::fs::write(&path, wav).unwrap();
    path.to_string_lossy().into_owned()
}

fn harness(backend: FakeInferenceBackend) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_reference(&dir);

    let models = ModelManager::new(
        AdapterRegistry::standard(Arc::new(backend)),
        Some(Duration::from_secs(30)),
    )
    .arc();
    let preparer = ReferencePreparer::new(
        Arc::new(
            HttpReferenceFetcher::new(5)
                .unwrap()
                .with_local_root(dir.path())
                .unwrap(),
        ),
        Arc::new(SymphoniaDecoder),
        models.clone(),
        10_000,
    );
    let handler = Arc::new(RunSynthesisJobHandler::new(
        SynthesisOrchestrator::new(models.clone(), Value::Null),
        preparer,
    ));

    let (tx, rx) = mpsc::channel(16);
    let jobs = InMemoryJobManager::new(tx).arc();
    let publisher = EventPublisher::new().arc();
    let worker = SynthesisWorker::new(rx, jobs.clone(), handler, publisher.clone());

    Harness {
        _dir: dir,
        reference,
        models,
        jobs,
        publisher,
        worker: Some(worker),
    }
}

/// 订阅后再启动 worker，收集事件直到终止
async fn run_job(h: &mut Harness, request: JobRequest) -> (String, Vec<WsEvent>) {
    let job_id = h.jobs.submit(request).unwrap();
    let mut events_rx = h.publisher.subscribe(&job_id);
    if let Some(worker) = h.worker.take() {
        tokio::spawn(worker.run());
    }
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events_rx.recv())
            .await
            .expect("job did not finish in time")
            .unwrap();
        let done = event.is_terminal();
        events.push(event);
        if done {
            break;
        }
    }
    (job_id, events)
}

fn progress_values(events: &[WsEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            WsEvent::Progress { value, .. } => Some(*value),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_job_end_to_end() {
    let mut h = harness(FakeInferenceBackend::new().with_transcript("a short reference clip"));

    let request = JobRequest::Batch {
        segments: vec![
            SegmentSpec {
                ref_audio_url: h.reference.clone(),
                ref_text: Some("a short reference clip".to_string()),
                gen_text: "Hello there. This is the first segment.".to_string(),
            },
            SegmentSpec {
                ref_audio_url: h.reference.clone(),
                ref_text: None,
                gen_text: "And a second one.".to_string(),
            },
        ],
        settings: SynthesisSettings {
            nfe_steps: 4,
            ..Default::default()
        },
    };
    let (job_id, events) = run_job(&mut h, request).await;

    let job = h.jobs.get_job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Done, "error: {:?}", job.error_message);
    let output = job.output.unwrap();
    assert_eq!(output.sample_rate, 24000);
    assert!(!output.samples.is_empty());

    let values = progress_values(&events);
    assert!(values.contains(&100.0));
    assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));

    // 参考文本为空的段落触发了转写模型
    assert!(h.models.contains("transcriptionModel"));
    assert!(h.models.contains("ttsEngine"));

    h.models.dispose_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_chunk_fails_job() {
    let mut h = harness(FakeInferenceBackend::new().with_failure_marker("BROKEN"));

    let request = JobRequest::Batch {
        segments: vec![SegmentSpec {
            ref_audio_url: h.reference.clone(),
            ref_text: Some("reference".to_string()),
            gen_text: "This BROKEN sentence cannot be spoken.".to_string(),
        }],
        settings: SynthesisSettings {
            nfe_steps: 2,
            ..Default::default()
        },
    };
    let (job_id, events) = run_job(&mut h, request).await;

    let job = h.jobs.get_job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.output.is_none());

    let last_progress = events.iter().rev().find_map(|e| match e {
        WsEvent::Progress { value, message, .. } => Some((*value, message.clone())),
        _ => None,
    });
    let (value, message) = last_progress.unwrap();
    assert_eq!(value, 0.0);
    assert!(message.starts_with("Error: "));

    h.models.dispose_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_podcast_job_end_to_end() {
    let mut h = harness(FakeInferenceBackend::new());

    let mut speakers = std::collections::BTreeMap::new();
    for name in ["Alice", "Bob"] {
        speakers.insert(
            name.to_string(),
            SpeakerSpec {
                ref_audio_url: h.reference.clone(),
                ref_text: Some(format!("{} reference", name)),
            },
        );
    }

    let request = JobRequest::Podcast {
        script: "Alice: Hi Bob.\nBob: Hello Alice.\nAlice: Bye.".to_string(),
        speakers,
        settings: SynthesisSettings {
            nfe_steps: 2,
            pause_ms: 250,
            ..Default::default()
        },
    };
    let (job_id, _events) = run_job(&mut h, request).await;

    let job = h.jobs.get_job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Done, "error: {:?}", job.error_message);
    // 3 轮之间 2 段 250 ms 停顿
    assert!(job.output.unwrap().samples.len() > 2 * 6000);

    h.models.dispose_all().await;
}
