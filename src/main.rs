//! Clonecast - 零样本语音克隆合成服务
//!
//! 启动顺序：配置 → 日志 → 推理后端 → 模型管理器 → 任务队列与 Worker → HTTP

use std::sync::Arc;
use std::time::Duration;

use clonecast::application::ports::{InferenceBackendPort, ModelRegistryPort};
use clonecast::application::{ReferencePreparer, RunSynthesisJobHandler, SynthesisOrchestrator};
use clonecast::config::{load_config, print_config, AppConfig, BackendKind};
use clonecast::domain::Value;
use clonecast::infrastructure::adapters::{
    FakeInferenceBackend, HttpInferenceBackend, HttpInferenceBackendConfig, HttpReferenceFetcher,
    SymphoniaDecoder, WavEncoder,
};
use clonecast::infrastructure::events::EventPublisher;
use clonecast::infrastructure::http::{AppState, HttpServer, ServerConfig};
use clonecast::infrastructure::memory::{InMemoryJobManager, JobRetention};
use clonecast::infrastructure::models::{AdapterRegistry, ModelManager};
use clonecast::infrastructure::worker::SynthesisWorker;
use tokio::sync::mpsc;

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},clonecast={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn InferenceBackendPort>> {
    Ok(match config.inference.backend {
        BackendKind::Http => {
            let backend_config = HttpInferenceBackendConfig::new(&config.inference.url)
                .with_timeout(config.inference.timeout_secs);
            Arc::new(HttpInferenceBackend::new(backend_config)?)
        }
        BackendKind::Fake => {
            tracing::warn!("Using the fake inference backend, output is a test tone");
            Arc::new(FakeInferenceBackend::new())
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    tracing::info!("Clonecast - 零样本语音克隆合成服务");
    print_config(&config);

    // 推理后端与模型管理器
    let backend = build_backend(&config)?;
    if !backend.health_check().await {
        tracing::warn!("Inference backend is not healthy yet, models will load on first use");
    }
    let call_timeout = config.rpc.call_timeout_secs.map(Duration::from_secs);
    let models = ModelManager::new(AdapterRegistry::standard(backend), call_timeout).arc();

    let tts_config = match &config.inference.vocab_path {
        Some(path) => Value::map().with("vocab_path", path.as_str()),
        None => Value::Null,
    };
    let silence = config.synthesis.silence_params();

    // 合成流水线
    let orchestrator =
        SynthesisOrchestrator::new(models.clone(), tts_config).with_silence(silence);
    let mut fetcher = HttpReferenceFetcher::new(config.reference.fetch_timeout_secs)?;
    if let Some(dir) = &config.reference.local_dir {
        fetcher = fetcher.with_local_root(dir)?;
    }
    let preparer = ReferencePreparer::new(
        Arc::new(fetcher),
        Arc::new(SymphoniaDecoder),
        models.clone(),
        config.reference.max_duration_ms,
    )
    .with_silence(silence);
    let run_handler = Arc::new(RunSynthesisJobHandler::new(orchestrator, preparer));

    // 任务队列与 Worker
    let (job_tx, job_rx) = mpsc::channel(config.server.queue_capacity);
    let job_manager = InMemoryJobManager::new(job_tx)
        .with_retention(JobRetention {
            ttl_secs: config.jobs.ttl_secs,
            max_finished: config.jobs.max_finished,
        })
        .arc();
    let sweeper_handle =
        job_manager.spawn_sweeper(Duration::from_secs(config.jobs.sweep_interval_secs));
    let event_publisher = EventPublisher::new().arc();

    let worker = SynthesisWorker::new(
        job_rx,
        job_manager.clone(),
        run_handler,
        event_publisher.clone(),
    );
    let worker_handle = tokio::spawn(worker.run());

    // HTTP 服务器
    let server_config = ServerConfig::from(&config.server);
    let state = AppState::new(job_manager, Arc::new(WavEncoder), event_publisher);
    let server = HttpServer::bind(&server_config, state).await?;

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    // 停止 Worker 并释放所有模型执行上下文
    worker_handle.abort();
    sweeper_handle.abort();
    models.dispose_all().await;

    tracing::info!("Server shutdown complete");

    Ok(())
}
