//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（ModelRuntime、InferenceBackend、AudioIo、JobManager 等）
//! - pipeline: 参考音频准备与批量/播客合成编排
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod queries;

pub use commands::{
    handlers::{RunSynthesisJobHandler, SubmitPodcastHandler, SubmitSynthesisHandler},
    SubmitJobResponse, SubmitPodcastCommand, SubmitSynthesisCommand,
};

pub use error::ApplicationError;

pub use pipeline::{
    plan_chunks, prepare_reference, ReferencePreparer, ReferenceVoice, SynthesisOrchestrator,
    OUTPUT_SAMPLE_RATE, TRANSCRIBER_MODEL_ID, TTS_MODEL_ID,
};

pub use ports::{
    // Audio I/O
    AudioDecoderPort,
    AudioEncoderPort,
    AudioIoError,
    ReferenceFetcherPort,
    // Inference backend
    BackendError,
    InferenceBackendPort,
    NamedTensors,
    // Job manager
    Job,
    JobError,
    JobKind,
    JobManagerPort,
    JobOutput,
    JobRequest,
    JobState,
    SegmentSpec,
    SpeakerSpec,
    // Model runtime
    ModelRegistryPort,
    ModelRuntimePort,
    RemoteError,
    RpcError,
    // Progress
    NullProgressSink,
    ProgressSink,
    PROGRESS_EVENT,
};

pub use queries::{
    handlers::{GetJobAudioHandler, GetJobStatusHandler},
    GetJobAudioQuery, GetJobAudioResponse, GetJobStatusQuery, JobStatusResponse,
};
