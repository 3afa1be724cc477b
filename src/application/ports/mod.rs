//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_io;
mod inference_backend;
mod job_manager;
mod model_runtime;
mod progress_sink;

pub use audio_io::{AudioDecoderPort, AudioEncoderPort, AudioIoError, ReferenceFetcherPort};
pub use inference_backend::{take_output, BackendError, InferenceBackendPort, NamedTensors};
pub use job_manager::{
    Job, JobError, JobKind, JobManagerPort, JobOutput, JobRequest, JobState, SegmentSpec,
    SpeakerSpec,
};
pub use model_runtime::{
    ListenerId, ModelRegistryPort, ModelRuntimePort, ProgressListener, RemoteError, RpcError,
    CONFIGURATION_ERROR, F5TTS_KIND, INFERENCE_EVENT, INITIALIZE_EVENT, TRANSCRIBER_KIND,
};
pub use progress_sink::{NullProgressSink, ProgressSink, PROGRESS_EVENT};
