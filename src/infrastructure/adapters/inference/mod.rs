//! Inference Adapter - 推理后端实现

mod fake_backend;
mod http_backend;

pub use fake_backend::FakeInferenceBackend;
pub use http_backend::*;
