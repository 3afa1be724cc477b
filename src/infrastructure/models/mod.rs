//! Models - 模型适配器与实例管理
//!
//! 适配器在执行上下文内运行；实例与管理器在调用方一侧

mod adapter;
mod f5tts;
mod instance;
mod manager;
mod registry;
mod transcriber;

pub use adapter::{invalid_input, ModelAdapter, INVALID_INPUT_ERROR, MODEL_ERROR, NOT_LOADED_ERROR};
pub use f5tts::{estimate_duration, normalize_to_int16, tokenize, F5TtsAdapter, Vocab};
pub use instance::ModelInstance;
pub use manager::ModelManager;
pub use registry::{AdapterFactory, AdapterRegistry};
pub use transcriber::TranscriberAdapter;
