//! Inference Backend Port - 不透明的推理后端
//!
//! 输入为命名张量，输出为命名张量。可以分阶段调用（如 preprocess → transformer → decode），
//! 上层只负责编排调用顺序，不关心前向计算细节。

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Tensor;

/// 命名张量集合
pub type NamedTensors = BTreeMap<String, Tensor>;

/// 推理后端错误
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing output tensor: {0}")]
    MissingOutput(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),
}

/// Inference Backend Port
#[async_trait]
pub trait InferenceBackendPort: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 加载模型权重，可重复调用
    async fn load(&self) -> Result<(), BackendError>;

    /// 运行一个阶段
    async fn run(&self, stage: &str, inputs: NamedTensors) -> Result<NamedTensors, BackendError>;

    /// 检查后端是否可用
    async fn health_check(&self) -> bool {
        true
    }
}

/// 取出指定输出
pub fn take_output(outputs: &mut NamedTensors, name: &str) -> Result<Tensor, BackendError> {
    outputs
        .remove(name)
        .ok_or_else(|| BackendError::MissingOutput(name.to_string()))
}
