//! 应用层错误定义
//!
//! 各层错误在此汇聚

use thiserror::Error;

use crate::application::ports::{AudioIoError, BackendError, JobError, RemoteError, RpcError};
use crate::domain::{SilenceError, TensorError, TextSegmentError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 配置错误（未知适配器类型、未注册的序列化类型）
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// 传输错误（执行上下文启动失败、消息损坏、已释放、超时）
    #[error("Transport error: {0}")]
    TransportError(String),

    /// 模型错误（适配器 initialize/process 失败）
    #[error("{0}")]
    ModelError(RemoteError),

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 外部服务错误
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// 面向用户的错误文本（不含分类前缀）
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelError(remote) => remote.message.clone(),
            Self::ConfigurationError(msg)
            | Self::TransportError(msg)
            | Self::ValidationError(msg)
            | Self::ExternalServiceError(msg)
            | Self::InternalError(msg) => msg.clone(),
            Self::NotFound { .. } => self.to_string(),
        }
    }
}

impl From<RpcError> for ApplicationError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Configuration(msg) => Self::ConfigurationError(msg),
            RpcError::Model(remote) => Self::ModelError(remote),
            other => Self::TransportError(other.to_string()),
        }
    }
}

impl From<TextSegmentError> for ApplicationError {
    fn from(err: TextSegmentError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<SilenceError> for ApplicationError {
    fn from(err: SilenceError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<TensorError> for ApplicationError {
    fn from(err: TensorError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<AudioIoError> for ApplicationError {
    fn from(err: AudioIoError) -> Self {
        match err {
            AudioIoError::FetchError(_) | AudioIoError::FetchTimeout(_) => {
                Self::ExternalServiceError(err.to_string())
            }
            AudioIoError::UnsupportedFormat(_)
            | AudioIoError::DecodingError(_)
            | AudioIoError::Forbidden(_) => {
                Self::ValidationError(err.to_string())
            }
            _ => Self::InternalError(err.to_string()),
        }
    }
}

impl From<BackendError> for ApplicationError {
    fn from(err: BackendError) -> Self {
        Self::ExternalServiceError(err.to_string())
    }
}

impl From<JobError> for ApplicationError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => Self::not_found("Job", id),
            other => Self::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_mapping() {
        let err: ApplicationError = RpcError::Configuration("Unknown adapter kind: x".into()).into();
        assert!(matches!(err, ApplicationError::ConfigurationError(_)));

        let err: ApplicationError = RpcError::Disposed.into();
        assert!(matches!(err, ApplicationError::TransportError(_)));

        let err: ApplicationError = RpcError::Model(RemoteError::new("ModelError", "boom")).into();
        assert_eq!(err.user_message(), "boom");
    }

    #[test]
    fn test_segment_error_is_validation() {
        let err: ApplicationError = TextSegmentError::PartTooLong { len: 10, budget: 5 }.into();
        assert!(matches!(err, ApplicationError::ValidationError(_)));
    }
}
