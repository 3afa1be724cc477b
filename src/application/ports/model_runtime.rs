//! Model Runtime Port - 模型实例与注册表抽象
//!
//! 模型运行在独立的执行上下文中，调用方只通过 initialize / process / dispose
//! 和进度订阅与之交互。具体实现在 infrastructure/models 层。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Progress, Value};

/// 跨边界重建的远端错误（名称、消息、调用栈）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl RemoteError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// 从 Rust 错误构建，stack 为错误的 source 链
    pub fn from_error(name: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        Self {
            name: name.into(),
            message: err.to_string(),
            stack: if chain.is_empty() {
                None
            } else {
                Some(chain.join("\n"))
            },
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// 远端错误名：未知适配器类型等配置问题
pub const CONFIGURATION_ERROR: &str = "ConfigurationError";

/// TTS 适配器类型名
pub const F5TTS_KIND: &str = "f5tts";
/// 转写适配器类型名
pub const TRANSCRIBER_KIND: &str = "transcriber";

/// 模型加载进度事件
pub const INITIALIZE_EVENT: &str = "initialize";
/// 推理进度事件
pub const INFERENCE_EVENT: &str = "inference";

/// RPC 调用错误
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model error: {0}")]
    Model(RemoteError),

    #[error("Transport error: instance disposed")]
    Disposed,

    #[error("Transport error: call timed out after {0:?}")]
    Timeout(Duration),
}

impl RpcError {
    /// 远端错误按名称归类
    pub fn from_remote(remote: RemoteError) -> Self {
        if remote.name == CONFIGURATION_ERROR {
            RpcError::Configuration(remote.message)
        } else {
            RpcError::Model(remote)
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::Disposed | RpcError::Timeout(_)
        )
    }
}

/// 监听器句柄，用于 off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// 进度监听器
pub type ProgressListener = Arc<dyn Fn(&Progress) + Send + Sync>;

/// 模型实例
///
/// 一个实例对应一个执行上下文和一个已加载的模型。
/// 同一实例的 process 调用应由调用方串行化。
#[async_trait]
pub trait ModelRuntimePort: Send + Sync {
    /// 实例标识
    fn id(&self) -> &str;

    /// 适配器类型
    fn kind(&self) -> &str;

    /// 加载模型；并发调用共享同一个就绪结果
    async fn initialize(&self) -> Result<(), RpcError>;

    /// 执行一次推理（未初始化时先初始化）
    async fn process(&self, input: Value) -> Result<Value, RpcError>;

    /// 终止执行上下文，未完成的调用收到 Disposed
    async fn dispose(&self);

    /// 订阅事件
    fn on(&self, event: &str, listener: ProgressListener) -> ListenerId;

    /// 取消订阅
    fn off(&self, event: &str, id: ListenerId);

    /// 清空某事件（或全部事件）的监听器
    fn reset_listeners(&self, event: Option<&str>);
}

/// 模型注册表
#[async_trait]
pub trait ModelRegistryPort: Send + Sync {
    /// 获取或创建实例；id 为空时自动生成唯一键
    fn get_or_create(
        &self,
        kind: &str,
        id: Option<&str>,
        config: Value,
    ) -> Arc<dyn ModelRuntimePort>;

    /// 释放并移除实例，返回是否存在
    async fn dispose_model(&self, id: &str) -> bool;

    /// 释放所有实例
    async fn dispose_all(&self);
}
