//! RPC 消息信封
//!
//! 每条消息经 bincode 编码为字节，跨越执行上下文边界时总是复制

use serde::{Deserialize, Serialize};

use super::serialization::WireValue;
use crate::application::ports::RpcError;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// 调用方 → 执行上下文：构建适配器，负载 {kind, config}
    Initialize,
    /// 调用方 → 执行上下文：一次推理，负载为输入值
    Process,
    /// 执行上下文 → 调用方：进度事件，负载 {event, value, message}
    Event,
    /// 调用方 → 执行上下文：终止
    Dispose,
    /// 对 Initialize 的应答
    Ready,
    /// 对 Process 的应答
    Result,
    /// 失败应答，负载 {name, message, stack}
    Error,
}

/// 消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    /// 每个通道内单调递增；Event 没有 id
    pub id: Option<u64>,
    pub payload: WireValue,
}

impl Message {
    pub fn new(kind: MessageKind, id: Option<u64>, payload: WireValue) -> Self {
        Self { kind, id, payload }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RpcError> {
        bincode::serialize(self).map_err(|e| RpcError::Transport(format!("encode failed: {}", e)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        bincode::deserialize(bytes).map_err(|e| RpcError::Transport(format!("malformed message: {}", e)))
    }
}
