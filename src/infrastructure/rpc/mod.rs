//! RPC - 调用方与模型执行上下文之间的消息通道
//!
//! - serialization: Value ↔ WireValue，结构化类型注册表
//! - message: bincode 编码的消息信封
//! - channel: 调用方一侧（请求关联、事件扇出）
//! - host: 执行上下文一侧（适配器构建与调用）

mod channel;
mod host;
mod message;
mod serialization;

pub use channel::{ListenerSet, RpcChannel};
pub use host::{EventEmitter, PANIC_ERROR};
pub use message::{Message, MessageKind};
pub use serialization::{
    deserialize, registered_tags, remote_error_from_wire, remote_error_to_wire, serialize,
    tagged, SerializationError, Transferable, WireValue,
};
