//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现:
//! - rpc: 执行上下文与消息通道
//! - models: 模型适配器、实例与管理器
//! - adapters: 推理后端、音频编解码与参考音频获取
//! - memory / worker / events / http: 合成服务外壳

pub mod adapters;
pub mod events;
pub mod http;
pub mod memory;
pub mod models;
pub mod rpc;
pub mod worker;

pub use events::{EventPublisher, JobProgressSink};
pub use memory::InMemoryJobManager;
pub use models::{AdapterRegistry, ModelManager};
pub use worker::SynthesisWorker;
