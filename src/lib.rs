//! Clonecast - 零样本语音克隆合成服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Tensor / Value: 跨执行上下文传输的数据
//! - 文本分块、静音检测、播客脚本解析
//!
//! 应用层 (application/):
//! - Ports: 端口定义（ModelRuntime, InferenceBackend, AudioIo, JobManager, ProgressSink）
//! - Pipeline: 参考音频准备与批量/播客合成编排
//! - Commands / Queries: CQRS 命令与查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - RPC: 每个模型一个独立执行上下文，消息传递 + 请求关联
//! - Models: F5-TTS 与转写适配器、实例管理
//! - Adapters: HTTP/Fake 推理后端、symphonia 解码、WAV 编码
//! - HTTP / Memory / Worker / Events: 合成服务外壳

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
