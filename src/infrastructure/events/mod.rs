//! Events - WebSocket 事件发布与任务进度接收

mod job_sink;
mod publisher;

pub use job_sink::JobProgressSink;
pub use publisher::{EventPublisher, WsEvent};
