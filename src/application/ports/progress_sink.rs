//! Progress Sink Port - 编排进度的外部接收方

use crate::domain::{Progress, RunState};

/// 进度事件类型
pub const PROGRESS_EVENT: &str = "progress";

/// Progress Sink
///
/// 一次运行只对应一个 sink，编排器多次调用 emit
pub trait ProgressSink: Send + Sync {
    /// 发送进度
    fn emit(&self, event: &str, progress: Progress);

    /// 运行状态变化（默认忽略）
    fn state_changed(&self, _state: RunState) {}
}

/// 丢弃所有进度
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: &str, _progress: Progress) {}
}
