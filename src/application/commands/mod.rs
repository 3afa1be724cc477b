//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：提交合成任务、执行合成任务

mod synthesis_commands;

pub mod handlers;

pub use synthesis_commands::*;
