//! Worker Layer - Background Job Processing
//!
//! 实现 SynthesisWorker，逐个执行合成任务

mod synthesis_worker;

pub use synthesis_worker::SynthesisWorker;
