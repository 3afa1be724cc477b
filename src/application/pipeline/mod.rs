//! Synthesis Pipeline - 合成编排
//!
//! - reference: 参考音频准备与参考文本转写
//! - orchestrator: 分块、逐块推理、拼接与进度汇总

mod orchestrator;
mod reference;
#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{plan_chunks, ReferenceVoice, SynthesisOrchestrator};
pub use reference::{prepare_reference, ReferencePreparer};

use crate::application::error::ApplicationError;
use crate::application::ports::{ProgressSink, PROGRESS_EVENT};
use crate::domain::{Progress, RunState};

/// 输出与参考音频的统一采样率
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;
/// TTS 实例的身份键
pub const TTS_MODEL_ID: &str = "ttsEngine";
/// 转写实例的身份键
pub const TRANSCRIBER_MODEL_ID: &str = "transcriptionModel";

/// 失败时的终止进度：value 归零，消息携带错误文本
pub fn report_failure(sink: &dyn ProgressSink, err: &ApplicationError) {
    tracing::error!(error = %err, "Synthesis run failed");
    sink.emit(
        PROGRESS_EVENT,
        Progress::new(0.0, format!("Error: {}", err.user_message())),
    );
    sink.state_changed(RunState::Failed);
}
