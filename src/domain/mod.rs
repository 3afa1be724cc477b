//! Domain Layer - 领域层
//!
//! 纯数据与算法，不依赖运行时:
//! - tensor / value: 跨执行上下文传输的值
//! - synthesis: Segment、Progress、运行状态
//! - text_segmenter: 文本分块
//! - silence: 静音检测与切分
//! - podcast_script: 播客脚本解析

pub mod podcast_script;
pub mod silence;
pub mod synthesis;
pub mod tensor;
pub mod text_segmenter;
pub mod value;

pub use podcast_script::{parse_script, ScriptLine};
pub use silence::{
    detect_silence, empty_segment, remove_silence, split_on_silence, SilenceError, SilenceParams,
    SilenceRange,
};
pub use synthesis::{
    global_progress, Progress, RunState, Segment, SynthesisSettings, MAX_NFE_STEPS, MIN_NFE_STEPS,
};
pub use tensor::{element_count, DType, Tensor, TensorData, TensorError};
pub use text_segmenter::{chunk_budget, split_text_into_chunks, TextSegmentError};
pub use value::Value;
