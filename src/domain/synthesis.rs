//! Synthesis - 合成请求的核心值对象
//!
//! Segment（参考音频 + 参考文本 + 待生成文本）、Progress、运行状态

use serde::{Deserialize, Serialize};

use super::tensor::Tensor;
use super::text_segmenter::DEFAULT_MIN_CHUNK_CHARS;

/// NFE 步数范围
pub const MIN_NFE_STEPS: u32 = 2;
pub const MAX_NFE_STEPS: u32 = 1024;

/// 合成单元
///
/// 不变量: 构建后不可变
#[derive(Debug, Clone)]
pub struct Segment {
    ref_audio: Tensor,
    ref_text: String,
    gen_text: String,
}

impl Segment {
    pub fn new(ref_audio: Tensor, ref_text: impl Into<String>, gen_text: impl Into<String>) -> Self {
        Self {
            ref_audio,
            ref_text: ref_text.into(),
            gen_text: gen_text.into(),
        }
    }

    pub fn ref_audio(&self) -> &Tensor {
        &self.ref_audio
    }

    pub fn ref_text(&self) -> &str {
        &self.ref_text
    }

    pub fn gen_text(&self) -> &str {
        &self.gen_text
    }

    /// 参考音频时长（秒）
    pub fn ref_audio_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.ref_audio.numel() as f64 / sample_rate as f64
    }

    /// 替换参考文本，返回新的 Segment
    pub fn with_ref_text(self, ref_text: impl Into<String>) -> Self {
        Self {
            ref_text: ref_text.into(),
            ..self
        }
    }
}

/// 进度
///
/// 同一次调用内 value 应单调不减（约定，不由通道强制）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub value: f64,
    pub message: String,
}

impl Progress {
    /// 创建进度，value 被限制在 [0, 100]
    pub fn new(value: f64, message: impl Into<String>) -> Self {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) };
        Self {
            value,
            message: message.into(),
        }
    }
}

/// 全局进度 = (已完成块数 + 当前块内进度) / 总块数 * 100
///
/// `chunk_fraction` 取值 [0, 1]
pub fn global_progress(completed: usize, chunk_fraction: f64, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let fraction = chunk_fraction.clamp(0.0, 1.0);
    ((completed as f64 + fraction) / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// 编排运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Chunking,
    Running { current: usize, total: usize },
    Stitching,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Chunking => "chunking",
            RunState::Running { .. } => "running",
            RunState::Stitching => "stitching",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// 合成参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    /// 是否对生成文本分块
    pub enable_chunking: bool,
    /// 自定义分割词（逗号分隔）
    pub custom_split_words: String,
    /// 语速
    pub speed: f64,
    /// NFE 步数
    pub nfe_steps: u32,
    /// 单次合成窗口上限（秒）
    pub max_output_secs: f64,
    /// 分块字符预算下限
    pub min_chunk_chars: usize,
    /// 多段拼接时插入的停顿（毫秒）
    pub pause_ms: u32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            enable_chunking: true,
            custom_split_words: String::new(),
            speed: 1.0,
            nfe_steps: 32,
            max_output_secs: 25.0,
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
            pause_ms: 500,
        }
    }
}

impl SynthesisSettings {
    /// 解析自定义分割词：压缩空白、按逗号分割、去除空项
    pub fn split_words(&self) -> Vec<String> {
        self.custom_split_words
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return Err("speed must be a positive number");
        }
        if !(MIN_NFE_STEPS..=MAX_NFE_STEPS).contains(&self.nfe_steps) {
            return Err("nfe_steps must be between 2 and 1024");
        }
        if !(self.max_output_secs > 0.0) {
            return Err("max_output_secs must be positive");
        }
        if self.min_chunk_chars == 0 {
            return Err("min_chunk_chars must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_progress_example() {
        // 2 段 × 3 块，完成第 4 块后当前块 50%
        let value = global_progress(4, 0.5, 6);
        assert!((value - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_global_progress_bounds() {
        assert_eq!(global_progress(0, 0.0, 4), 0.0);
        assert_eq!(global_progress(4, 0.0, 4), 100.0);
        assert_eq!(global_progress(0, 0.0, 0), 100.0);
    }

    #[test]
    fn test_progress_clamped() {
        assert_eq!(Progress::new(150.0, "x").value, 100.0);
        assert_eq!(Progress::new(-3.0, "x").value, 0.0);
        assert_eq!(Progress::new(f64::NAN, "x").value, 0.0);
    }

    #[test]
    fn test_split_words_parsing() {
        let settings = SynthesisSettings {
            custom_split_words: "and ,  but\n then,, ".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.split_words(), vec!["and", "but then"]);
    }

    #[test]
    fn test_settings_validation() {
        assert!(SynthesisSettings::default().validate().is_ok());
        let bad = SynthesisSettings {
            speed: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let too_many_steps = SynthesisSettings {
            nfe_steps: MAX_NFE_STEPS + 1,
            ..Default::default()
        };
        assert_eq!(
            too_many_steps.validate(),
            Err("nfe_steps must be between 2 and 1024")
        );
        let max_steps = SynthesisSettings {
            nfe_steps: MAX_NFE_STEPS,
            ..Default::default()
        };
        assert!(max_steps.validate().is_ok());
    }

    #[test]
    fn test_segment_ref_duration() {
        let seg = Segment::new(Tensor::waveform(vec![0.0; 48000]), "ref", "gen");
        assert!((seg.ref_audio_secs(24000) - 2.0).abs() < 1e-9);
    }
}
