//! 静音检测与切分
//!
//! 基于滑动窗口 RMS 的静音检测，用于清理参考音频和去除分块拼接处的空白

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SilenceError {
    #[error("Padding {pad_ms}ms must be less than half of the minimum silence duration {min_silence_ms}ms")]
    PaddingTooLarge { pad_ms: u32, min_silence_ms: u32 },
}

/// 静音区间 [start, end)，单位为采样点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceRange {
    pub start: usize,
    pub end: usize,
}

/// 静音检测参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceParams {
    /// 最短静音时长（同时也是检测窗口长度）
    pub min_silence_ms: u32,
    /// 静音阈值（dBFS）
    pub silence_thresh_db: f64,
    /// 窗口步长
    pub seek_step_ms: u32,
    /// 语音片段向两侧静音扩展的长度
    pub pad_ms: u32,
}

impl Default for SilenceParams {
    fn default() -> Self {
        Self {
            min_silence_ms: 100,
            silence_thresh_db: -16.0,
            seek_step_ms: 10,
            pad_ms: 0,
        }
    }
}

impl SilenceParams {
    /// 语音清理参数（参考音频预处理与合成结果修剪）
    pub fn for_speech() -> Self {
        Self {
            min_silence_ms: 800,
            silence_thresh_db: -45.0,
            seek_step_ms: 10,
            pad_ms: 300,
        }
    }

    pub fn validate(&self) -> Result<(), SilenceError> {
        if 2 * self.pad_ms as u64 >= self.min_silence_ms as u64 {
            return Err(SilenceError::PaddingTooLarge {
                pad_ms: self.pad_ms,
                min_silence_ms: self.min_silence_ms,
            });
        }
        Ok(())
    }
}

pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// 检测静音区间
///
/// 窗口长度为 min_silence，按 seek_step 滑动；相邻或重叠的静音窗口合并
pub fn detect_silence(samples: &[f32], sample_rate: u32, params: &SilenceParams) -> Vec<SilenceRange> {
    let window = ms_to_samples(params.min_silence_ms, sample_rate);
    let step = ms_to_samples(params.seek_step_ms, sample_rate).max(1);

    if window == 0 || samples.len() < window {
        return Vec::new();
    }

    let threshold = 10f64.powf(params.silence_thresh_db / 20.0);
    let silent_starts: Vec<usize> = (0..=samples.len() - window)
        .step_by(step)
        .filter(|&i| rms(&samples[i..i + window]) <= threshold)
        .collect();

    let Some((&first, rest)) = silent_starts.split_first() else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    let mut current = SilenceRange {
        start: first,
        end: first + window,
    };
    for &pos in rest {
        if pos <= current.end {
            current.end = pos + window;
        } else {
            ranges.push(current);
            current = SilenceRange {
                start: pos,
                end: pos + window,
            };
        }
    }
    current.end = current.end.min(samples.len());
    ranges.push(current);
    ranges
}

/// 按静音切分，返回带 padding 的有声片段
pub fn split_on_silence(
    samples: &[f32],
    sample_rate: u32,
    params: &SilenceParams,
) -> Result<Vec<Vec<f32>>, SilenceError> {
    params.validate()?;
    let pad = ms_to_samples(params.pad_ms, sample_rate);
    let silent = detect_silence(samples, sample_rate, params);

    // 有声区间位于相邻静音区间之间，以及首个之前、末个之后
    let mut boundaries = Vec::with_capacity(silent.len() + 2);
    boundaries.push((0usize, 0usize));
    boundaries.extend(silent.iter().map(|r| (r.start, r.end)));
    boundaries.push((samples.len(), samples.len()));

    let segments = boundaries
        .windows(2)
        .filter_map(|pair| {
            let voiced_start = pair[0].1;
            let voiced_end = pair[1].0;
            if voiced_end > voiced_start {
                let start = voiced_start.saturating_sub(pad);
                let end = (voiced_end + pad).min(samples.len());
                Some(samples[start..end].to_vec())
            } else {
                None
            }
        })
        .collect();
    Ok(segments)
}

/// 去除静音：拼接所有有声片段
pub fn remove_silence(samples: &[f32], sample_rate: u32, params: &SilenceParams) -> Result<Vec<f32>, SilenceError> {
    Ok(split_on_silence(samples, sample_rate, params)?.concat())
}

/// 指定时长的静音片段
pub fn empty_segment(duration_ms: u32, sample_rate: u32) -> Vec<f32> {
    vec![0.0; ms_to_samples(duration_ms, sample_rate)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 24000;

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (i as f32 * 0.05).sin())
            .collect()
    }

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(100, 24000), 2400);
        assert_eq!(ms_to_samples(1, 44100), 44);
    }

    #[test]
    fn test_all_zero_is_one_range() {
        let samples = vec![0.0f32; RATE as usize];
        let ranges = detect_silence(&samples, RATE, &SilenceParams::default());
        assert_eq!(ranges, vec![SilenceRange { start: 0, end: samples.len() }]);
    }

    #[test]
    fn test_short_signal_has_no_silence() {
        let samples = vec![0.0f32; 100];
        assert!(detect_silence(&samples, RATE, &SilenceParams::default()).is_empty());
    }

    #[test]
    fn test_detects_gap_between_tones() {
        let mut samples = tone(RATE as usize / 2, 0.8);
        samples.extend(vec![0.0; RATE as usize / 2]);
        samples.extend(tone(RATE as usize / 2, 0.8));

        let params = SilenceParams {
            silence_thresh_db: -40.0,
            ..Default::default()
        };
        let ranges = detect_silence(&samples, RATE, &params);
        assert_eq!(ranges.len(), 1);
        let gap = ranges[0];
        assert!(gap.start >= RATE as usize / 2 && gap.end <= RATE as usize);
    }

    #[test]
    fn test_padding_precondition() {
        let samples = vec![0.0f32; 1000];
        let bad = SilenceParams {
            min_silence_ms: 100,
            pad_ms: 50,
            ..Default::default()
        };
        assert!(matches!(
            split_on_silence(&samples, RATE, &bad),
            Err(SilenceError::PaddingTooLarge { .. })
        ));

        let ok = SilenceParams {
            min_silence_ms: 100,
            pad_ms: 49,
            ..Default::default()
        };
        assert!(split_on_silence(&samples, RATE, &ok).is_ok());
    }

    #[test]
    fn test_remove_silence_idempotent() {
        let params = SilenceParams::for_speech();
        let mut samples = vec![0.0; RATE as usize];
        samples.extend(tone(RATE as usize, 0.5));
        samples.extend(vec![0.0; 2 * RATE as usize]);
        samples.extend(tone(RATE as usize / 2, 0.5));
        samples.extend(vec![0.0; RATE as usize]);

        let once = remove_silence(&samples, RATE, &params).unwrap();
        let twice = remove_silence(&once, RATE, &params).unwrap();
        assert!(once.len() < samples.len());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_all_silence_removed_to_empty() {
        let samples = vec![0.0f32; 2 * RATE as usize];
        let out = remove_silence(&samples, RATE, &SilenceParams::for_speech()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_segment() {
        let pause = empty_segment(500, RATE);
        assert_eq!(pause.len(), 12000);
        assert!(pause.iter().all(|&s| s == 0.0));
    }
}
