//! 文本分块器
//!
//! 将长文本切分为长度受限的块，块边界通过动态规划选择，
//! 使每块长度尽量接近预算。

use regex::Regex;
use thiserror::Error;

/// 分块预算下限默认值
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 100;

/// 分块错误
#[derive(Debug, Error, PartialEq)]
pub enum TextSegmentError {
    #[error("Part length {len} exceeds chunk budget {budget}")]
    PartTooLong { len: usize, budget: usize },

    #[error("Invalid split words: {0}")]
    InvalidSplitWords(String),
}

/// 句末标点
#[inline]
fn is_terminator(ch: char) -> bool {
    matches!(ch, '。' | '？' | '！' | '.' | '?' | '!')
}

#[inline]
fn is_colon(ch: char) -> bool {
    matches!(ch, ':' | '：')
}

#[inline]
fn is_comma(ch: char) -> bool {
    matches!(ch, ',' | '，')
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 分割层级，按顺序尝试
enum Splitter {
    /// 紧跟在分隔符之后的空格
    After(fn(char) -> bool),
    /// 自定义分割词之前的空格
    BeforeWords(Regex),
    /// 任意空格
    Whitespace,
}

impl Splitter {
    /// 返回切分点（空格的字节位置）
    fn cut_points(&self, text: &str) -> Vec<usize> {
        match self {
            Splitter::After(is_delim) => {
                let mut cuts = Vec::new();
                let mut prev: Option<char> = None;
                for (idx, ch) in text.char_indices() {
                    if ch == ' ' && prev.map(is_delim).unwrap_or(false) {
                        cuts.push(idx);
                    }
                    prev = Some(ch);
                }
                cuts
            }
            Splitter::BeforeWords(pattern) => pattern
                .find_iter(text)
                .filter(|m| {
                    // 分割词后不能紧跟字母（避免 "and" 匹配 "android"）
                    !text[m.end()..]
                        .chars()
                        .next()
                        .map(|c| c.is_ascii_alphabetic())
                        .unwrap_or(false)
                })
                .map(|m| m.start())
                .collect(),
            Splitter::Whitespace => text
                .char_indices()
                .filter(|(_, ch)| *ch == ' ')
                .map(|(idx, _)| idx)
                .collect(),
        }
    }

    /// 在切分点处切开，空格被消耗
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut parts = Vec::new();
        let mut start = 0;
        for cut in self.cut_points(text) {
            parts.push(&text[start..cut]);
            start = cut + 1;
        }
        parts.push(&text[start..]);
        parts.into_iter().filter(|p| !p.is_empty()).collect()
    }
}

fn build_splitters(split_words: &[String]) -> Result<Vec<Splitter>, TextSegmentError> {
    let mut splitters = vec![
        Splitter::After(is_terminator),
        Splitter::After(is_colon),
        Splitter::After(is_comma),
    ];

    let words: Vec<String> = split_words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if !words.is_empty() {
        let pattern = Regex::new(&format!("(?i) (?:{})", words.join("|")))
            .map_err(|e| TextSegmentError::InvalidSplitWords(e.to_string()))?;
        splitters.push(Splitter::BeforeWords(pattern));
    }

    splitters.push(Splitter::Whitespace);
    Ok(splitters)
}

/// 归一化空白并补全句末标点
pub fn normalize_text(text: &str) -> String {
    let mut normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(last) = normalized.chars().last() {
        if !is_terminator(last) {
            normalized.push('.');
        }
    }
    normalized
}

fn recursive_split<'a>(
    text: &'a str,
    level: usize,
    splitters: &[Splitter],
    budget: usize,
    out: &mut Vec<&'a str>,
) {
    if char_len(text) <= budget || level >= splitters.len() {
        out.push(text);
        return;
    }
    for part in splitters[level].split(text) {
        if char_len(part) > budget {
            recursive_split(part, level + 1, splitters, budget, out);
        } else {
            out.push(part);
        }
    }
}

/// 计算最优断点
///
/// 输入为各原子片段的长度，返回每个块的起始片段下标。
/// 块长度包含片段之间的连接空格，代价为 (len - budget)^2。
pub fn optimal_breaks(lengths: &[usize], budget: usize) -> Result<Vec<usize>, TextSegmentError> {
    let n = lengths.len();
    let mut cost = vec![u64::MAX; n];
    let mut start = vec![0usize; n];

    for i in 0..n {
        if lengths[i] > budget {
            return Err(TextSegmentError::PartTooLong {
                len: lengths[i],
                budget,
            });
        }

        let mut length = 0usize;
        for j in (0..=i).rev() {
            length += lengths[j] + usize::from(j < i);
            if length > budget {
                break;
            }
            let gap = (budget - length) as u64;
            let prev = if j > 0 { cost[j - 1] } else { 0 };
            let candidate = prev.saturating_add(gap * gap);
            if candidate < cost[i] {
                cost[i] = candidate;
                start[i] = j;
            }
        }
    }

    let mut breaks = Vec::new();
    let mut curr = n;
    while curr > 0 {
        let s = start[curr - 1];
        breaks.push(s);
        curr = s;
    }
    breaks.reverse();
    Ok(breaks)
}

/// 将文本切分为不超过 `budget` 个字符的块
///
/// 用单个空格连接结果可还原归一化后的文本
pub fn split_text_into_chunks(
    text: &str,
    budget: usize,
    split_words: &[String],
) -> Result<Vec<String>, TextSegmentError> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let splitters = build_splitters(split_words)?;
    let mut parts = Vec::new();
    recursive_split(&normalized, 0, &splitters, budget, &mut parts);

    let lengths: Vec<usize> = parts.iter().map(|p| char_len(p)).collect();
    let breaks = optimal_breaks(&lengths, budget)?;

    let chunks = breaks
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let end = breaks.get(i + 1).copied().unwrap_or(parts.len());
            parts[s..end].join(" ")
        })
        .collect();
    Ok(chunks)
}

/// 根据参考音频的字符密度估算每块的字符预算
///
/// budget = trunc(ref_chars / ref_secs * (max_output_secs - ref_secs) * speed)，
/// 不低于 `min_chars`
pub fn chunk_budget(
    ref_text: &str,
    ref_secs: f64,
    max_output_secs: f64,
    speed: f64,
    min_chars: usize,
) -> usize {
    if !(ref_secs > 0.0) || ref_secs >= max_output_secs {
        return min_chars;
    }
    let density = char_len(ref_text) as f64 / ref_secs;
    let estimate = (density * (max_output_secs - ref_secs) * speed).trunc();
    if !estimate.is_finite() || estimate <= 0.0 {
        return min_chars;
    }
    (estimate as usize).max(min_chars)
}
