//! 播客脚本解析
//!
//! 脚本形如 "Alice: Hi\nBob: Hello"，按已知说话人名切分为有序的 (说话人, 台词)

use regex::Regex;

/// 一句台词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 说话人（使用配置中的原始写法）
    pub speaker: String,
    pub text: String,
}

/// 解析脚本
///
/// 说话人名不区分大小写；台词从 "Name:" 之后开始，到下一个说话人标记或文本结尾为止。
/// 空台词会被跳过。
pub fn parse_script<S: AsRef<str>>(script: &str, speakers: &[S]) -> Result<Vec<ScriptLine>, regex::Error> {
    let mut names: Vec<&str> = speakers
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(Vec::new());
    }
    // 长名优先，避免 "Bob" 抢先匹配 "Bob Smith"
    names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));

    let alternation = names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let marker = Regex::new(&format!(r"(?i)({}):\s*", alternation))?;

    let markers: Vec<(usize, usize, &str)> = marker
        .captures_iter(script)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            Some((whole.start(), whole.end(), name))
        })
        .collect();

    let mut lines = Vec::with_capacity(markers.len());
    for (i, &(_, text_start, matched)) in markers.iter().enumerate() {
        let text_end = markers.get(i + 1).map(|m| m.0).unwrap_or(script.len());
        let text = script[text_start..text_end].trim();

        let speaker = names
            .iter()
            .find(|n| n.to_lowercase() == matched.to_lowercase())
            .copied()
            .unwrap_or(matched);

        if text.is_empty() {
            tracing::warn!(speaker = %speaker, "Skipping empty podcast line");
            continue;
        }

        lines.push(ScriptLine {
            speaker: speaker.to_string(),
            text: text.to_string(),
        });
    }

    Ok(lines)
}
