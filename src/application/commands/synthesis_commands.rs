//! Synthesis Commands - 合成相关命令

use std::collections::BTreeMap;

use crate::application::ports::{JobKind, SegmentSpec, SpeakerSpec};
use crate::domain::SynthesisSettings;

/// 提交批量合成命令
#[derive(Debug, Clone)]
pub struct SubmitSynthesisCommand {
    pub segments: Vec<SegmentSpec>,
    pub settings: SynthesisSettings,
}

/// 提交播客合成命令
#[derive(Debug, Clone)]
pub struct SubmitPodcastCommand {
    pub script: String,
    pub speakers: BTreeMap<String, SpeakerSpec>,
    pub settings: SynthesisSettings,
}

/// 提交响应
#[derive(Debug, Clone)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub kind: JobKind,
}
