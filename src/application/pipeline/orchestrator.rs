//! Synthesis Orchestrator - 批量/播客合成编排
//!
//! 状态机：Idle → Chunking → Running(i/n) → Stitching → Done，
//! 任一块失败 → Failed，不返回部分结果。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{report_failure, OUTPUT_SAMPLE_RATE, TTS_MODEL_ID};
use crate::application::error::ApplicationError;
use crate::application::ports::{
    ModelRegistryPort, ModelRuntimePort, ProgressSink, F5TTS_KIND, INFERENCE_EVENT,
    INITIALIZE_EVENT, PROGRESS_EVENT,
};
use crate::domain::{
    chunk_budget, empty_segment, global_progress, parse_script, remove_silence,
    split_text_into_chunks, Progress, RunState, Segment, SilenceParams, SynthesisSettings, Tensor,
    Value,
};

/// 说话人的参考数据（已准备好的 24 kHz 单声道音频 + 参考文本）
#[derive(Debug, Clone)]
pub struct ReferenceVoice {
    pub audio: Tensor,
    pub text: String,
}

/// 每个 Segment 的生成文本分块
pub fn plan_chunks(
    segments: &[Segment],
    settings: &SynthesisSettings,
) -> Result<Vec<Vec<String>>, ApplicationError> {
    let split_words = settings.split_words();
    segments
        .iter()
        .map(|segment| {
            if !settings.enable_chunking {
                let text = segment.gen_text().trim();
                return Ok(if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                });
            }
            let budget = chunk_budget(
                segment.ref_text(),
                segment.ref_audio_secs(OUTPUT_SAMPLE_RATE),
                settings.max_output_secs,
                settings.speed,
                settings.min_chunk_chars,
            );
            Ok(split_text_into_chunks(segment.gen_text(), budget, &split_words)?)
        })
        .collect()
}

pub struct SynthesisOrchestrator {
    models: Arc<dyn ModelRegistryPort>,
    tts_config: Value,
    silence: SilenceParams,
}

impl SynthesisOrchestrator {
    pub fn new(models: Arc<dyn ModelRegistryPort>, tts_config: Value) -> Self {
        Self {
            models,
            tts_config,
            silence: SilenceParams::for_speech(),
        }
    }

    /// 替换拼接后去静音使用的参数
    pub fn with_silence(mut self, silence: SilenceParams) -> Self {
        self.silence = silence;
        self
    }

    /// 批量合成，每个 Segment 输出一段波形
    pub async fn run_batch(
        &self,
        segments: Vec<Segment>,
        settings: &SynthesisSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<Vec<f32>>, ApplicationError> {
        let model = self.tts_model();
        let result = self.batch(&model, &segments, settings, &sink).await;
        model.reset_listeners(None);
        if let Err(err) = &result {
            report_failure(sink.as_ref(), err);
        }
        result
    }

    /// 播客合成：解析脚本，逐轮合成，轮次之间插入停顿
    pub async fn run_podcast(
        &self,
        script: &str,
        speakers: &BTreeMap<String, ReferenceVoice>,
        settings: &SynthesisSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<f32>, ApplicationError> {
        let segments = match podcast_segments(script, speakers) {
            Ok(segments) => segments,
            Err(err) => {
                report_failure(sink.as_ref(), &err);
                return Err(err);
            }
        };

        let turns = self.run_batch(segments, settings, sink).await?;
        let pause = empty_segment(settings.pause_ms, OUTPUT_SAMPLE_RATE);
        Ok(join_with_pause(turns, &pause))
    }

    fn tts_model(&self) -> Arc<dyn ModelRuntimePort> {
        self.models
            .get_or_create(F5TTS_KIND, Some(TTS_MODEL_ID), self.tts_config.clone())
    }

    async fn batch(
        &self,
        model: &Arc<dyn ModelRuntimePort>,
        segments: &[Segment],
        settings: &SynthesisSettings,
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<Vec<Vec<f32>>, ApplicationError> {
        settings.validate().map_err(ApplicationError::validation)?;

        model.reset_listeners(None);
        let forward = Arc::clone(sink);
        model.on(
            INITIALIZE_EVENT,
            Arc::new(move |p: &Progress| forward.emit(PROGRESS_EVENT, p.clone())),
        );
        model.initialize().await?;

        sink.state_changed(RunState::Chunking);
        let plans = plan_chunks(segments, settings)?;
        let total: usize = plans.iter().map(Vec::len).sum();
        if total == 0 {
            return Err(ApplicationError::validation("Nothing to synthesize"));
        }

        let completed = Arc::new(AtomicUsize::new(0));
        {
            let forward = Arc::clone(sink);
            let completed = Arc::clone(&completed);
            model.on(
                INFERENCE_EVENT,
                Arc::new(move |p: &Progress| {
                    let value = global_progress(completed.load(Ordering::SeqCst), p.value / 100.0, total);
                    forward.emit(PROGRESS_EVENT, Progress::new(value, p.message.clone()));
                }),
            );
        }

        tracing::info!(segments = segments.len(), chunks = total, "Starting synthesis run");
        sink.emit(PROGRESS_EVENT, Progress::new(0.0, "Generating audio..."));

        let mut raw: Vec<Vec<f32>> = Vec::with_capacity(segments.len());
        for (segment, chunks) in segments.iter().zip(&plans) {
            let mut joined = Vec::new();
            for chunk in chunks {
                let current = completed.load(Ordering::SeqCst) + 1;
                sink.state_changed(RunState::Running { current, total });
                tracing::debug!(current = current, total = total, chars = chunk.chars().count(), "Processing chunk");

                let input = Value::map()
                    .with("ref_audio", segment.ref_audio().clone())
                    .with("ref_text", segment.ref_text())
                    .with("gen_text", chunk.as_str())
                    .with("speed", settings.speed)
                    .with("nfe_steps", settings.nfe_steps);
                let output = model.process(input).await?;
                let waveform = output
                    .into_tensor()
                    .ok_or_else(|| ApplicationError::internal("TTS result is not a tensor"))?
                    .into_mono()?;
                joined.extend(waveform);
                completed.fetch_add(1, Ordering::SeqCst);
            }
            raw.push(joined);
        }

        sink.state_changed(RunState::Stitching);
        let params = self.silence;
        let results = raw
            .iter()
            .map(|samples| remove_silence(samples, OUTPUT_SAMPLE_RATE, &params))
            .collect::<Result<Vec<_>, _>>()?;

        sink.emit(PROGRESS_EVENT, Progress::new(100.0, "Generation complete!"));
        sink.state_changed(RunState::Done);
        tracing::info!(
            segments = results.len(),
            samples = results.iter().map(Vec::len).sum::<usize>(),
            "Synthesis run complete"
        );
        Ok(results)
    }
}

/// 脚本行 → Segment；缺少参考音频的说话人被跳过
fn podcast_segments(
    script: &str,
    speakers: &BTreeMap<String, ReferenceVoice>,
) -> Result<Vec<Segment>, ApplicationError> {
    let names: Vec<&str> = speakers.keys().map(String::as_str).collect();
    let lines = parse_script(script, &names)
        .map_err(|e| ApplicationError::validation(format!("Invalid speaker names: {}", e)))?;

    let segments: Vec<Segment> = lines
        .into_iter()
        .filter_map(|line| match speakers.get(&line.speaker) {
            Some(voice) if voice.audio.numel() > 0 => Some(Segment::new(
                voice.audio.clone(),
                voice.text.clone(),
                line.text,
            )),
            _ => {
                tracing::warn!(speaker = %line.speaker, "Speaker has no reference audio, line skipped");
                None
            }
        })
        .collect();

    if segments.is_empty() {
        return Err(ApplicationError::validation("No audio segments generated"));
    }
    Ok(segments)
}

fn join_with_pause(turns: Vec<Vec<f32>>, pause: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(turns.iter().map(|t| t.len() + pause.len()).sum());
    for (i, turn) in turns.into_iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(pause);
        }
        out.extend(turn);
    }
    out
}
