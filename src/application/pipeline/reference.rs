//! Reference Preparer - 参考音频准备
//!
//! 解码 → 单声道 → 24 kHz → 去静音 → 截断到最大时长；
//! 参考文本为空时交给转写模型生成。

use std::sync::Arc;

use super::{OUTPUT_SAMPLE_RATE, TRANSCRIBER_MODEL_ID};
use crate::application::error::ApplicationError;
use crate::application::ports::{
    AudioDecoderPort, ModelRegistryPort, ProgressSink, ReferenceFetcherPort, INFERENCE_EVENT,
    INITIALIZE_EVENT, PROGRESS_EVENT, TRANSCRIBER_KIND,
};
use crate::domain::silence::ms_to_samples;
use crate::domain::{remove_silence, Progress, SilenceParams, Tensor, Value};

/// 解码后的多通道音频 → 可用作参考的单声道波形
pub fn prepare_reference(
    decoded: Tensor,
    max_duration_ms: u32,
    silence: &SilenceParams,
) -> Result<Tensor, ApplicationError> {
    let mono = decoded.into_mono()?;
    let before = mono.len();

    let mut samples = remove_silence(&mono, OUTPUT_SAMPLE_RATE, silence)?;
    let max_samples = ms_to_samples(max_duration_ms, OUTPUT_SAMPLE_RATE);
    if samples.len() > max_samples {
        tracing::info!(
            secs = samples.len() as f64 / OUTPUT_SAMPLE_RATE as f64,
            max_ms = max_duration_ms,
            "Reference audio too long, trimming"
        );
        samples.truncate(max_samples);
    }

    if samples.is_empty() {
        return Err(ApplicationError::validation("Reference audio contains no speech"));
    }

    tracing::debug!(before = before, after = samples.len(), "Reference audio prepared");
    Ok(Tensor::waveform(samples))
}

pub struct ReferencePreparer {
    fetcher: Arc<dyn ReferenceFetcherPort>,
    decoder: Arc<dyn AudioDecoderPort>,
    models: Arc<dyn ModelRegistryPort>,
    max_duration_ms: u32,
    silence: SilenceParams,
}

impl ReferencePreparer {
    pub fn new(
        fetcher: Arc<dyn ReferenceFetcherPort>,
        decoder: Arc<dyn AudioDecoderPort>,
        models: Arc<dyn ModelRegistryPort>,
        max_duration_ms: u32,
    ) -> Self {
        Self {
            fetcher,
            decoder,
            models,
            max_duration_ms,
            silence: SilenceParams::for_speech(),
        }
    }

    pub fn with_silence(mut self, silence: SilenceParams) -> Self {
        self.silence = silence;
        self
    }

    /// 读取并准备参考音频
    pub async fn load_audio(&self, source: &str) -> Result<Tensor, ApplicationError> {
        let bytes = self.fetcher.fetch(source).await?;
        let decoded = self.decoder.decode(bytes, OUTPUT_SAMPLE_RATE).await?;
        prepare_reference(decoded, self.max_duration_ms, &self.silence)
    }

    /// 给定参考文本时原样使用，否则转写参考音频
    pub async fn resolve_text(
        &self,
        audio: &Tensor,
        ref_text: Option<&str>,
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<String, ApplicationError> {
        if let Some(text) = ref_text.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(text.to_string());
        }

        let model = self
            .models
            .get_or_create(TRANSCRIBER_KIND, Some(TRANSCRIBER_MODEL_ID), Value::Null);
        model.reset_listeners(None);
        for event in [INITIALIZE_EVENT, INFERENCE_EVENT] {
            let forward = Arc::clone(sink);
            model.on(
                event,
                Arc::new(move |p: &Progress| forward.emit(PROGRESS_EVENT, p.clone())),
            );
        }

        let result = async {
            model.initialize().await?;
            let input = Value::map()
                .with("audio", audio.clone())
                .with("sample_rate", OUTPUT_SAMPLE_RATE);
            Ok::<_, ApplicationError>(model.process(input).await?)
        }
        .await;
        model.reset_listeners(None);

        let text = result?
            .into_text()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ApplicationError::validation("Transcription of reference audio is empty"));
        }
        tracing::info!(chars = text.chars().count(), "Reference text transcribed");
        Ok(text)
    }
}
