//! Fake Inference Backend - 用于开发和测试的推理后端
//!
//! 不做真实前向计算：decode 阶段按预估帧数生成固定频率的正弦音，
//! transcribe 阶段返回配置的文本。

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::application::ports::{take_output, BackendError, InferenceBackendPort, NamedTensors};
use crate::domain::{element_count, Tensor, TensorData};

const HOP_LENGTH: usize = 256;
const SAMPLE_RATE: f64 = 24000.0;
const TONE_HZ: f64 = 220.0;
const TONE_AMPLITUDE: f64 = 0.3 * 32767.0;

const ROPE_OUTPUTS: [&str; 6] = [
    "rope_cos_q",
    "rope_sin_q",
    "rope_cos_k",
    "rope_sin_k",
    "cat_mel_text",
    "cat_mel_text_drop",
];

/// Fake 推理后端
#[derive(Debug, Default)]
pub struct FakeInferenceBackend {
    transcript: String,
    failure_marker: Option<String>,
    step_delay: Option<Duration>,
    load_calls: AtomicUsize,
}

impl FakeInferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// transcribe 阶段返回的文本
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = transcript.into();
        self
    }

    /// 文本中包含该标记时 preprocess 失败
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = Some(marker.into());
        self
    }

    /// 每个 transformer 步骤的模拟延迟
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    fn preprocess(&self, mut inputs: NamedTensors) -> Result<NamedTensors, BackendError> {
        let audio = take_output(&mut inputs, "audio")?;
        let text_ids = take_output(&mut inputs, "text_ids")?;
        let max_duration = take_output(&mut inputs, "max_duration")?
            .first_i64()
            .ok_or_else(|| BackendError::InvalidResponse("max_duration must be an integer".to_string()))?;

        if let Some(marker) = &self.failure_marker {
            // 无字符表时 token id 即码位
            let text: String = match text_ids.data() {
                TensorData::Int32(ids) => ids
                    .iter()
                    .filter_map(|&id| char::from_u32(id as u32))
                    .collect(),
                _ => String::new(),
            };
            if text.contains(marker.as_str()) {
                return Err(BackendError::ServiceError(format!(
                    "synthetic failure on text containing '{}'",
                    marker
                )));
            }
        }

        let ref_frames = (audio.numel() / HOP_LENGTH) as i64;
        let frames = max_duration.max(ref_frames).max(0) as usize;

        let mut outputs = NamedTensors::new();
        outputs.insert("noise".to_string(), zeros(vec![1, frames])?);
        outputs.insert("ref_signal_len".to_string(), Tensor::scalar_i64(ref_frames));
        for name in ROPE_OUTPUTS {
            outputs.insert(name.to_string(), zeros(vec![0])?);
        }
        Ok(outputs)
    }

    async fn transformer(&self, mut inputs: NamedTensors) -> Result<NamedTensors, BackendError> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        let noise = take_output(&mut inputs, "noise")?;
        let step = take_output(&mut inputs, "time_step")?.first_i64().unwrap_or(0) as i32;

        let mut outputs = NamedTensors::new();
        outputs.insert("noise".to_string(), noise);
        outputs.insert("time_step".to_string(), tensor(vec![1], TensorData::Int32(vec![step + 1]))?);
        Ok(outputs)
    }

    fn decode(&self, mut inputs: NamedTensors) -> Result<NamedTensors, BackendError> {
        let frames = take_output(&mut inputs, "noise")?.numel();
        let ref_frames = take_output(&mut inputs, "ref_signal_len")?
            .first_i64()
            .unwrap_or(0)
            .max(0) as usize;

        let samples = frames.saturating_sub(ref_frames) * HOP_LENGTH;
        let signal: Vec<f32> = (0..samples)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE;
                (TONE_AMPLITUDE * (2.0 * std::f64::consts::PI * TONE_HZ * t).sin()) as f32
            })
            .collect();

        let mut outputs = NamedTensors::new();
        outputs.insert(
            "generated_signal".to_string(),
            tensor(vec![1, samples], TensorData::Float32(signal))?,
        );
        Ok(outputs)
    }

    fn transcribe(&self) -> Result<NamedTensors, BackendError> {
        let bytes = self.transcript.as_bytes().to_vec();
        let mut outputs = NamedTensors::new();
        outputs.insert("text".to_string(), tensor(vec![bytes.len()], TensorData::Uint8(bytes))?);
        Ok(outputs)
    }
}

fn tensor(dims: Vec<usize>, data: TensorData) -> Result<Tensor, BackendError> {
    Tensor::new(dims, data).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

fn zeros(dims: Vec<usize>) -> Result<Tensor, BackendError> {
    let len = element_count(&dims)
        .ok_or_else(|| BackendError::InvalidResponse(format!("dims {:?} too large", dims)))?;
    tensor(dims, TensorData::Float32(vec![0.0; len]))
}

#[async_trait]
impl InferenceBackendPort for FakeInferenceBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn load(&self) -> Result<(), BackendError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&self, stage: &str, inputs: NamedTensors) -> Result<NamedTensors, BackendError> {
        tracing::trace!(stage = %stage, inputs = inputs.len(), "FakeInferenceBackend: running stage");
        match stage {
            "preprocess" => self.preprocess(inputs),
            "transformer" => self.transformer(inputs).await,
            "decode" => self.decode(inputs),
            "transcribe" => self.transcribe(),
            other => Err(BackendError::UnknownStage(other.to_string())),
        }
    }
}
