//! F5 TTS Adapter - 分阶段 TTS 推理
//!
//! preprocess → transformer × (nfe_steps - 1) → decode，
//! 前向计算由推理后端完成，这里只负责准备输入和串联各阶段。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;

use super::adapter::{invalid_input, ModelAdapter, INVALID_INPUT_ERROR, MODEL_ERROR, NOT_LOADED_ERROR};
use crate::application::ports::{
    take_output, InferenceBackendPort, NamedTensors, RemoteError, INFERENCE_EVENT, INITIALIZE_EVENT,
};
use crate::domain::silence::rms;
use crate::domain::{Progress, Tensor, TensorData, Value, MAX_NFE_STEPS, MIN_NFE_STEPS};
use crate::infrastructure::rpc::EventEmitter;

const HOP_LENGTH: usize = 256;
const TARGET_RMS: f64 = 0.1;
const INT16_QUANTILE: f64 = 0.999;

/// preprocess 输出，transformer 每步都需要
const ROPE_OUTPUTS: [&str; 6] = [
    "rope_cos_q",
    "rope_sin_q",
    "rope_cos_k",
    "rope_sin_k",
    "cat_mel_text",
    "cat_mel_text_drop",
];

/// 字符表：每行一个 token，行号即 id
#[derive(Debug, Default)]
pub struct Vocab {
    ids: HashMap<String, i32>,
}

impl Vocab {
    pub fn parse(text: &str) -> Self {
        let ids = text
            .split('\n')
            .enumerate()
            .filter_map(|(idx, line)| {
                let token = line.trim_end_matches('\r');
                (!token.is_empty()).then(|| (token.to_string(), idx as i32))
            })
            .collect();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// 文本转 token id；无字符表时使用 Unicode 码位，未知字符为 0
pub fn tokenize(text: &str, vocab: Option<&Vocab>) -> Vec<i32> {
    let mut buf = [0u8; 4];
    text.chars()
        .map(|ch| match vocab {
            Some(vocab) => vocab.ids.get(&*ch.encode_utf8(&mut buf)).copied().unwrap_or(0),
            None => ch as i32,
        })
        .collect()
}

/// 按分位数缩放到 int16 范围
pub fn normalize_to_int16(samples: &[f32], quantile: f64) -> Vec<i16> {
    let max_val = abs_quantile(samples, quantile);
    let scale = if max_val > 0.0 { 32767.0 / max_val } else { 1.0 };
    samples
        .iter()
        .map(|&s| (s as f64 * scale).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// |x| 的分位数（线性插值）
fn abs_quantile(samples: &[f32], quantile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut abs: Vec<f64> = samples.iter().map(|s| (*s as f64).abs()).collect();
    abs.sort_by(|a, b| a.total_cmp(b));
    let pos = quantile.clamp(0.0, 1.0) * (abs.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    abs[lower] + (abs[upper] - abs[lower]) * frac
}

/// 预估输出帧数
///
/// duration = ref_frames + trunc(ref_frames / (ref_text_len + 1) * gen_text_len / speed)
pub fn estimate_duration(ref_samples: usize, ref_text_len: usize, gen_text_len: usize, speed: f64) -> i64 {
    let ref_frames = (ref_samples / HOP_LENGTH) as f64;
    let extra = (ref_frames / (ref_text_len as f64 + 1.0) * gen_text_len as f64 / speed).trunc();
    (ref_frames + extra) as i64
}

/// 单次推理输入
struct TtsInput {
    ref_audio: Vec<f32>,
    ref_text: String,
    gen_text: String,
    speed: f64,
    nfe_steps: u32,
}

impl TtsInput {
    fn parse(input: Value) -> Result<Self, RemoteError> {
        let ref_audio = match input.get("ref_audio") {
            Some(Value::Tensor(t)) => t
                .clone()
                .into_mono()
                .map_err(|e| RemoteError::new(INVALID_INPUT_ERROR, e.to_string()))?,
            other => return Err(invalid_input("ref_audio", "a tensor", other)),
        };
        let ref_text = match input.get("ref_text") {
            Some(Value::Text(s)) => s.clone(),
            other => return Err(invalid_input("ref_text", "text", other)),
        };
        let gen_text = match input.get("gen_text") {
            Some(Value::Text(s)) => s.clone(),
            other => return Err(invalid_input("gen_text", "text", other)),
        };
        let speed = input.get("speed").and_then(Value::as_f64).unwrap_or(1.0);
        let nfe_steps = match input.get("nfe_steps") {
            None | Some(Value::Null) => 32,
            Some(value) => match value.as_i64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) if (MIN_NFE_STEPS..=MAX_NFE_STEPS).contains(&n) => n,
                _ => return Err(invalid_input("nfe_steps", "an integer in 2..=1024", Some(value))),
            },
        };

        if !(speed > 0.0) {
            return Err(invalid_input("speed", "a positive number", input.get("speed")));
        }

        Ok(Self {
            ref_audio,
            ref_text,
            gen_text,
            speed,
            nfe_steps,
        })
    }
}

/// F5 TTS 适配器
pub struct F5TtsAdapter {
    backend: Arc<dyn InferenceBackendPort>,
    emitter: EventEmitter,
    vocab_path: Option<String>,
    vocab: RefCell<Option<Rc<Vocab>>>,
    loaded: Cell<bool>,
}

impl F5TtsAdapter {
    pub fn new(backend: Arc<dyn InferenceBackendPort>, emitter: EventEmitter) -> Self {
        Self {
            backend,
            emitter,
            vocab_path: None,
            vocab: RefCell::new(None),
            loaded: Cell::new(false),
        }
    }

    /// 从实例配置构建（可选 `vocab_path`）
    pub fn from_config(config: &Value, backend: Arc<dyn InferenceBackendPort>, emitter: EventEmitter) -> Self {
        let mut adapter = Self::new(backend, emitter);
        adapter.vocab_path = config
            .get("vocab_path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        adapter
    }

    fn model_error(stage: &str, err: impl std::fmt::Display) -> RemoteError {
        RemoteError::new(MODEL_ERROR, format!("Stage {} failed: {}", stage, err))
    }

    async fn run_stage(&self, stage: &str, inputs: NamedTensors) -> Result<NamedTensors, RemoteError> {
        self.backend
            .run(stage, inputs)
            .await
            .map_err(|e| Self::model_error(stage, e))
    }
}

#[async_trait(?Send)]
impl ModelAdapter for F5TtsAdapter {
    async fn initialize(&self) -> Result<(), RemoteError> {
        self.emitter
            .emit(INITIALIZE_EVENT, Progress::new(0.0, "Loading TTS model..."));

        if let Some(path) = &self.vocab_path {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                RemoteError::new(MODEL_ERROR, format!("Failed to load models: vocab {}: {}", path, e))
            })?;
            let vocab = Vocab::parse(&text);
            tracing::debug!(path = %path, tokens = vocab.len(), "Vocabulary loaded");
            *self.vocab.borrow_mut() = Some(Rc::new(vocab));
        }

        self.backend
            .load()
            .await
            .map_err(|e| RemoteError::new(MODEL_ERROR, format!("Failed to load models: {}", e)))?;
        self.loaded.set(true);

        self.emitter
            .emit(INITIALIZE_EVENT, Progress::new(100.0, "TTS model loaded successfully"));
        tracing::info!(backend = %self.backend.name(), "F5 TTS model loaded");
        Ok(())
    }

    async fn process(&self, input: Value) -> Result<Value, RemoteError> {
        if !self.loaded.get() {
            return Err(RemoteError::new(NOT_LOADED_ERROR, "F5TTS engine not initialized"));
        }
        let TtsInput {
            mut ref_audio,
            ref_text,
            gen_text,
            speed,
            nfe_steps,
        } = TtsInput::parse(input)?;

        // 音量过低的参考音频先放大到目标 RMS
        let ref_rms = rms(&ref_audio);
        let gain = if ref_rms > 0.0 && ref_rms < TARGET_RMS {
            TARGET_RMS / ref_rms
        } else {
            1.0
        };
        if gain != 1.0 {
            ref_audio.iter_mut().for_each(|s| *s = (*s as f64 * gain) as f32);
        }

        let audio_len = ref_audio.len();
        let audio = Tensor::new(
            vec![1, 1, audio_len],
            TensorData::Int16(normalize_to_int16(&ref_audio, INT16_QUANTILE)),
        )
        .map_err(|e| Self::model_error("preprocess", e))?;

        let vocab = self.vocab.borrow().clone();
        let tokens = tokenize(&format!("{} {}", ref_text, gen_text), vocab.as_deref());
        let token_count = tokens.len();
        let text_ids = Tensor::new(vec![1, token_count], TensorData::Int32(tokens))
            .map_err(|e| Self::model_error("preprocess", e))?;

        let duration = estimate_duration(
            audio_len,
            ref_text.chars().count(),
            gen_text.chars().count(),
            speed,
        );

        tracing::debug!(
            ref_samples = audio_len,
            tokens = token_count,
            duration = duration,
            nfe_steps = nfe_steps,
            "Running F5 inference"
        );

        let mut inputs = NamedTensors::new();
        inputs.insert("audio".to_string(), audio);
        inputs.insert("text_ids".to_string(), text_ids);
        inputs.insert("max_duration".to_string(), Tensor::scalar_i64(duration));
        let mut pre = self.run_stage("preprocess", inputs).await?;

        let mut noise = take_output(&mut pre, "noise").map_err(|e| Self::model_error("preprocess", e))?;
        let ref_signal_len =
            take_output(&mut pre, "ref_signal_len").map_err(|e| Self::model_error("preprocess", e))?;
        let mut shared = NamedTensors::new();
        for name in ROPE_OUTPUTS {
            let tensor = take_output(&mut pre, name).map_err(|e| Self::model_error("preprocess", e))?;
            shared.insert(name.to_string(), tensor);
        }

        let mut time_step = Tensor::new(vec![1], TensorData::Int32(vec![0]))
            .map_err(|e| Self::model_error("transformer", e))?;

        for step in 0..nfe_steps - 1 {
            let mut inputs = shared.clone();
            inputs.insert("noise".to_string(), noise);
            inputs.insert("time_step".to_string(), time_step);
            let mut out = self.run_stage("transformer", inputs).await?;
            noise = take_output(&mut out, "noise").map_err(|e| Self::model_error("transformer", e))?;
            time_step =
                take_output(&mut out, "time_step").map_err(|e| Self::model_error("transformer", e))?;

            let done = step + 1;
            self.emitter.emit(
                INFERENCE_EVENT,
                Progress::new(
                    done as f64 / nfe_steps as f64 * 100.0,
                    format!("NFE Step {}/{}", done, nfe_steps),
                ),
            );
        }

        let mut inputs = NamedTensors::new();
        inputs.insert("noise".to_string(), noise);
        inputs.insert("ref_signal_len".to_string(), ref_signal_len);
        let mut out = self.run_stage("decode", inputs).await?;
        let signal = take_output(&mut out, "generated_signal").map_err(|e| Self::model_error("decode", e))?;

        let undo = 1.0 / gain;
        let samples: Vec<f32> = signal
            .to_f32_vec()
            .into_iter()
            .map(|s| ((s as f64 / 32767.0) * undo) as f32)
            .collect();

        Ok(Value::Tensor(Tensor::waveform(samples)))
    }

    async fn dispose(&self) {
        self.loaded.set(false);
        self.vocab.borrow_mut().take();
        tracing::debug!("F5 TTS engine released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::FakeInferenceBackend;

    #[test]
    fn test_tokenize_without_vocab_uses_code_points() {
        assert_eq!(tokenize("ab 你", None), vec![97, 98, 32, 0x4f60]);
    }

    #[test]
    fn test_tokenize_with_vocab() {
        let vocab = Vocab::parse("a\nb\n\n \nc");
        assert_eq!(tokenize("abcz", Some(&vocab)), vec![0, 1, 4, 0]);
    }

    #[test]
    fn test_estimate_duration() {
        // 2560 采样 = 10 帧，参考文本 4 字符，生成文本 10 字符
        assert_eq!(estimate_duration(2560, 4, 10, 1.0), 30);
        assert_eq!(estimate_duration(2560, 4, 10, 2.0), 20);
    }

    #[test]
    fn test_normalize_to_int16_peak() {
        let samples = vec![0.0, 0.25, -0.5, 0.5];
        let out = normalize_to_int16(&samples, 1.0);
        assert_eq!(out, vec![0, 16384, -32767, 32767]);
    }

    #[tokio::test]
    async fn test_process_emits_nfe_steps() {
        let adapter = F5TtsAdapter::new(Arc::new(FakeInferenceBackend::default()), EventEmitter::detached());
        adapter.initialize().await.unwrap();

        let input = Value::map()
            .with("ref_audio", Tensor::waveform(vec![0.05; 24000]))
            .with("ref_text", "reference words")
            .with("gen_text", "generate this")
            .with("nfe_steps", 4i64);
        let output = adapter.process(input).await.unwrap();
        let waveform = output.into_tensor().unwrap();
        assert_eq!(waveform.dims().len(), 1);
        assert!(waveform.numel() > 0);
    }

    #[tokio::test]
    async fn test_process_before_initialize_fails() {
        let adapter = F5TtsAdapter::new(Arc::new(FakeInferenceBackend::default()), EventEmitter::detached());
        let err = adapter.process(Value::map()).await.unwrap_err();
        assert_eq!(err.name, NOT_LOADED_ERROR);
    }

    #[tokio::test]
    async fn test_out_of_range_nfe_steps_rejected() {
        let adapter = F5TtsAdapter::new(Arc::new(FakeInferenceBackend::default()), EventEmitter::detached());
        adapter.initialize().await.unwrap();

        for steps in [1i64, 1025] {
            let input = Value::map()
                .with("ref_audio", Tensor::waveform(vec![0.05; 2400]))
                .with("ref_text", "reference")
                .with("gen_text", "text")
                .with("nfe_steps", steps);
            let err = adapter.process(input).await.unwrap_err();
            assert_eq!(err.name, INVALID_INPUT_ERROR);
            assert!(err.message.contains("nfe_steps"));
        }
    }

    #[tokio::test]
    async fn test_missing_field_is_invalid_input() {
        let adapter = F5TtsAdapter::new(Arc::new(FakeInferenceBackend::default()), EventEmitter::detached());
        adapter.initialize().await.unwrap();
        let err = adapter
            .process(Value::map().with("ref_text", "x").with("gen_text", "y"))
            .await
            .unwrap_err();
        assert_eq!(err.name, INVALID_INPUT_ERROR);
    }
}
