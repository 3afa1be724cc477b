//! Transcriber Adapter - 参考音频转写
//!
//! 输入 {audio, sample_rate}，运行 `transcribe` 阶段，输出文本

use std::cell::Cell;
use std::sync::Arc;

use async_trait::async_trait;

use super::adapter::{invalid_input, ModelAdapter, MODEL_ERROR, NOT_LOADED_ERROR};
use crate::application::ports::{
    take_output, InferenceBackendPort, NamedTensors, RemoteError, INITIALIZE_EVENT,
};
use crate::domain::{Progress, Tensor, Value};
use crate::infrastructure::rpc::EventEmitter;

const DEFAULT_SAMPLE_RATE: i64 = 24000;

pub struct TranscriberAdapter {
    backend: Arc<dyn InferenceBackendPort>,
    emitter: EventEmitter,
    loaded: Cell<bool>,
}

impl TranscriberAdapter {
    pub fn new(backend: Arc<dyn InferenceBackendPort>, emitter: EventEmitter) -> Self {
        Self {
            backend,
            emitter,
            loaded: Cell::new(false),
        }
    }
}

#[async_trait(?Send)]
impl ModelAdapter for TranscriberAdapter {
    async fn initialize(&self) -> Result<(), RemoteError> {
        self.emitter.emit(
            INITIALIZE_EVENT,
            Progress::new(0.0, "Loading transcription model..."),
        );
        self.backend.load().await.map_err(|e| {
            RemoteError::new(MODEL_ERROR, format!("Failed to load transcription model: {}", e))
        })?;
        self.loaded.set(true);
        self.emitter.emit(
            INITIALIZE_EVENT,
            Progress::new(100.0, "Transcriber loaded successfully"),
        );
        Ok(())
    }

    async fn process(&self, input: Value) -> Result<Value, RemoteError> {
        if !self.loaded.get() {
            return Err(RemoteError::new(NOT_LOADED_ERROR, "Model not loaded"));
        }

        let audio = match input.get("audio") {
            Some(Value::Tensor(t)) => t.clone(),
            other => return Err(invalid_input("audio", "a tensor", other)),
        };
        let sample_rate = input
            .get("sample_rate")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        let mut inputs = NamedTensors::new();
        inputs.insert("audio".to_string(), audio);
        inputs.insert("sample_rate".to_string(), Tensor::scalar_i64(sample_rate));

        let mut outputs = self
            .backend
            .run("transcribe", inputs)
            .await
            .map_err(|e| RemoteError::new(MODEL_ERROR, format!("Transcription failed: {}", e)))?;
        let text = take_output(&mut outputs, "text")
            .map_err(|e| RemoteError::new(MODEL_ERROR, e.to_string()))?;

        let bytes = text
            .as_u8()
            .ok_or_else(|| RemoteError::new(MODEL_ERROR, format!("Transcript must be uint8, got {}", text.dtype())))?;
        let transcript = String::from_utf8_lossy(bytes).trim().to_string();

        tracing::debug!(chars = transcript.chars().count(), "Reference audio transcribed");
        Ok(Value::Text(transcript))
    }

    async fn dispose(&self) {
        self.loaded.set(false);
    }
}
