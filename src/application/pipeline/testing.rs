//! 编排测试用的脚本化模型与进度记录

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::ports::{
    ListenerId, ModelRegistryPort, ModelRuntimePort, ProgressListener, ProgressSink, RemoteError,
    RpcError, F5TTS_KIND, INFERENCE_EVENT, TRANSCRIBER_KIND,
};
use crate::domain::{Progress, RunState, Tensor, Value};

use super::{TRANSCRIBER_MODEL_ID, TTS_MODEL_ID};

const OUTPUT_LEN: usize = 2400;

pub fn tone(len: usize) -> Vec<f32> {
    (0..len).map(|i| 0.5 * (i as f32 * 0.05).sin()).collect()
}

/// 同步调用监听器的模型：TTS 每块发出 50% 进度并返回固定长度的正弦波，
/// 文本含 "FAIL" 时失败；转写返回固定文本
#[derive(Default)]
pub struct ScriptedModel {
    id: String,
    kind: String,
    listeners: Mutex<Vec<(String, ListenerId, ProgressListener)>>,
    next_listener: AtomicUsize,
    processed: AtomicUsize,
    gen_texts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(id: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn gen_texts(&self) -> Vec<String> {
        self.gen_texts.lock().unwrap().clone()
    }

    pub fn output_len(&self) -> usize {
        OUTPUT_LEN
    }

    fn dispatch(&self, event: &str, progress: Progress) {
        let targets: Vec<ProgressListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _, _)| e == event)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            listener(&progress);
        }
    }
}

#[async_trait]
impl ModelRuntimePort for ScriptedModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    async fn initialize(&self) -> Result<(), RpcError> {
        Ok(())
    }

    async fn process(&self, input: Value) -> Result<Value, RpcError> {
        if self.kind == TRANSCRIBER_KIND {
            self.processed.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Text("transcribed reference".to_string()));
        }

        let text = input.get("gen_text").and_then(Value::as_str).unwrap_or_default().to_string();
        if text.contains("FAIL") {
            return Err(RpcError::Model(RemoteError::new(
                "ModelError",
                format!("synthetic failure on '{}'", text),
            )));
        }
        self.dispatch(INFERENCE_EVENT, Progress::new(50.0, "NFE Step 2/4"));
        self.gen_texts.lock().unwrap().push(text);
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Tensor(Tensor::waveform(tone(OUTPUT_LEN))))
    }

    async fn dispose(&self) {}

    fn on(&self, event: &str, listener: ProgressListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst) as u64);
        self.listeners.lock().unwrap().push((event.to_string(), id, listener));
        id
    }

    fn off(&self, event: &str, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(e, existing, _)| !(e == event && *existing == id));
    }

    fn reset_listeners(&self, event: Option<&str>) {
        let mut listeners = self.listeners.lock().unwrap();
        match event {
            Some(event) => listeners.retain(|(e, _, _)| e != event),
            None => listeners.clear(),
        }
    }
}

#[derive(Default)]
pub struct ScriptedRegistry {
    models: DashMap<String, Arc<ScriptedModel>>,
}

impl ScriptedRegistry {
    fn model(&self, id: &str, kind: &str) -> Arc<ScriptedModel> {
        self.models
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(ScriptedModel::new(id, kind)))
            .clone()
    }

    pub fn tts(&self) -> Arc<ScriptedModel> {
        self.model(TTS_MODEL_ID, F5TTS_KIND)
    }

    pub fn transcriber(&self) -> Arc<ScriptedModel> {
        self.model(TRANSCRIBER_MODEL_ID, TRANSCRIBER_KIND)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[async_trait]
impl ModelRegistryPort for ScriptedRegistry {
    fn get_or_create(&self, kind: &str, id: Option<&str>, _config: Value) -> Arc<dyn ModelRuntimePort> {
        self.model(id.unwrap_or(kind), kind)
    }

    async fn dispose_model(&self, id: &str) -> bool {
        self.models.remove(id).is_some()
    }

    async fn dispose_all(&self) {
        self.models.clear();
    }
}

/// 记录所有进度与状态
#[derive(Default)]
pub struct RecordingSink {
    progress: Mutex<Vec<Progress>>,
    states: Mutex<Vec<RunState>>,
}

impl RecordingSink {
    pub fn values(&self) -> Vec<f64> {
        self.progress.lock().unwrap().iter().map(|p| p.value).collect()
    }

    pub fn last_progress(&self) -> Option<Progress> {
        self.progress.lock().unwrap().last().cloned()
    }

    pub fn last_state(&self) -> Option<RunState> {
        self.states.lock().unwrap().last().copied()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, _event: &str, progress: Progress) {
        self.progress.lock().unwrap().push(progress);
    }

    fn state_changed(&self, state: RunState) {
        self.states.lock().unwrap().push(state);
    }
}
