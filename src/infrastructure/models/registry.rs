//! Adapter Registry - 适配器类型注册表
//!
//! 启动时登记一次，之后只读

use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::ModelAdapter;
use super::f5tts::F5TtsAdapter;
use super::transcriber::TranscriberAdapter;
use crate::application::ports::{InferenceBackendPort, RemoteError, F5TTS_KIND, TRANSCRIBER_KIND};
use crate::domain::Value;
use crate::infrastructure::rpc::EventEmitter;

/// 适配器工厂：在执行上下文内以 (config, emitter) 构建适配器
pub type AdapterFactory =
    Arc<dyn Fn(&Value, EventEmitter) -> Result<Box<dyn ModelAdapter>, RemoteError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 标准注册表：f5tts + transcriber，共用同一个推理后端
    pub fn standard(backend: Arc<dyn InferenceBackendPort>) -> Self {
        let tts_backend = Arc::clone(&backend);
        Self::new()
            .register(F5TTS_KIND, move |config, emitter| {
                let adapter: Box<dyn ModelAdapter> = Box::new(F5TtsAdapter::from_config(
                    config,
                    Arc::clone(&tts_backend),
                    emitter,
                ));
                Ok(adapter)
            })
            .register(TRANSCRIBER_KIND, move |_config, emitter| {
                let adapter: Box<dyn ModelAdapter> =
                    Box::new(TranscriberAdapter::new(Arc::clone(&backend), emitter));
                Ok(adapter)
            })
    }

    pub fn register<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value, EventEmitter) -> Result<Box<dyn ModelAdapter>, RemoteError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn factory(&self, kind: &str) -> Option<AdapterFactory> {
        self.factories.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::FakeInferenceBackend;

    #[test]
    fn test_standard_kinds() {
        let registry = AdapterRegistry::standard(Arc::new(FakeInferenceBackend::default()));
        assert_eq!(registry.kinds(), vec!["f5tts", "transcriber"]);
        assert!(registry.factory("unknown").is_none());
    }
}
