//! Model Manager - 按身份键记忆的模型实例表

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::instance::ModelInstance;
use super::registry::AdapterRegistry;
use crate::application::ports::{ModelRegistryPort, ModelRuntimePort};
use crate::domain::Value;

/// 模型实例管理器
pub struct ModelManager {
    registry: Arc<AdapterRegistry>,
    instances: DashMap<String, Arc<ModelInstance>>,
    call_timeout: Option<Duration>,
}

impl ModelManager {
    pub fn new(registry: AdapterRegistry, call_timeout: Option<Duration>) -> Self {
        Self {
            registry: Arc::new(registry),
            instances: DashMap::new(),
            call_timeout,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }
}

/// 自动生成的实例键：`<kind>_<毫秒时间戳>_<随机后缀>`
fn generate_key(kind: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", kind, Utc::now().timestamp_millis(), &random[..7])
}

#[async_trait]
impl ModelRegistryPort for ModelManager {
    fn get_or_create(&self, kind: &str, id: Option<&str>, config: Value) -> Arc<dyn ModelRuntimePort> {
        let key = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_key(kind),
        };

        let instance: Arc<ModelInstance> = self
            .instances
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::info!(id = %key, kind = %kind, "Registering model instance");
                Arc::new(ModelInstance::new(
                    key.clone(),
                    kind,
                    config,
                    Arc::clone(&self.registry),
                    self.call_timeout,
                ))
            })
            .clone();
        instance as Arc<dyn ModelRuntimePort>
    }

    async fn dispose_model(&self, id: &str) -> bool {
        match self.instances.remove(id) {
            Some((_, instance)) => {
                instance.dispose().await;
                true
            }
            None => false,
        }
    }

    async fn dispose_all(&self) {
        let keys: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for key in &keys {
            if let Some((_, instance)) = self.instances.remove(key) {
                instance.dispose().await;
            }
        }
        if !keys.is_empty() {
            tracing::info!(count = keys.len(), "All model instances disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::FakeInferenceBackend;

    fn manager() -> ModelManager {
        let registry = AdapterRegistry::standard(Arc::new(FakeInferenceBackend::default()));
        ModelManager::new(registry, None)
    }

    #[test]
    fn test_same_id_returns_same_instance() {
        let manager = manager();
        let a = manager.get_or_create("f5tts", Some("ttsEngine"), Value::Null);
        let b = manager.get_or_create("f5tts", Some("ttsEngine"), Value::Null);
        assert_eq!(a.id(), "ttsEngine");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let manager = manager();
        let a = manager.get_or_create("transcriber", None, Value::Null);
        let b = manager.get_or_create("transcriber", None, Value::Null);
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("transcriber_"));
        assert_eq!(a.id().split('_').count(), 3);
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_dispose_model_removes_entry() {
        let manager = manager();
        let instance = manager.get_or_create("transcriber", Some("asr"), Value::Null);
        instance.initialize().await.unwrap();

        assert!(manager.dispose_model("asr").await);
        assert!(!manager.contains("asr"));
        assert!(!manager.dispose_model("asr").await);

        // 新键创建新实例
        let fresh = manager.get_or_create("transcriber", Some("asr"), Value::Null);
        assert!(!Arc::ptr_eq(&instance, &fresh));
        manager.dispose_all().await;
        assert!(manager.is_empty());
    }
}
