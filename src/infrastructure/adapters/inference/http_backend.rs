//! HTTP Inference Backend - 调用外部推理服务
//!
//! 实现 InferenceBackendPort，每个阶段一次 HTTP 调用
//!
//! 外部推理 API:
//! POST {base_url}/api/load
//! POST {base_url}/api/infer/{stage}
//! Request/Response: bincode 编码的 WireValue map（name → Tensor），application/octet-stream
//! GET  {base_url}/health

use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::application::ports::{BackendError, InferenceBackendPort, NamedTensors};
use crate::domain::Value;
use crate::infrastructure::rpc::{deserialize, tagged, WireValue};

const OCTET_STREAM: &str = "application/octet-stream";

/// HTTP 推理后端配置
#[derive(Debug, Clone)]
pub struct HttpInferenceBackendConfig {
    /// 推理服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpInferenceBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl HttpInferenceBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 推理后端
pub struct HttpInferenceBackend {
    client: Client,
    config: HttpInferenceBackendConfig,
}

impl HttpInferenceBackend {
    pub fn new(config: HttpInferenceBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn load_url(&self) -> String {
        format!("{}/api/load", self.base())
    }

    fn infer_url(&self, stage: &str) -> String {
        format!("{}/api/infer/{}", self.base(), stage)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base())
    }
}

fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::NetworkError(format!("Cannot connect to inference service: {}", e))
    } else {
        BackendError::NetworkError(e.to_string())
    }
}

/// 编码请求体：name → Tagged Tensor
pub fn encode_tensors(tensors: &NamedTensors) -> Result<Vec<u8>, BackendError> {
    let map: BTreeMap<String, WireValue> = tensors
        .iter()
        .map(|(name, tensor)| (name.clone(), tagged(tensor)))
        .collect();
    bincode::serialize(&WireValue::Map(map))
        .map_err(|e| BackendError::InvalidResponse(format!("Failed to encode request: {}", e)))
}

/// 解码响应体；非张量条目视为无效响应
pub fn decode_tensors(bytes: &[u8]) -> Result<NamedTensors, BackendError> {
    let wire: WireValue = bincode::deserialize(bytes)
        .map_err(|e| BackendError::InvalidResponse(format!("Malformed body: {}", e)))?;
    let WireValue::Map(entries) = wire else {
        return Err(BackendError::InvalidResponse("Body must be a map".to_string()));
    };

    entries
        .into_iter()
        .map(|(name, wire)| {
            match deserialize(wire).map_err(|e| BackendError::InvalidResponse(e.to_string()))? {
                Value::Tensor(tensor) => Ok((name, tensor)),
                other => Err(BackendError::InvalidResponse(format!(
                    "Output '{}' is {}, expected tensor",
                    name,
                    other.kind()
                ))),
            }
        })
        .collect()
}

#[async_trait]
impl InferenceBackendPort for HttpInferenceBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn load(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.load_url())
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::ServiceError(format!("HTTP {}: {}", status, error_text)));
        }
        tracing::info!(url = %self.base(), "Inference backend loaded");
        Ok(())
    }

    async fn run(&self, stage: &str, inputs: NamedTensors) -> Result<NamedTensors, BackendError> {
        let body = encode_tensors(&inputs)?;

        tracing::debug!(
            url = %self.infer_url(stage),
            inputs = inputs.len(),
            body_size = body.len(),
            "Sending inference request"
        );

        let response = self
            .client
            .post(self.infer_url(stage))
            .header(reqwest::header::CONTENT_TYPE, OCTET_STREAM)
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::UnknownStage(stage.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::ServiceError(format!("HTTP {}: {}", status, error_text)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to read body: {}", e)))?;
        let outputs = decode_tensors(&bytes)?;

        tracing::debug!(stage = %stage, outputs = outputs.len(), "Inference stage completed");
        Ok(outputs)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Tensor, TensorData};

    #[test]
    fn test_config_builder() {
        let config = HttpInferenceBackendConfig::new("http://example.com:9000/").with_timeout(60);
        assert_eq!(config.timeout_secs, 60);

        let backend = HttpInferenceBackend::new(config).unwrap();
        assert_eq!(backend.infer_url("decode"), "http://example.com:9000/api/infer/decode");
        assert_eq!(backend.health_url(), "http://example.com:9000/health");
    }

    #[test]
    fn test_body_codec() {
        let mut tensors = NamedTensors::new();
        tensors.insert(
            "text_ids".to_string(),
            Tensor::new(vec![1, 3], TensorData::Int32(vec![7, 8, 9])).unwrap(),
        );
        tensors.insert("max_duration".to_string(), Tensor::scalar_i64(42));

        let bytes = encode_tensors(&tensors).unwrap();
        let decoded = decode_tensors(&bytes).unwrap();
        assert_eq!(decoded, tensors);
    }

    #[test]
    fn test_non_tensor_output_rejected() {
        let mut map = BTreeMap::new();
        map.insert("text".to_string(), WireValue::Text("oops".to_string()));
        let bytes = bincode::serialize(&WireValue::Map(map)).unwrap();
        assert!(matches!(
            decode_tensors(&bytes),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let backend = HttpInferenceBackend::new(
            HttpInferenceBackendConfig::new("http://127.0.0.1:1").with_timeout(2),
        )
        .unwrap();
        assert!(!backend.health_check().await);
        assert!(matches!(
            backend.run("preprocess", NamedTensors::new()).await,
            Err(BackendError::NetworkError(_)) | Err(BackendError::Timeout)
        ));
    }
}
