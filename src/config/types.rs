//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;

use crate::domain::SilenceParams;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 推理后端配置
    #[serde(default)]
    pub inference: InferenceConfig,

    /// 模型执行上下文配置
    #[serde(default)]
    pub rpc: RpcConfig,

    /// 合成配置
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// 参考音频配置
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// 已结束任务保留配置
    #[serde(default)]
    pub jobs: JobsConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 请求体上限（字节）
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// 任务队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024 // 2 MB
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 推理后端类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 远程 HTTP 推理服务
    #[default]
    Http,
    /// 本地确定性正弦波（开发与测试）
    Fake,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Http => "http",
            BackendKind::Fake => "fake",
        }
    }
}

/// 推理后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// 推理服务基础 URL
    #[serde(default = "default_inference_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// 词表文件（每行一个 token）；未设置时按 Unicode 码点编码
    #[serde(default)]
    pub vocab_path: Option<String>,
}

fn default_inference_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_inference_timeout() -> u64 {
    120
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            url: default_inference_url(),
            timeout_secs: default_inference_timeout(),
            vocab_path: None,
        }
    }
}

/// 模型执行上下文配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcConfig {
    /// 单次调用超时（秒），未设置时不限时
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

/// 合成配置：拼接后去静音参数
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_min_silence")]
    pub min_silence_ms: u32,

    #[serde(default = "default_silence_thresh")]
    pub silence_thresh_db: f64,

    #[serde(default = "default_seek_step")]
    pub seek_step_ms: u32,

    #[serde(default = "default_pad")]
    pub pad_ms: u32,
}

fn default_min_silence() -> u32 {
    SilenceParams::for_speech().min_silence_ms
}

fn default_silence_thresh() -> f64 {
    SilenceParams::for_speech().silence_thresh_db
}

fn default_seek_step() -> u32 {
    SilenceParams::for_speech().seek_step_ms
}

fn default_pad() -> u32 {
    SilenceParams::for_speech().pad_ms
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_silence_ms: default_min_silence(),
            silence_thresh_db: default_silence_thresh(),
            seek_step_ms: default_seek_step(),
            pad_ms: default_pad(),
        }
    }
}

impl SynthesisConfig {
    pub fn silence_params(&self) -> SilenceParams {
        SilenceParams {
            min_silence_ms: self.min_silence_ms,
            silence_thresh_db: self.silence_thresh_db,
            seek_step_ms: self.seek_step_ms,
            pad_ms: self.pad_ms,
        }
    }
}

/// 参考音频配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// 参考音频最大时长（毫秒）
    #[serde(default = "default_max_reference")]
    pub max_duration_ms: u32,

    /// 远程参考音频获取超时（秒）
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// 允许读取本地参考音频的目录；未设置时只接受 http(s) URL
    #[serde(default)]
    pub local_dir: Option<String>,
}

fn default_max_reference() -> u32 {
    10_000
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: default_max_reference(),
            fetch_timeout_secs: default_fetch_timeout(),
            local_dir: None,
        }
    }
}

/// 已结束任务保留配置（合成产物驻留内存）
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// 结束后保留时长（秒）
    #[serde(default = "default_job_ttl")]
    pub ttl_secs: u64,

    /// 最多保留的已结束任务数
    #[serde(default = "default_max_finished")]
    pub max_finished: usize,

    /// TTL 清理间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_job_ttl() -> u64 {
    3600 // 1 小时
}

fn default_max_finished() -> usize {
    64
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_job_ttl(),
            max_finished: default_max_finished(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5070);
        assert_eq!(config.inference.backend, BackendKind::Http);
        assert_eq!(config.inference.url, "http://localhost:8000");
        assert_eq!(config.rpc.call_timeout_secs, None);
        assert_eq!(config.reference.max_duration_ms, 10_000);
        assert_eq!(config.reference.local_dir, None);
        assert_eq!(config.jobs.ttl_secs, 3600);
        assert_eq!(config.jobs.max_finished, 64);
    }

    #[test]
    fn test_server_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:5070");
    }

    #[test]
    fn test_default_silence_is_speech_preset() {
        assert_eq!(
            SynthesisConfig::default().silence_params(),
            SilenceParams::for_speech()
        );
    }
}
