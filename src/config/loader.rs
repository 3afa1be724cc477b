//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, BackendKind};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "CLONECAST";

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `CLONECAST_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `CLONECAST_SERVER__PORT=8080`
/// - `CLONECAST_INFERENCE__BACKEND=fake`
/// - `CLONECAST_INFERENCE__URL=http://f5-tts:8000`
/// - `CLONECAST_RPC__CALL_TIMEOUT_SECS=300`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5070)?
        .set_default("inference.backend", "http")?
        .set_default("inference.url", "http://localhost:8000")?
        .set_default("inference.timeout_secs", 120)?
        .set_default("reference.max_duration_ms", 10_000)?
        .set_default("reference.fetch_timeout_secs", 30)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // 4. 构建并反序列化
    let config = builder.build()?;
    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    // 5. 验证配置
    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.server.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "Job queue capacity cannot be 0".to_string(),
        ));
    }

    if config.inference.backend == BackendKind::Http && config.inference.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Inference URL cannot be empty for the http backend".to_string(),
        ));
    }

    if config.rpc.call_timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "RPC call timeout cannot be 0 (omit it to disable)".to_string(),
        ));
    }

    config
        .synthesis
        .silence_params()
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    if let Some(dir) = &config.reference.local_dir {
        if dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Reference local dir cannot be empty (omit it to disable)".to_string(),
            ));
        }
    }

    if config.jobs.ttl_secs == 0 || config.jobs.max_finished == 0 {
        return Err(ConfigError::ValidationError(
            "Finished jobs must be kept for at least 1s and 1 entry".to_string(),
        ));
    }

    if config.jobs.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Job sweep interval cannot be 0".to_string(),
        ));
    }

    if config.reference.max_duration_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Reference max duration cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Job Queue Capacity: {}", config.server.queue_capacity);
    tracing::info!("Inference Backend: {}", config.inference.backend.as_str());
    if config.inference.backend == BackendKind::Http {
        tracing::info!("Inference URL: {}", config.inference.url);
        tracing::info!("Inference Timeout: {}s", config.inference.timeout_secs);
    }
    tracing::info!(
        "Vocabulary: {}",
        config.inference.vocab_path.as_deref().unwrap_or("<unicode code points>")
    );
    match config.rpc.call_timeout_secs {
        Some(secs) => tracing::info!("RPC Call Timeout: {}s", secs),
        None => tracing::info!("RPC Call Timeout: disabled"),
    }
    tracing::info!(
        "Silence: min={}ms thresh={}dB step={}ms pad={}ms",
        config.synthesis.min_silence_ms,
        config.synthesis.silence_thresh_db,
        config.synthesis.seek_step_ms,
        config.synthesis.pad_ms
    );
    tracing::info!("Reference Max Duration: {}ms", config.reference.max_duration_ms);
    tracing::info!(
        "Reference Local Dir: {}",
        config.reference.local_dir.as_deref().unwrap_or("<disabled>")
    );
    tracing::info!(
        "Finished Jobs: ttl={}s max={} sweep={}s",
        config.jobs.ttl_secs,
        config.jobs.max_finished,
        config.jobs.sweep_interval_secs
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_inference_url() {
        let mut config = AppConfig::default();
        config.inference.url = String::new();
        assert!(validate_config(&config).is_err());

        // fake 后端不需要 URL
        config.inference.backend = BackendKind::Fake;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_large_padding() {
        let mut config = AppConfig::default();
        config.synthesis.pad_ms = config.synthesis.min_silence_ms / 2;
        assert!(validate_config(&config).is_err());

        config.synthesis.pad_ms -= 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_call_timeout() {
        let mut config = AppConfig::default();
        config.rpc.call_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_job_retention() {
        let mut config = AppConfig::default();
        config.jobs.max_finished = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.jobs.sweep_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9001

[inference]
backend = "fake"
vocab_path = "/models/vocab.txt"

[rpc]
call_timeout_secs = 300

[synthesis]
pad_ms = 100

[reference]
local_dir = "/srv/voices"
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.inference.backend, BackendKind::Fake);
        assert_eq!(config.inference.vocab_path.as_deref(), Some("/models/vocab.txt"));
        assert_eq!(config.rpc.call_timeout_secs, Some(300));
        assert_eq!(config.synthesis.pad_ms, 100);
        assert_eq!(config.synthesis.min_silence_ms, 800);
        assert_eq!(config.reference.local_dir.as_deref(), Some("/srv/voices"));
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[synthesis]\nmin_silence_ms = 100\npad_ms = 50").unwrap();

        let err = load_config_from_path(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
