//! Audio I/O Port - 音频解码、编码与参考音频获取

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Tensor;

/// 音频 I/O 错误
#[derive(Debug, Error)]
pub enum AudioIoError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("Fetch timed out after {0}s")]
    FetchTimeout(u64),

    #[error("IO error: {0}")]
    IoError(String),

    /// 来源不在允许范围内（本地读取未开启或路径越出参考目录）
    #[error("Reference source rejected: {0}")]
    Forbidden(String),
}

/// Audio Decoder Port
///
/// 返回 `[channels, samples]` 的 float32 张量，已重采样到目标采样率
#[async_trait]
pub trait AudioDecoderPort: Send + Sync {
    async fn decode(&self, data: Vec<u8>, target_rate: u32) -> Result<Tensor, AudioIoError>;
}

/// Audio Encoder Port
///
/// 单声道 float32 波形编码为可下载的音频文件
pub trait AudioEncoderPort: Send + Sync {
    /// MIME 类型
    fn content_type(&self) -> &'static str;

    fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioIoError>;
}

/// Reference Fetcher Port
///
/// 从 URL 或本地路径读取参考音频；网络获取带固定超时
#[async_trait]
pub trait ReferenceFetcherPort: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, AudioIoError>;
}
