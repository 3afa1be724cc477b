//! Reference Fetcher - 读取参考音频
//!
//! http(s) URL 通过 reqwest 下载（固定超时）。
//! 本地路径只在配置了参考目录时可用，且解析后必须位于该目录内。

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::application::ports::{AudioIoError, ReferenceFetcherPort};

/// 参考音频获取器
pub struct HttpReferenceFetcher {
    client: Client,
    timeout_secs: u64,
    /// 本地参考目录（已规范化）；None 时拒绝本地路径
    local_root: Option<PathBuf>,
}

impl HttpReferenceFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, AudioIoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AudioIoError::FetchError(e.to_string()))?;
        Ok(Self {
            client,
            timeout_secs,
            local_root: None,
        })
    }

    /// 允许读取 `root` 目录下的本地参考音频
    pub fn with_local_root(mut self, root: impl AsRef<Path>) -> Result<Self, AudioIoError> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|e| {
            AudioIoError::IoError(format!("reference directory {}: {}", root.display(), e))
        })?;
        if !canonical.is_dir() {
            return Err(AudioIoError::IoError(format!(
                "reference directory {} is not a directory",
                root.display()
            )));
        }
        self.local_root = Some(canonical);
        Ok(self)
    }

    pub fn local_root(&self) -> Option<&Path> {
        self.local_root.as_deref()
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, AudioIoError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AudioIoError::FetchTimeout(self.timeout_secs)
            } else {
                AudioIoError::FetchError(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AudioIoError::FetchError(format!("{}: HTTP {}", url, status)));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                AudioIoError::FetchTimeout(self.timeout_secs)
            } else {
                AudioIoError::FetchError(format!("{}: {}", url, e))
            }
        })?;
        Ok(bytes.to_vec())
    }

    /// 在参考目录内解析本地路径
    ///
    /// 先做词法检查（不触碰文件系统），再用规范化路径排除符号链接逃逸
    async fn resolve_local(&self, source: &str) -> Result<PathBuf, AudioIoError> {
        let Some(root) = self.local_root.as_deref() else {
            return Err(AudioIoError::Forbidden(
                "local reference files are disabled".to_string(),
            ));
        };

        let requested = Path::new(source.strip_prefix("file://").unwrap_or(source));
        let relative = if requested.is_absolute() {
            requested.strip_prefix(root).map_err(|_| outside_root())?
        } else {
            requested
        };
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(outside_root());
        }

        let canonical = tokio::fs::canonicalize(root.join(relative))
            .await
            .map_err(|_| AudioIoError::IoError(format!("reference audio not found: {}", source)))?;
        if !canonical.starts_with(root) {
            return Err(outside_root());
        }
        Ok(canonical)
    }
}

fn outside_root() -> AudioIoError {
    AudioIoError::Forbidden("path is outside the reference directory".to_string())
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[async_trait]
impl ReferenceFetcherPort for HttpReferenceFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, AudioIoError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(AudioIoError::FetchError("Empty reference audio source".to_string()));
        }

        let data = if is_remote(source) {
            self.fetch_url(source).await?
        } else {
            let path = self.resolve_local(source).await?;
            tokio::fs::read(&path)
                .await
                .map_err(|_| AudioIoError::IoError(format!("reference audio unreadable: {}", source)))?
        };

        tracing::debug!(source = %source, size = data.len(), "Reference audio fetched");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher_in(dir: &tempfile::TempDir) -> HttpReferenceFetcher {
        HttpReferenceFetcher::new(5)
            .unwrap()
            .with_local_root(dir.path())
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_local_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("voices")).unwrap();
        std::fs::write(dir.path().join("voices/alice.wav"), b"RIFFdata").unwrap();
        let fetcher = fetcher_in(&dir);

        assert_eq!(fetcher.fetch("voices/alice.wav").await.unwrap(), b"RIFFdata");

        let absolute = dir.path().join("voices/alice.wav");
        let data = fetcher.fetch(absolute.to_str().unwrap()).await.unwrap();
        assert_eq!(data, b"RIFFdata");

        let uri = format!("file://{}", absolute.display());
        assert_eq!(fetcher.fetch(&uri).await.unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn test_local_files_disabled_without_root() {
        let fetcher = HttpReferenceFetcher::new(5).unwrap();
        let result = fetcher.fetch("/etc/passwd").await;
        assert!(matches!(result, Err(AudioIoError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_parent_dir_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_in(&dir);

        for source in ["../secret.wav", "voices/../../secret.wav", "../../../../etc/passwd"] {
            let result = fetcher.fetch(source).await;
            assert!(matches!(result, Err(AudioIoError::Forbidden(_))), "{}", source);
        }
    }

    #[tokio::test]
    async fn test_absolute_path_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("ref.wav");
        std::fs::write(&outside, b"RIFFdata").unwrap();
        let fetcher = fetcher_in(&dir);

        let result = fetcher.fetch(outside.to_str().unwrap()).await;
        assert!(matches!(result, Err(AudioIoError::Forbidden(_))));

        // 不存在的外部文件给出相同的错误
        let result = fetcher.fetch("/definitely/not/here.wav").await;
        assert!(matches!(result, Err(AudioIoError::Forbidden(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("ref.wav");
        std::fs::write(&outside, b"RIFFdata").unwrap();
        std::os::unix::fs::symlink(&outside, dir.path().join("link.wav")).unwrap();

        let result = fetcher_in(&dir).fetch("link.wav").await;
        assert!(matches!(result, Err(AudioIoError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_missing_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = fetcher_in(&dir).fetch("missing.wav").await;
        assert!(matches!(result, Err(AudioIoError::IoError(_))));
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://example.com/a.wav"));
        assert!(!is_remote("/tmp/a.wav"));
    }
}
