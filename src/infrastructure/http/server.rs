//! HTTP Server
//!
//! 组装合成 API：路由 + 请求体上限 + 错误日志 + 请求追踪 + CORS，
//! 绑定监听地址后带优雅关闭运行

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::error_logging_middleware;
use super::routes::create_routes;
use super::state::AppState;
use crate::config::ServerConfig as ServerSettings;

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 合成/播客请求体上限（字节）
    pub body_limit: usize,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, body_limit: usize) -> Self {
        Self {
            host: host.into(),
            port,
            body_limit,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self::new(&settings.host, settings.port, settings.body_limit_bytes)
    }
}

/// 完整的 API Router（已注入状态）
pub fn build_router(state: Arc<AppState>, body_limit: usize) -> Router {
    // 前端页面跨域访问任务状态与 WebSocket
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers(Any)
        .max_age(Duration::from_secs(3600));

    create_routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(error_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP 服务器（已绑定监听地址）
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// 绑定监听地址，端口为 0 时由系统分配
    pub async fn bind(config: &ServerConfig, state: AppState) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(config.addr()).await?;
        Ok(Self {
            listener,
            router: build_router(Arc::new(state), config.body_limit),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// 运行直到 shutdown_signal 完成，进行中的请求处理完后返回
    pub async fn run_with_shutdown<F>(self, shutdown_signal: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!(addr = %addr, "HTTP server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!(addr = %addr, "HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::WavEncoder;
    use crate::infrastructure::events::EventPublisher;
    use crate::infrastructure::memory::InMemoryJobManager;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio::sync::{mpsc, oneshot};
    use tower::util::ServiceExt;

    fn state() -> (AppState, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(10);
        let state = AppState::new(
            InMemoryJobManager::new(tx).arc(),
            Arc::new(WavEncoder),
            EventPublisher::new().arc(),
        );
        (state, rx)
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ServerSettings {
            port: 8088,
            body_limit_bytes: 4096,
            ..Default::default()
        };
        let config = ServerConfig::from(&settings);
        assert_eq!(config.addr(), "0.0.0.0:8088");
        assert_eq!(config.body_limit, 4096);
    }

    #[tokio::test]
    async fn test_oversized_submission_rejected() {
        let (state, mut rx) = state();
        let router = build_router(Arc::new(state), 256);

        let gen_text = "word ".repeat(200);
        let body = serde_json::json!({
            "segments": [{"ref_audio_url": "https://refs.example/a.wav", "gen_text": gen_text}]
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/synthesize")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let (state, _rx) = state();
        let server = HttpServer::bind(&ServerConfig::new("127.0.0.1", 0, 1024), state)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_with_shutdown(async move {
            let _ = stop_rx.await;
        }));

        let response = reqwest::Client::new()
            .get(format!("http://{}/api/ping", addr))
            .header("Origin", "http://studio.example")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        drop(response);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
