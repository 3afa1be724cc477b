//! Model Instance - 一个已加载模型的调用方句柄
//!
//! 执行上下文在第一次 initialize/process 时才创建。
//! 就绪结果（成功或失败）只计算一次，之后的调用者共享同一结果。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::registry::AdapterRegistry;
use crate::application::ports::{ListenerId, ModelRuntimePort, ProgressListener, RpcError};
use crate::domain::Value;
use crate::infrastructure::rpc::{ListenerSet, RpcChannel};

pub struct ModelInstance {
    id: String,
    kind: String,
    config: Value,
    registry: Arc<AdapterRegistry>,
    call_timeout: Option<Duration>,
    listeners: Arc<ListenerSet>,
    channel: OnceCell<Result<RpcChannel, RpcError>>,
    ready: OnceCell<Result<(), RpcError>>,
    disposed: AtomicBool,
}

impl ModelInstance {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        config: Value,
        registry: Arc<AdapterRegistry>,
        call_timeout: Option<Duration>,
    ) -> Self {
        let id = id.into();
        let kind = kind.into();
        tracing::debug!(id = %id, kind = %kind, "Model instance created");
        Self {
            id,
            kind,
            config,
            registry,
            call_timeout,
            listeners: Arc::new(ListenerSet::new()),
            channel: OnceCell::new(),
            ready: OnceCell::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// 执行上下文是否已创建
    pub fn is_started(&self) -> bool {
        self.channel.initialized()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }

    async fn channel(&self) -> Result<&RpcChannel, RpcError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(RpcError::Disposed);
        }
        let result = self
            .channel
            .get_or_init(|| async {
                RpcChannel::spawn(
                    &self.id,
                    Arc::clone(&self.registry),
                    Arc::clone(&self.listeners),
                    self.call_timeout,
                )
            })
            .await;
        result.as_ref().map_err(Clone::clone)
    }
}

#[async_trait]
impl ModelRuntimePort for ModelInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    async fn initialize(&self) -> Result<(), RpcError> {
        let channel = self.channel().await?;
        self.ready
            .get_or_init(|| async {
                tracing::info!(id = %self.id, kind = %self.kind, "Initializing model");
                let result = channel.initialize(&self.kind, &self.config).await;
                match &result {
                    Ok(()) => tracing::info!(id = %self.id, "Model ready"),
                    Err(e) => tracing::error!(id = %self.id, error = %e, "Model initialization failed"),
                }
                result
            })
            .await
            .clone()
    }

    async fn process(&self, input: Value) -> Result<Value, RpcError> {
        self.initialize().await?;
        let channel = self.channel().await?;
        channel.process(&input).await
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(Ok(channel)) = self.channel.get() {
            channel.dispose();
        }
        self.listeners.clear(None);
        tracing::info!(id = %self.id, kind = %self.kind, "Model instance disposed");
    }

    fn on(&self, event: &str, listener: ProgressListener) -> ListenerId {
        self.listeners.add(event, listener)
    }

    fn off(&self, event: &str, id: ListenerId) {
        self.listeners.remove(event, id);
    }

    fn reset_listeners(&self, event: Option<&str>) {
        self.listeners.clear(event);
    }
}
