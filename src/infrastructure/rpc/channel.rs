//! RPC Channel - 调用方一侧的请求/响应通道
//!
//! 每个非 Event 消息分配一个递增 id，响应按 id 关联到等待中的调用。
//! 执行上下文发来的 Event 扇出给该事件类型的所有监听器。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use super::host::spawn_host;
use super::message::{Message, MessageKind};
use super::serialization::{deserialize, remote_error_from_wire, serialize, WireValue};
use crate::application::ports::{ListenerId, ProgressListener, RpcError};
use crate::domain::{Progress, Value};
use crate::infrastructure::models::AdapterRegistry;

type Pending = DashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// 按事件类型分组的监听器
#[derive(Default)]
pub struct ListenerSet {
    listeners: DashMap<String, Vec<(ListenerId, ProgressListener)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, listener: ProgressListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove(&self, event: &str, id: ListenerId) {
        if let Some(mut entries) = self.listeners.get_mut(event) {
            entries.retain(|(existing, _)| *existing != id);
        }
    }

    pub fn clear(&self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.listeners.remove(event);
            }
            None => self.listeners.clear(),
        }
    }

    pub fn count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|e| e.len()).unwrap_or(0)
    }

    /// 通知所有监听器
    ///
    /// 先复制监听器列表再调用，监听器内部可以安全地 on/off
    pub fn dispatch(&self, event: &str, progress: &Progress) {
        let targets: Vec<ProgressListener> = match self.listeners.get(event) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        for listener in targets {
            listener(progress);
        }
    }
}

/// RPC 通道
pub struct RpcChannel {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    call_timeout: Option<Duration>,
    disposed: AtomicBool,
}

impl RpcChannel {
    /// 启动执行上下文并建立通道
    ///
    /// 必须在 tokio runtime 内调用（入站路由是一个 tokio 任务）
    pub fn spawn(
        name: &str,
        registry: Arc<AdapterRegistry>,
        listeners: Arc<ListenerSet>,
        call_timeout: Option<Duration>,
    ) -> Result<Self, RpcError> {
        let (to_host, host_inbound) = mpsc::unbounded_channel();
        let (host_outbound, from_host) = mpsc::unbounded_channel();

        spawn_host(format!("model-{}", name), registry, host_inbound, host_outbound)?;

        let pending: Arc<Pending> = Arc::new(DashMap::new());
        tokio::spawn(route_inbound(from_host, Arc::clone(&pending), listeners));

        tracing::debug!(name = %name, "Execution context started");
        Ok(Self {
            outbound: to_host,
            pending,
            next_id: AtomicU64::new(0),
            call_timeout,
            disposed: AtomicBool::new(false),
        })
    }

    /// 发送 Initialize，等待 Ready
    pub async fn initialize(&self, kind: &str, config: &Value) -> Result<(), RpcError> {
        let mut payload = std::collections::BTreeMap::new();
        payload.insert("kind".to_string(), WireValue::Text(kind.to_string()));
        payload.insert("config".to_string(), serialize(config));
        self.call(MessageKind::Initialize, WireValue::Map(payload)).await?;
        Ok(())
    }

    /// 发送 Process，等待 Result
    pub async fn process(&self, input: &Value) -> Result<Value, RpcError> {
        self.call(MessageKind::Process, serialize(input)).await
    }

    async fn call(&self, kind: MessageKind, payload: WireValue) -> Result<Value, RpcError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(RpcError::Disposed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = Message::new(kind, Some(id), payload).encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.outbound.send(bytes).is_err() {
            self.pending.remove(&id);
            return Err(RpcError::Disposed);
        }

        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.remove(&id);
                    tracing::warn!(id = id, kind = ?kind, timeout = ?limit, "RPC call timed out");
                    return Err(RpcError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        // 响应槽被丢弃说明通道已拆除
        outcome.unwrap_or(Err(RpcError::Disposed))
    }

    /// 发送 Dispose（不等待应答）并放弃所有未完成调用
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        match Message::new(MessageKind::Dispose, Some(id), WireValue::Null).encode() {
            Ok(bytes) => {
                let _ = self.outbound.send(bytes);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode dispose message"),
        }

        let abandoned = self.pending.len();
        self.pending.clear();
        if abandoned > 0 {
            tracing::debug!(abandoned = abandoned, "Pending calls abandoned on dispose");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn route_inbound(
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Arc<Pending>,
    listeners: Arc<ListenerSet>,
) {
    while let Some(bytes) = inbound.recv().await {
        let message = match Message::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed message from execution context");
                continue;
            }
        };

        match message.kind {
            MessageKind::Event => {
                let payload = &message.payload;
                let event = payload.get("event").and_then(WireValue::as_str).unwrap_or_default();
                let progress = Progress::new(
                    payload.get("value").and_then(WireValue::as_f64).unwrap_or(0.0),
                    payload
                        .get("message")
                        .and_then(WireValue::as_str)
                        .unwrap_or_default(),
                );
                listeners.dispatch(event, &progress);
            }
            MessageKind::Ready | MessageKind::Result | MessageKind::Error => {
                let Some(id) = message.id else {
                    tracing::warn!(kind = ?message.kind, "Response without id dropped");
                    continue;
                };
                let Some((_, slot)) = pending.remove(&id) else {
                    tracing::debug!(id = id, "Response for unknown or abandoned call");
                    continue;
                };

                let outcome = match message.kind {
                    MessageKind::Error => Err(RpcError::from_remote(remote_error_from_wire(&message.payload))),
                    _ => deserialize(message.payload).map_err(RpcError::from),
                };
                let _ = slot.send(outcome);
            }
            other => {
                tracing::warn!(kind = ?other, "Unexpected message from execution context");
            }
        }
    }

    // 执行上下文退出：丢弃剩余响应槽，等待方收到 Disposed
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_listener_set_add_remove() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let id = set.add("inference", Arc::new(move |_: &Progress| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = Arc::clone(&hits);
        set.add("inference", Arc::new(move |_: &Progress| {
            counter.fetch_add(10, Ordering::SeqCst);
        }));

        set.dispatch("inference", &Progress::new(10.0, "x"));
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        set.remove("inference", id);
        set.dispatch("inference", &Progress::new(20.0, "x"));
        assert_eq!(hits.load(Ordering::SeqCst), 21);

        set.dispatch("other", &Progress::new(20.0, "x"));
        assert_eq!(hits.load(Ordering::SeqCst), 21);

        set.clear(None);
        assert_eq!(set.count("inference"), 0);
    }
}
