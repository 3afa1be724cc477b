//! Execution Context Host - 模型执行上下文
//!
//! 每个模型实例独占一个 OS 线程（`model-<id>`），线程内运行 current-thread
//! tokio runtime + LocalSet。适配器只在该线程内构建和调用，
//! 与调用方之间只有经过编码的字节消息。

use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::LocalSet;

use super::message::{Message, MessageKind};
use super::serialization::{deserialize, remote_error_to_wire, serialize, WireValue};
use crate::application::ports::{RemoteError, RpcError, CONFIGURATION_ERROR};
use crate::domain::{Progress, Value};
use crate::infrastructure::models::{AdapterRegistry, ModelAdapter};

/// 适配器向调用方发送事件的句柄
#[derive(Clone)]
pub struct EventEmitter {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl EventEmitter {
    pub fn new(outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { outbound }
    }

    /// 不连接任何接收方的 emitter（事件被丢弃）
    pub fn detached() -> Self {
        let (outbound, _) = mpsc::unbounded_channel();
        Self { outbound }
    }

    /// 发送事件，fire-and-forget
    pub fn emit(&self, event: &str, progress: Progress) {
        let mut payload = std::collections::BTreeMap::new();
        payload.insert("event".to_string(), WireValue::Text(event.to_string()));
        payload.insert("value".to_string(), WireValue::Float(progress.value));
        payload.insert("message".to_string(), WireValue::Text(progress.message));

        match Message::new(MessageKind::Event, None, WireValue::Map(payload)).encode() {
            Ok(bytes) => {
                if self.outbound.send(bytes).is_err() {
                    tracing::trace!(event = %event, "Event dropped, channel closed");
                }
            }
            Err(e) => tracing::warn!(event = %event, error = %e, "Failed to encode event"),
        }
    }
}

/// 启动执行上下文线程
pub fn spawn_host(
    name: String,
    registry: Arc<AdapterRegistry>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) -> Result<std::thread::JoinHandle<()>, RpcError> {
    std::thread::Builder::new()
        .name(name)
        .spawn(move || run(registry, inbound, outbound))
        .map_err(|e| RpcError::Transport(format!("failed to start execution context: {}", e)))
}

fn run(
    registry: Arc<AdapterRegistry>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build execution context runtime");
            return;
        }
    };

    let local = LocalSet::new();
    local.block_on(&runtime, serve(registry, inbound, outbound));
    tracing::debug!("Execution context stopped");
}

fn send(outbound: &mpsc::UnboundedSender<Vec<u8>>, message: Message) {
    match message.encode() {
        Ok(bytes) => {
            if outbound.send(bytes).is_err() {
                tracing::debug!(id = ?message.id, "Reply dropped, caller gone");
            }
        }
        Err(e) => tracing::error!(id = ?message.id, error = %e, "Failed to encode reply"),
    }
}

/// 适配器调用 panic 时的远端错误名
pub const PANIC_ERROR: &str = "PanicError";

fn error_reply(id: Option<u64>, err: &RemoteError) -> Message {
    Message::new(MessageKind::Error, id, remote_error_to_wire(err))
}

async fn serve(
    registry: Arc<AdapterRegistry>,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut adapter: Option<Rc<dyn ModelAdapter>> = None;

    while let Some(bytes) = inbound.recv().await {
        let message = match Message::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed message");
                continue;
            }
        };

        match message.kind {
            MessageKind::Initialize => {
                // 已就绪时直接应答，不重复构建
                let reply = if adapter.is_some() {
                    Message::new(MessageKind::Ready, message.id, WireValue::Null)
                } else {
                    match build_adapter(&registry, &message.payload, &outbound).await {
                        Ok(built) => {
                            adapter = Some(built);
                            Message::new(MessageKind::Ready, message.id, WireValue::Null)
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Adapter initialization failed");
                            error_reply(message.id, &err)
                        }
                    }
                };
                send(&outbound, reply);
            }
            MessageKind::Process => {
                let Some(current) = adapter.as_ref().map(Rc::clone) else {
                    let err = RemoteError::new("NotInitializedError", "Adapter not initialized");
                    send(&outbound, error_reply(message.id, &err));
                    continue;
                };

                let id = message.id;
                let call = tokio::task::spawn_local(async move {
                    match deserialize(message.payload) {
                        Ok(input) => match current.process(input).await {
                            Ok(output) => Message::new(MessageKind::Result, id, serialize(&output)),
                            Err(err) => error_reply(id, &err),
                        },
                        Err(e) => error_reply(id, &RemoteError::new("SerializationError", e.to_string())),
                    }
                });

                // 调用任务 panic 时也必须应答，否则调用方永远等待
                let reply_to = outbound.clone();
                tokio::task::spawn_local(async move {
                    let reply = match call.await {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::error!(id = ?id, error = %e, "Adapter call aborted");
                            error_reply(id, &RemoteError::new(PANIC_ERROR, e.to_string()))
                        }
                    };
                    send(&reply_to, reply);
                });
            }
            MessageKind::Dispose => {
                if let Some(current) = adapter.take() {
                    current.dispose().await;
                }
                break;
            }
            other => {
                tracing::warn!(kind = ?other, "Unexpected message in execution context");
            }
        }
    }
}

async fn build_adapter(
    registry: &AdapterRegistry,
    payload: &WireValue,
    outbound: &mpsc::UnboundedSender<Vec<u8>>,
) -> Result<Rc<dyn ModelAdapter>, RemoteError> {
    let kind = payload
        .get("kind")
        .and_then(WireValue::as_str)
        .ok_or_else(|| RemoteError::new(CONFIGURATION_ERROR, "Missing adapter kind"))?;

    let config = match payload.get("config") {
        Some(wire) => deserialize(wire.clone())
            .map_err(|e| RemoteError::new(CONFIGURATION_ERROR, e.to_string()))?,
        None => Value::Null,
    };

    let factory = registry
        .factory(kind)
        .ok_or_else(|| RemoteError::new(CONFIGURATION_ERROR, format!("Unknown adapter kind: {}", kind)))?;

    tracing::debug!(kind = %kind, "Constructing adapter");
    let adapter: Rc<dyn ModelAdapter> = Rc::from(factory(&config, EventEmitter::new(outbound.clone()))?);
    adapter.initialize().await?;
    Ok(adapter)
}
