//! WebSocket Handler - 任务进度推送

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::infrastructure::events::WsEvent;
use crate::infrastructure::http::state::AppState;

/// 任务 WebSocket 连接处理（进度与状态事件）
pub async fn job_websocket_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_job_socket(socket, job_id, state))
}

fn to_message(event: &WsEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize event");
            None
        }
    }
}

/// 当前快照：已结束的任务直接给出终止事件
fn snapshot(state: &AppState, job_id: &str) -> Option<WsEvent> {
    let job = state.job_manager.get_job(job_id)?;
    Some(WsEvent::JobStateChanged {
        job_id: job.job_id,
        state: job.state.as_str().to_string(),
        current: None,
        total: None,
        duration_ms: job.output.as_ref().map(|o| o.duration_ms()),
        error: job.error_message,
    })
}

async fn handle_job_socket(socket: WebSocket, job_id: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // 先订阅再取快照，避免漏掉其间的事件
    let mut event_rx = state.event_publisher.subscribe(&job_id);

    let Some(current) = snapshot(&state, &job_id) else {
        tracing::warn!(job_id = %job_id, "WebSocket connection rejected: unknown job");
        state.event_publisher.unregister_job(&job_id);
        let _ = sender.close().await;
        return;
    };

    tracing::info!(job_id = %job_id, state = ?current, "WebSocket connected");

    let finished = current.is_terminal();
    if finished {
        state.event_publisher.unregister_job(&job_id);
    }
    if let Some(msg) = to_message(&current) {
        if sender.send(msg).await.is_err() || finished {
            let _ = sender.close().await;
            return;
        }
    }

    let job_id_for_forward = job_id.clone();

    // 事件转发任务，终止事件后关闭
    let forward_task = tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %job_id_for_forward, skipped = skipped, "WebSocket lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(msg) = to_message(&event) else {
                continue;
            };
            if let Err(e) = sender.send(msg).await {
                tracing::debug!(
                    job_id = %job_id_for_forward,
                    error = %e,
                    "Failed to send WebSocket message"
                );
                break;
            }
            if event.is_terminal() {
                let _ = sender.close().await;
                break;
            }
        }
    });

    // 接收客户端消息（心跳）
    let job_id_for_receive = job_id.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::info!(job_id = %job_id_for_receive, "WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(job_id = %job_id_for_receive, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // 等待任一任务完成
    tokio::select! {
        _ = forward_task => {}
        _ = receive_task => {}
    }

    tracing::info!(job_id = %job_id, "WebSocket disconnected");
}
