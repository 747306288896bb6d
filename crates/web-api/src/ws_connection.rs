use application::ApplicationError;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{Identity, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 已认证的 WebSocket 连接
///
/// 三个任务协作：
/// - 发送任务把会话出站事件写入 socket
/// - 读取任务把文本帧放入有界队列
/// - 分发任务按到达顺序逐帧交给分发器
///
/// 读取或发送任一结束即视为断开。已经入队的帧仍会处理完，避免一次提交在持久化之后、
/// 广播之前被取消。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    identity: Identity,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, identity: Identity) -> Self {
        Self {
            socket,
            state,
            identity,
        }
    }

    pub async fn run(self) {
        let broker = self.state.broker().clone();
        let dispatcher = self.state.dispatcher.clone();
        let (session, mut outbound) = broker.connect(self.identity).await;
        let session_id = session.id();
        let (mut sender, mut incoming) = self.socket.split();

        let mut send_task = tokio::spawn(async move {
            while let Some(event) = outbound.recv().await {
                let payload = match event.encode() {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize websocket payload");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                    tracing::warn!(session_id = %session_id, "Failed to send text message");
                    break;
                }
            }
            tracing::debug!(session_id = %session_id, "WebSocket发送任务结束");
        });

        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(32);
        let read_session = session.clone();
        let mut read_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                match message {
                    WsMessage::Text(text) => {
                        if frame_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Binary(_) => {
                        let err = ApplicationError::invalid_event("binary frames are not supported");
                        read_session.send(ServerEvent::error(err.code(), err.to_string()));
                    }
                    WsMessage::Close(_) => {
                        tracing::info!(session_id = %session_id, "WebSocket收到关闭消息");
                        break;
                    }
                    WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                }
            }
            tracing::debug!(session_id = %session_id, "WebSocket接收任务结束");
        });

        let dispatch_session = session.clone();
        let dispatch_task = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                dispatcher.dispatch(&dispatch_session, &frame).await;
            }
        });

        // 等待任意一个任务完成（连接断开）
        tokio::select! {
            _ = &mut send_task => read_task.abort(),
            _ = &mut read_task => send_task.abort(),
        }

        if let Err(err) = dispatch_task.await {
            tracing::error!(session_id = %session_id, error = %err, "dispatch task failed");
        }
        broker.disconnect(&session).await;
        tracing::info!(
            session_id = %session_id,
            user_id = %session.user_id(),
            "WebSocket连接已断开，会话已清理"
        );
    }
}
