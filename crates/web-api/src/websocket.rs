//! WebSocket 升级与握手
//!
//! URL 或请求头带有凭据时在升级前认证，失败直接返回 401；
//! 否则先升级，在握手超时内等待首帧 `authenticate`。

use std::time::Duration;

use application::{ApplicationError, AuthError, Credential};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use domain::{ClientEvent, ServerEvent};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::{
    auth::{credential_from_request, WsAuthQuery},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(credential) = credential_from_request(&query, &headers) else {
        debug!("升级请求未携带凭据，等待首帧认证");
        return Ok(ws.on_upgrade(move |socket| handshake(socket, state)));
    };

    let identity = state
        .broker()
        .authenticate(&credential)
        .await
        .map_err(|err| {
            warn!(error = %err, "WebSocket 升级认证失败");
            ApiError::from(err)
        })?;

    info!(user_id = %identity.user_id, "WebSocket 升级");
    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, identity).run()))
}

async fn handshake(mut socket: WebSocket, state: AppState) {
    let credential = match await_credential(&mut socket, state.handshake_timeout).await {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            debug!("客户端在认证前关闭连接");
            return;
        }
        Err(err) => return reject(socket, &err).await,
    };

    match state.broker().authenticate(&credential).await {
        Ok(identity) => WebSocketConnection::new(socket, state, identity).run().await,
        Err(err) => reject(socket, &err).await,
    }
}

/// 读取首个业务帧；客户端先关闭时返回 `None`
async fn await_credential(
    socket: &mut WebSocket,
    handshake_timeout: Duration,
) -> Result<Option<Credential>, ApplicationError> {
    let deadline = Instant::now() + handshake_timeout;
    loop {
        let frame = timeout_at(deadline, socket.recv())
            .await
            .map_err(|_| ApplicationError::from(AuthError::MissingCredential))?;

        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                return match ClientEvent::decode(text.as_str()) {
                    Ok(ClientEvent::Authenticate { token }) => Ok(Some(Credential::Token(token))),
                    Ok(other) => Err(ApplicationError::invalid_event(format!(
                        "{} before authentication",
                        other.name()
                    ))),
                    Err(err) => Err(ApplicationError::invalid_event(err.to_string())),
                };
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Binary(_))) => {
                return Err(ApplicationError::invalid_event(
                    "binary frames are not supported",
                ));
            }
            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return Ok(None),
        }
    }
}

async fn reject(mut socket: WebSocket, err: &ApplicationError) {
    warn!(code = err.code(), error = %err, "握手失败，关闭连接");
    if let Ok(payload) = ServerEvent::error(err.code(), err.to_string()).encode() {
        let _ = socket.send(WsMessage::Text(payload.into())).await;
    }
    let _ = socket.send(WsMessage::Close(None)).await;
}
