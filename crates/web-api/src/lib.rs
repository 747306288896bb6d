//! Web API 层。
//!
//! 提供 Axum 路由：`/health` 健康检查和 `/ws` WebSocket 接入，连接上的事件交给应用层的分发器处理。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;
mod ws_connection;

pub use auth::WsAuthQuery;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
