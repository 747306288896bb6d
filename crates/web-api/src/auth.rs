//! 握手凭据提取
//!
//! 按优先级：`?token=`、`Authorization: Bearer`、`?demo_user=`。
//! 都没有时连接先升级，再等待首帧 `authenticate`。

use application::Credential;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Deserialize;

/// WebSocket 连接查询参数
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    /// JWT access token
    pub token: Option<String>,
    /// 演示账号邮箱，仅在演示模式下有效
    pub demo_user: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// 从升级请求中取出凭据
pub fn credential_from_request(query: &WsAuthQuery, headers: &HeaderMap) -> Option<Credential> {
    if let Some(token) = query.token.clone().or_else(|| bearer_token(headers)) {
        return Some(Credential::Token(token));
    }
    query.demo_user.clone().map(Credential::Demo)
}
