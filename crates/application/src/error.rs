use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::auth::AuthError;

/// 经纪层对外的错误类型。
///
/// 所有错误只回传给发起事件的会话，不影响房间内其他连接。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// 持久化失败，调用方可重试
    #[error("persist failed: {0}")]
    PersistFailed(#[source] RepositoryError),
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    /// 房间串行槽位繁忙，调用方应退避后重试
    #[error("room is busy, retry later")]
    Busy,
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

impl ApplicationError {
    /// 写入 `error` 事件的错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(err) => err.code(),
            ApplicationError::PersistFailed(_) => "persist-failed",
            ApplicationError::Authentication(_) => "authentication-failed",
            ApplicationError::Busy => "busy",
            ApplicationError::InvalidEvent(_) => "invalid-event",
        }
    }

    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApplicationError::PersistFailed(_) | ApplicationError::Busy
        )
    }

    pub fn invalid_event(message: impl Into<String>) -> Self {
        ApplicationError::InvalidEvent(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::PersistFailed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_surface_as_persist_failed() {
        let err: ApplicationError = RepositoryError::storage("connection reset").into();
        assert_eq!(err.code(), "persist-failed");
        assert!(err.is_transient());
    }

    #[test]
    fn domain_errors_keep_their_code() {
        let err: ApplicationError = DomainError::RoomInactive.into();
        assert_eq!(err.code(), "room-inactive");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "room is not active");
    }
}
