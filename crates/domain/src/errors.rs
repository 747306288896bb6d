//! 领域模型错误定义
//!
//! 房间状态机、成员关系和输入校验失败时返回的错误类型。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 输入参数不合法
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("room not found")]
    RoomNotFound,

    #[error("question not found")]
    QuestionNotFound,

    /// 房间已关闭，不再接受加入和消息
    #[error("room is not active")]
    RoomInactive,

    #[error("room already closed")]
    AlreadyClosed,

    /// 同一问题已存在活跃房间
    #[error("an active room already exists for this question")]
    RoomExists,

    #[error("question has not been matched with experts")]
    QuestionNotMatched,

    /// 会话未附着到该房间
    #[error("not in this room")]
    NotInRoom,

    /// 会话已附着到某个房间，需要先离开
    #[error("already attached to a room")]
    AlreadyInRoom,

    #[error("not authorized")]
    NotAuthorized,

    #[error("expert not matched to this question")]
    MatchNotFound,

    #[error("match already responded")]
    MatchAlreadyResponded,

    /// 会话已断开，不能再附着到房间
    #[error("session is closed")]
    SessionClosed,
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 对外暴露的错误代码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid-argument",
            Self::RoomNotFound => "room-not-found",
            Self::QuestionNotFound => "question-not-found",
            Self::RoomInactive => "room-inactive",
            Self::AlreadyClosed => "already-closed",
            Self::RoomExists => "room-exists",
            Self::QuestionNotMatched => "question-not-matched",
            Self::NotInRoom => "not-in-room",
            Self::AlreadyInRoom => "already-in-room",
            Self::NotAuthorized => "not-authorized",
            Self::MatchNotFound => "match-not-found",
            Self::MatchAlreadyResponded => "match-already-responded",
            Self::SessionClosed => "session-closed",
        }
    }
}

/// 持久化层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("record conflict")]
    Conflict,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
