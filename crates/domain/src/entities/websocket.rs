//! WebSocket 事件协议
//!
//! 所有帧都是 JSON 文本：`{"type": "join_room", "roomId": "..."}`。
//! `type` 使用 snake_case，字段使用 camelCase。

use serde::{Deserialize, Serialize};

use crate::entities::identity::UserRole;
use crate::entities::message::{Message, MessageKind};
use crate::value_objects::{MessageId, QuestionId, RoomId, SessionId, Timestamp, UserId};

/// 客户端到服务器的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// 握手阶段提交凭据（未通过 URL 提供 token 时使用）
    Authenticate { token: String },
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: RoomId },
    SendMessage {
        room_id: RoomId,
        content: String,
        #[serde(default)]
        kind: MessageKind,
    },
    TypingStart { room_id: RoomId },
    TypingStop { room_id: RoomId },
    AcceptQuestion { question_id: QuestionId },
    RejectQuestion { question_id: QuestionId },
    CreateRoom { question_id: QuestionId },
    CloseRoom { room_id: RoomId },
    /// 拉取历史消息，`before` 为分页游标
    GetHistory {
        room_id: RoomId,
        limit: Option<u32>,
        before: Option<MessageId>,
    },
    Ping,
}

impl ClientEvent {
    /// 解析一帧文本
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 事件名称，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::AcceptQuestion { .. } => "accept_question",
            Self::RejectQuestion { .. } => "reject_question",
            Self::CreateRoom { .. } => "create_room",
            Self::CloseRoom { .. } => "close_room",
            Self::GetHistory { .. } => "get_history",
            Self::Ping => "ping",
        }
    }
}

/// 服务器到客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// 握手成功
    Authenticated {
        session_id: SessionId,
        user_id: UserId,
        display_name: String,
        role: UserRole,
    },
    NewMessage {
        message: Message,
        sender_name: String,
    },
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        timestamp: Timestamp,
    },
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        timestamp: Timestamp,
    },
    /// 对端连接异常断开
    UserDisconnected {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        timestamp: Timestamp,
    },
    TypingIndicator {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        is_typing: bool,
    },
    RoomClosed { room_id: RoomId },
    Error { message: String, code: String },
    JoinedRoom { room_id: RoomId },
    LeftRoom { room_id: RoomId },
    RoomCreated {
        room_id: RoomId,
        question_id: QuestionId,
    },
    /// 仅发给提问者
    ExpertAccepted {
        question_id: QuestionId,
        expert_id: UserId,
        expert_name: String,
    },
    QuestionAccepted { question_id: QuestionId },
    QuestionRejected { question_id: QuestionId },
    History {
        room_id: RoomId,
        messages: Vec<Message>,
        has_more: bool,
    },
    Pong,
}

impl ServerEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 事件名称，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::NewMessage { .. } => "new_message",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::UserDisconnected { .. } => "user_disconnected",
            Self::TypingIndicator { .. } => "typing_indicator",
            Self::RoomClosed { .. } => "room_closed",
            Self::Error { .. } => "error",
            Self::JoinedRoom { .. } => "joined_room",
            Self::LeftRoom { .. } => "left_room",
            Self::RoomCreated { .. } => "room_created",
            Self::ExpertAccepted { .. } => "expert_accepted",
            Self::QuestionAccepted { .. } => "question_accepted",
            Self::QuestionRejected { .. } => "question_rejected",
            Self::History { .. } => "history",
            Self::Pong => "pong",
        }
    }
}
