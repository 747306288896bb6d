//! 聊天室实体定义
//!
//! 每个房间与一个已匹配的问题一一绑定，状态只能从活跃转为关闭。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{QuestionId, RoomId, Timestamp};

/// 聊天室状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// 活跃状态
    Active,
    /// 已关闭（终态）
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// 聊天室实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    /// 绑定的问题，创建后不可变
    pub question_id: QuestionId,
    pub status: RoomStatus,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Room {
    /// 为已匹配问题开一个新房间
    pub fn open(id: RoomId, question_id: QuestionId, created_at: Timestamp) -> Self {
        Self {
            id,
            question_id,
            status: RoomStatus::Active,
            created_at,
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::RoomInactive)
        }
    }

    /// 关闭房间，不可逆
    pub fn close(&mut self, now: Timestamp) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::AlreadyClosed);
        }
        self.status = RoomStatus::Closed;
        self.closed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn close_is_terminal() {
        let mut room = Room::open(RoomId::generate(), QuestionId::generate(), Utc::now());
        assert!(room.ensure_active().is_ok());

        room.close(Utc::now()).unwrap();
        assert_eq!(room.status, RoomStatus::Closed);
        assert!(room.closed_at.is_some());
        assert_eq!(room.ensure_active(), Err(DomainError::RoomInactive));
        assert_eq!(room.close(Utc::now()), Err(DomainError::AlreadyClosed));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let room = Room::open(RoomId::generate(), QuestionId::generate(), Utc::now());
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json.get("questionId").is_some());
        assert!(json["closedAt"].is_null());
    }
}
