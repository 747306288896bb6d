use serde::{Deserialize, Serialize};

use crate::entities::identity::UserRole;
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 房间参与者记录，是成员关系的权威来源。
///
/// 每个 (房间, 用户) 只有一行；离开时写入 `left_at`，重新加入时清空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: UserRole,
    pub joined_at: Timestamp,
    pub left_at: Option<Timestamp>,
}

impl Participant {
    pub fn new(room_id: RoomId, user_id: UserId, role: UserRole, joined_at: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            role,
            joined_at,
            left_at: None,
        }
    }

    /// 尚未离开
    pub fn is_present(&self) -> bool {
        self.left_at.is_none()
    }

    pub fn leave(&mut self, at: Timestamp) {
        self.left_at = Some(at);
    }

    pub fn rejoin(&mut self) {
        self.left_at = None;
    }
}
