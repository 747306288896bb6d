//! 已认证身份
//!
//! 由认证服务在握手时提供，会话存续期间不可变。

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// 提问者
    #[serde(alias = "user")]
    Questioner,
    /// 回答问题的专家
    Expert,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Questioner => "questioner",
            Self::Expert => "expert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "questioner" | "user" => Some(Self::Questioner),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }
}

/// 一个连接所属的用户身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub role: UserRole,
}

impl Identity {
    pub fn new(user_id: UserId, display_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role,
        }
    }

    pub fn is_expert(&self) -> bool {
        self.role == UserRole::Expert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_user_role_maps_to_questioner() {
        let role: UserRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, UserRole::Questioner);
        assert_eq!(UserRole::parse("user"), Some(UserRole::Questioner));
        assert_eq!(UserRole::parse("admin"), None);
    }

    #[test]
    fn expert_check() {
        let expert = Identity::new(UserId::generate(), "Sarah Lee", UserRole::Expert);
        assert!(expert.is_expert());
        assert_eq!(serde_json::to_value(&expert).unwrap()["displayName"], "Sarah Lee");
    }
}
