//! 问题与专家匹配
//!
//! 匹配服务负责写入匹配结果，经纪层只读取问题状态并推进
//! `matched → in_progress → resolved`。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{QuestionId, Timestamp, UserId};

/// 问题状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Matched,
    InProgress,
    Resolved,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "matched" => Some(Self::Matched),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    /// 提问者
    pub owner_id: UserId,
    pub title: String,
    pub status: QuestionStatus,
    pub created_at: Timestamp,
}

impl Question {
    pub fn new(
        id: QuestionId,
        owner_id: UserId,
        title: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            owner_id,
            title: title.into(),
            status: QuestionStatus::Pending,
            created_at,
        }
    }

    /// 只有已匹配的问题可以开房间
    pub fn ensure_matched(&self) -> DomainResult<()> {
        if self.status == QuestionStatus::Matched {
            Ok(())
        } else {
            Err(DomainError::QuestionNotMatched)
        }
    }

    /// 首位专家接受后，待匹配问题进入已匹配状态
    pub fn mark_matched(&mut self) {
        if self.status == QuestionStatus::Pending {
            self.status = QuestionStatus::Matched;
        }
    }
}

/// 专家对匹配的回应状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertMatch {
    pub question_id: QuestionId,
    pub expert_id: UserId,
    pub status: MatchStatus,
    pub responded_at: Option<Timestamp>,
}

impl ExpertMatch {
    pub fn pending(question_id: QuestionId, expert_id: UserId) -> Self {
        Self {
            question_id,
            expert_id,
            status: MatchStatus::Pending,
            responded_at: None,
        }
    }

    /// 记录专家的回应，每个匹配只能回应一次
    pub fn respond(&mut self, decision: MatchDecision, at: Timestamp) -> DomainResult<()> {
        if self.status != MatchStatus::Pending {
            return Err(DomainError::MatchAlreadyResponded);
        }
        self.status = match decision {
            MatchDecision::Accept => MatchStatus::Accepted,
            MatchDecision::Reject => MatchStatus::Rejected,
        };
        self.responded_at = Some(at);
        Ok(())
    }

    pub fn is_accepted(&self) -> bool {
        self.status == MatchStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn pending_question_cannot_open_room() {
        let mut question = Question::new(QuestionId::generate(), UserId::generate(), "borrow checker", Utc::now());
        assert_eq!(question.ensure_matched(), Err(DomainError::QuestionNotMatched));

        question.mark_matched();
        assert!(question.ensure_matched().is_ok());
    }

    #[test]
    fn mark_matched_does_not_rewind_progress() {
        let mut question = Question::new(QuestionId::generate(), UserId::generate(), "lifetimes", Utc::now());
        question.status = QuestionStatus::InProgress;
        question.mark_matched();
        assert_eq!(question.status, QuestionStatus::InProgress);
    }

    #[test]
    fn match_can_be_answered_once() {
        let mut m = ExpertMatch::pending(QuestionId::generate(), UserId::generate());
        m.respond(MatchDecision::Accept, Utc::now()).unwrap();
        assert!(m.is_accepted());
        assert!(m.responded_at.is_some());
        assert_eq!(
            m.respond(MatchDecision::Reject, Utc::now()),
            Err(DomainError::MatchAlreadyResponded)
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            QuestionStatus::Pending,
            QuestionStatus::Matched,
            QuestionStatus::InProgress,
            QuestionStatus::Resolved,
        ] {
            assert_eq!(QuestionStatus::parse(status.as_str()), Some(status));
        }
    }
}
