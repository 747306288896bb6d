use std::sync::Arc;

use domain::{DomainError, ExpertMatch, Identity, MatchDecision, Question, QuestionId};
use tracing::info;

use crate::{clock::Clock, error::ApplicationError, repository::QuestionRepository};

pub struct QuestionServiceDependencies {
    pub questions: Arc<dyn QuestionRepository>,
    pub clock: Arc<dyn Clock>,
}

/// 专家回应后的结果
#[derive(Debug, Clone)]
pub struct MatchResponse {
    pub question: Question,
    pub expert_match: ExpertMatch,
}

/// 专家接受或拒绝问题匹配
pub struct QuestionService {
    deps: QuestionServiceDependencies,
}

impl QuestionService {
    pub fn new(deps: QuestionServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn respond(
        &self,
        expert: &Identity,
        question_id: QuestionId,
        decision: MatchDecision,
    ) -> Result<MatchResponse, ApplicationError> {
        if !expert.is_expert() {
            return Err(DomainError::NotAuthorized.into());
        }

        let questions = &self.deps.questions;
        let mut question = questions
            .find_by_id(question_id)
            .await?
            .ok_or(DomainError::QuestionNotFound)?;
        let mut expert_match = questions
            .find_match(question_id, expert.user_id)
            .await?
            .ok_or(DomainError::MatchNotFound)?;

        expert_match.respond(decision, self.deps.clock.now())?;
        let expert_match = questions.update_match(expert_match).await?;

        if decision == MatchDecision::Accept {
            let before = question.status;
            question.mark_matched();
            if question.status != before {
                question = questions.update(question).await?;
            }
        }

        info!(
            question_id = %question_id,
            expert_id = %expert.user_id,
            decision = ?decision,
            "专家已回应匹配"
        );
        Ok(MatchResponse {
            question,
            expert_match,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::InMemoryStore;
    use chrono::Utc;
    use domain::{QuestionStatus, UserId, UserRole};

    async fn setup() -> (QuestionService, Identity, QuestionId) {
        let store = Arc::new(InMemoryStore::new());
        let expert = Identity::new(UserId::generate(), "Sarah Lee", UserRole::Expert);
        let question = Question::new(QuestionId::generate(), UserId::generate(), "async drop", Utc::now());
        let question_id = question.id;
        store.insert_question(question).await;
        store
            .insert_match(ExpertMatch::pending(question_id, expert.user_id))
            .await;

        let service = QuestionService::new(QuestionServiceDependencies {
            questions: store,
            clock: Arc::new(SystemClock),
        });
        (service, expert, question_id)
    }

    #[tokio::test]
    async fn accepting_moves_question_to_matched() {
        let (service, expert, question_id) = setup().await;
        let response = service
            .respond(&expert, question_id, MatchDecision::Accept)
            .await
            .unwrap();
        assert_eq!(response.question.status, QuestionStatus::Matched);
        assert!(response.expert_match.is_accepted());

        let err = service
            .respond(&expert, question_id, MatchDecision::Reject)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "match-already-responded");
    }

    #[tokio::test]
    async fn rejecting_leaves_question_pending() {
        let (service, expert, question_id) = setup().await;
        let response = service
            .respond(&expert, question_id, MatchDecision::Reject)
            .await
            .unwrap();
        assert_eq!(response.question.status, QuestionStatus::Pending);
    }

    #[tokio::test]
    async fn only_matched_experts_may_respond() {
        let (service, _expert, question_id) = setup().await;
        let stranger = Identity::new(UserId::generate(), "Mike Park", UserRole::Expert);
        let err = service
            .respond(&stranger, question_id, MatchDecision::Accept)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "match-not-found");

        let questioner = Identity::new(UserId::generate(), "Alex Kim", UserRole::Questioner);
        let err = service
            .respond(&questioner, question_id, MatchDecision::Accept)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not-authorized");
    }
}
