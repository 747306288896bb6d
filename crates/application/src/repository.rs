//! 持久化存储契约
//!
//! 经纪层只通过这些 trait 访问存储；内存实现与 PostgreSQL 实现可以互换。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    ExpertMatch, Message, MessageId, Participant, Question, QuestionId, RepositoryError, Room,
    RoomId, UserId,
};

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn find_by_id(&self, id: QuestionId) -> Result<Option<Question>, RepositoryError>;
    async fn update(&self, question: Question) -> Result<Question, RepositoryError>;

    async fn find_match(
        &self,
        question_id: QuestionId,
        expert_id: UserId,
    ) -> Result<Option<ExpertMatch>, RepositoryError>;

    async fn update_match(&self, expert_match: ExpertMatch)
        -> Result<ExpertMatch, RepositoryError>;

    // 已接受该问题的专家
    async fn list_accepted_experts(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<UserId>, RepositoryError>;
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// 原子地写入房间和参与者，并把问题推进到 `in_progress`
    async fn create_with_participants(
        &self,
        room: Room,
        participants: Vec<Participant>,
    ) -> Result<Room, RepositoryError>;

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;

    async fn find_active_by_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Option<Room>, RepositoryError>;

    /// 原子地保存已关闭的房间，并把问题推进到 `resolved`
    async fn close(&self, room: Room) -> Result<Room, RepositoryError>;
}

#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError>;

    async fn upsert(&self, participant: Participant) -> Result<Participant, RepositoryError>;

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Participant>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存已分配序号的消息，`(room_id, id)` 已存在时返回 `Conflict`
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn last_message_id(&self, room_id: RoomId) -> Result<Option<MessageId>, RepositoryError>;

    /// 返回 `before` 之前最近的 `limit` 条消息，按序号升序
    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, RepositoryError>;
}

/// 经纪层用到的全部存储句柄
#[derive(Clone)]
pub struct Repositories {
    pub questions: Arc<dyn QuestionRepository>,
    pub rooms: Arc<dyn RoomRepository>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

impl Repositories {
    /// 用同一个存储实现填充所有句柄
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: QuestionRepository
            + RoomRepository
            + ParticipantRepository
            + MessageRepository
            + 'static,
    {
        Self {
            questions: store.clone(),
            rooms: store.clone(),
            participants: store.clone(),
            messages: store,
        }
    }
}
