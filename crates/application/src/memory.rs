//! 内存存储实现
//!
//! 用于测试和演示模式，实现全部存储契约。`set_available(false)` 可以模拟存储故障。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use domain::{
    ExpertMatch, MatchStatus, Message, MessageId, Participant, Question, QuestionId,
    QuestionStatus, RepositoryError, Room, RoomId, Timestamp, UserId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::DemoDirectory;
use crate::repository::{
    MessageRepository, ParticipantRepository, QuestionRepository, RoomRepository,
};

#[derive(Default)]
struct State {
    questions: HashMap<QuestionId, Question>,
    matches: HashMap<(QuestionId, UserId), ExpertMatch>,
    rooms: HashMap<RoomId, Room>,
    participants: HashMap<(RoomId, UserId), Participant>,
    messages: HashMap<RoomId, BTreeMap<MessageId, Message>>,
}

/// 演示数据中预置的问题
#[derive(Debug, Clone, Copy)]
pub struct DemoSeed {
    /// 已匹配、两位专家均已接受，可以直接开房间
    pub matched_question: QuestionId,
    /// 待专家回应
    pub pending_question: QuestionId,
}

pub struct InMemoryStore {
    state: RwLock<State>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    /// 切换可用状态，不可用时所有操作返回存储错误
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), RepositoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepositoryError::storage("store unavailable"))
        }
    }

    pub async fn insert_question(&self, question: Question) {
        self.state
            .write()
            .await
            .questions
            .insert(question.id, question);
    }

    pub async fn insert_match(&self, expert_match: ExpertMatch) {
        self.state
            .write()
            .await
            .matches
            .insert((expert_match.question_id, expert_match.expert_id), expert_match);
    }

    pub async fn message_count(&self, room_id: RoomId) -> usize {
        self.state
            .read()
            .await
            .messages
            .get(&room_id)
            .map_or(0, BTreeMap::len)
    }

    /// 写入演示数据：一个可以开房间的问题，和一个等待专家回应的问题
    pub async fn seed_demo(&self, directory: &DemoDirectory, now: Timestamp) -> Option<DemoSeed> {
        let questioner = directory.lookup(DemoDirectory::QUESTIONER)?.user_id;
        let experts = [
            directory.lookup(DemoDirectory::FIRST_EXPERT)?.user_id,
            directory.lookup(DemoDirectory::SECOND_EXPERT)?.user_id,
        ];

        let seed = DemoSeed {
            matched_question: QuestionId::from(Uuid::from_u128(0xd1)),
            pending_question: QuestionId::from(Uuid::from_u128(0xd2)),
        };

        let mut matched = Question::new(
            seed.matched_question,
            questioner,
            "How do I share state between axum handlers?",
            now,
        );
        matched.status = QuestionStatus::Matched;
        self.insert_question(matched).await;

        let pending = Question::new(
            seed.pending_question,
            questioner,
            "Why does my tokio task never finish?",
            now,
        );
        self.insert_question(pending).await;

        for expert in experts {
            let mut accepted = ExpertMatch::pending(seed.matched_question, expert);
            accepted.status = MatchStatus::Accepted;
            accepted.responded_at = Some(now);
            self.insert_match(accepted).await;
            self.insert_match(ExpertMatch::pending(seed.pending_question, expert))
                .await;
        }
        Some(seed)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryStore {
    async fn find_by_id(&self, id: QuestionId) -> Result<Option<Question>, RepositoryError> {
        self.ensure_available()?;
        Ok(self.state.read().await.questions.get(&id).cloned())
    }

    async fn update(&self, question: Question) -> Result<Question, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        let slot = state
            .questions
            .get_mut(&question.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = question.clone();
        Ok(question)
    }

    async fn find_match(
        &self,
        question_id: QuestionId,
        expert_id: UserId,
    ) -> Result<Option<ExpertMatch>, RepositoryError> {
        self.ensure_available()?;
        Ok(self
            .state
            .read()
            .await
            .matches
            .get(&(question_id, expert_id))
            .cloned())
    }

    async fn update_match(
        &self,
        expert_match: ExpertMatch,
    ) -> Result<ExpertMatch, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        let slot = state
            .matches
            .get_mut(&(expert_match.question_id, expert_match.expert_id))
            .ok_or(RepositoryError::NotFound)?;
        *slot = expert_match.clone();
        Ok(expert_match)
    }

    async fn list_accepted_experts(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<UserId>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.read().await;
        let mut experts: Vec<UserId> = state
            .matches
            .values()
            .filter(|m| m.question_id == question_id && m.is_accepted())
            .map(|m| m.expert_id)
            .collect();
        experts.sort();
        Ok(experts)
    }
}

#[async_trait]
impl RoomRepository for InMemoryStore {
    async fn create_with_participants(
        &self,
        room: Room,
        participants: Vec<Participant>,
    ) -> Result<Room, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        if state
            .rooms
            .values()
            .any(|r| r.question_id == room.question_id && r.is_active())
        {
            return Err(RepositoryError::Conflict);
        }
        let question = state
            .questions
            .get_mut(&room.question_id)
            .ok_or(RepositoryError::NotFound)?;
        question.status = QuestionStatus::InProgress;

        for participant in participants {
            state
                .participants
                .insert((participant.room_id, participant.user_id), participant);
        }
        state.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        self.ensure_available()?;
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }

    async fn find_active_by_question(
        &self,
        question_id: QuestionId,
    ) -> Result<Option<Room>, RepositoryError> {
        self.ensure_available()?;
        Ok(self
            .state
            .read()
            .await
            .rooms
            .values()
            .find(|r| r.question_id == question_id && r.is_active())
            .cloned())
    }

    async fn close(&self, room: Room) -> Result<Room, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        if !state.rooms.contains_key(&room.id) {
            return Err(RepositoryError::NotFound);
        }
        if let Some(question) = state.questions.get_mut(&room.question_id) {
            question.status = QuestionStatus::Resolved;
        }
        state.rooms.insert(room.id, room.clone());
        Ok(room)
    }
}

#[async_trait]
impl ParticipantRepository for InMemoryStore {
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        self.ensure_available()?;
        Ok(self
            .state
            .read()
            .await
            .participants
            .get(&(room_id, user_id))
            .cloned())
    }

    async fn upsert(&self, participant: Participant) -> Result<Participant, RepositoryError> {
        self.ensure_available()?;
        self.state
            .write()
            .await
            .participants
            .insert((participant.room_id, participant.user_id), participant.clone());
        Ok(participant)
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Participant>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.read().await;
        let mut participants: Vec<Participant> = state
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.joined_at);
        Ok(participants)
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        let room = state.messages.entry(message.room_id).or_default();
        if room.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }
        room.insert(message.id, message.clone());
        Ok(message)
    }

    async fn last_message_id(&self, room_id: RoomId) -> Result<Option<MessageId>, RepositoryError> {
        self.ensure_available()?;
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(&room_id)
            .and_then(|room| room.keys().next_back().copied()))
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.read().await;
        let Some(room) = state.messages.get(&room_id) else {
            return Ok(Vec::new());
        };
        let upper = before.unwrap_or(MessageId(u64::MAX));
        let mut recent: Vec<Message> = room
            .range(..upper)
            .rev()
            .take(limit as usize)
            .map(|(_, message)| message.clone())
            .collect();
        recent.reverse();
        Ok(recent)
    }
}
