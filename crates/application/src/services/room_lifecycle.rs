use std::sync::Arc;

use domain::{
    DomainError, Identity, Message, MessageId, Participant, QuestionId, RepositoryError, Room,
    RoomId, ServerEvent, UserRole,
};
use tracing::info;

use crate::{
    clock::Clock,
    error::ApplicationError,
    hub::{DetachReason, RoomHub},
    repository::Repositories,
    sequencer::MessagePipeline,
    session::Session,
};

pub struct RoomLifecycleDependencies {
    pub repositories: Repositories,
    pub hub: Arc<RoomHub>,
    pub pipeline: Arc<MessagePipeline>,
    pub clock: Arc<dyn Clock>,
    /// 单次历史查询的默认与最大条数
    pub history_limit: u32,
}

/// 新建房间的结果
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room: Room,
    pub participants: Vec<Participant>,
}

/// 一页历史消息
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// 房间生命周期：none → active → closed
pub struct RoomLifecycleService {
    deps: RoomLifecycleDependencies,
}

impl RoomLifecycleService {
    pub fn new(deps: RoomLifecycleDependencies) -> Self {
        Self { deps }
    }

    async fn load_room(&self, room_id: RoomId) -> Result<Room, ApplicationError> {
        Ok(self
            .deps
            .repositories
            .rooms
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?)
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<Room, ApplicationError> {
        self.load_room(room_id).await
    }

    /// 为已匹配的问题开房间，提问者和所有已接受的专家成为参与者
    pub async fn create_room(
        &self,
        question_id: QuestionId,
        requester: &Identity,
    ) -> Result<CreatedRoom, ApplicationError> {
        let repositories = &self.deps.repositories;
        let question = repositories
            .questions
            .find_by_id(question_id)
            .await?
            .ok_or(DomainError::QuestionNotFound)?;
        question.ensure_matched()?;

        if repositories
            .rooms
            .find_active_by_question(question_id)
            .await?
            .is_some()
        {
            return Err(DomainError::RoomExists.into());
        }

        let experts = repositories.questions.list_accepted_experts(question_id).await?;
        if requester.user_id != question.owner_id && !experts.contains(&requester.user_id) {
            return Err(DomainError::NotAuthorized.into());
        }

        let now = self.deps.clock.now();
        let room = Room::open(RoomId::generate(), question_id, now);
        let participants: Vec<Participant> =
            std::iter::once(Participant::new(room.id, question.owner_id, UserRole::Questioner, now))
                .chain(
                    experts
                        .iter()
                        .map(|expert| Participant::new(room.id, *expert, UserRole::Expert, now)),
                )
                .collect();

        let room = repositories
            .rooms
            .create_with_participants(room, participants.clone())
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => DomainError::RoomExists.into(),
                other => ApplicationError::from(other),
            })?;

        info!(
            room_id = %room.id,
            question_id = %question_id,
            participants = participants.len(),
            "房间已创建"
        );
        Ok(CreatedRoom { room, participants })
    }

    /// 加入房间并附着会话。
    ///
    /// 在房间槽位内执行，加入者不会错过紧随其后的消息，也不会附着到刚关闭的房间。
    pub async fn join_room(
        &self,
        session: &Arc<Session>,
        room_id: RoomId,
    ) -> Result<Room, ApplicationError> {
        let hub = &self.deps.hub;
        if hub.current_room(session.id()).await.is_some() {
            return Err(DomainError::AlreadyInRoom.into());
        }
        if hub.is_participant(room_id, session.user_id()).await == Some(false) {
            return Err(DomainError::NotAuthorized.into());
        }

        let (_slot, room) = self.deps.pipeline.acquire_room(room_id).await?;
        room.ensure_active()?;

        let participants = &self.deps.repositories.participants;
        let mut participant = participants
            .find(room_id, session.user_id())
            .await?
            .ok_or(DomainError::NotAuthorized)?;
        if !participant.is_present() {
            participant.rejoin();
            participants.upsert(participant).await?;
        }

        hub.attach(session, room_id).await?;
        // 槽位释放前确认，之后的 new_message 一定排在 joined_room 之后
        session.send(ServerEvent::JoinedRoom { room_id });
        info!(
            room_id = %room_id,
            user_id = %session.user_id(),
            session_id = %session.id(),
            "加入房间"
        );
        Ok(room)
    }

    /// 离开房间。该身份没有其他会话留在房间时才记录离开时间。
    ///
    /// 与加入共用房间槽位，同一身份的另一个会话不会在记录离开期间加入。
    /// 先写离开时间再解除附着，写入失败时会话仍留在房间内。
    pub async fn leave_room(
        &self,
        session: &Session,
        room_id: RoomId,
    ) -> Result<(), ApplicationError> {
        let hub = &self.deps.hub;
        if hub.current_room(session.id()).await != Some(room_id) {
            return Err(DomainError::NotInRoom.into());
        }

        // 等待期间房间可能已关闭，会话随之解除附着
        let (_slot, _room) = self.deps.pipeline.acquire_room(room_id).await?;
        if hub.current_room(session.id()).await != Some(room_id) {
            return Err(DomainError::NotInRoom.into());
        }
        if hub.sessions_of_user(room_id, session.user_id()).await <= 1 {
            let participants = &self.deps.repositories.participants;
            if let Some(mut participant) = participants.find(room_id, session.user_id()).await? {
                if participant.is_present() {
                    participant.leave(self.deps.clock.now());
                    participants.upsert(participant).await?;
                }
            }
        }
        if hub.detach(session, DetachReason::Left).await.is_none() {
            return Err(DomainError::NotInRoom.into());
        }
        info!(
            room_id = %room_id,
            user_id = %session.user_id(),
            session_id = %session.id(),
            "离开房间"
        );
        Ok(())
    }

    /// 关闭房间，只有提问者可以关闭。
    ///
    /// 在房间槽位内执行：关闭之后的提交一律返回 `RoomInactive`。
    pub async fn close_room(
        &self,
        room_id: RoomId,
        requester: &Identity,
    ) -> Result<Room, ApplicationError> {
        let (slot, mut room) = self.deps.pipeline.acquire_room(room_id).await?;

        let question = self
            .deps
            .repositories
            .questions
            .find_by_id(room.question_id)
            .await?
            .ok_or(DomainError::QuestionNotFound)?;
        if question.owner_id != requester.user_id {
            return Err(DomainError::NotAuthorized.into());
        }

        room.close(self.deps.clock.now())?;
        let room = self.deps.repositories.rooms.close(room).await?;
        let notified = self.deps.hub.close_room(room_id).await;
        self.deps.pipeline.release_slot(room_id, &slot).await;
        info!(room_id = %room_id, notified, "房间已关闭");
        Ok(room)
    }

    /// 拉取历史消息，仅限参与者。结果按序号升序。
    pub async fn list_messages(
        &self,
        room_id: RoomId,
        requester: &Identity,
        limit: Option<u32>,
        before: Option<MessageId>,
    ) -> Result<HistoryPage, ApplicationError> {
        self.load_room(room_id).await?;
        self.deps
            .repositories
            .participants
            .find(room_id, requester.user_id)
            .await?
            .ok_or(DomainError::NotAuthorized)?;

        let max = self.deps.history_limit.max(1);
        let limit = limit.unwrap_or(max).clamp(1, max);
        // 多取一条判断是否还有更早的消息
        let mut messages = self
            .deps
            .repositories
            .messages
            .list_recent(room_id, limit + 1, before)
            .await?;
        let has_more = messages.len() > limit as usize;
        if has_more {
            messages.remove(0);
        }
        Ok(HistoryPage { messages, has_more })
    }
}
