//! 聊天经纪门面
//!
//! 把认证、在线状态、房间广播、消息流水线和房间生命周期组合成对传输层与匹配服务
//! 暴露的操作集合。

use std::sync::Arc;
use std::time::Duration;

use domain::{
    DomainError, Identity, MatchDecision, Message, MessageId, MessageKind, QuestionId, Room,
    RoomId, ServerEvent, UserId,
};
use tracing::info;

use crate::{
    auth::{Authenticator, Credential},
    clock::Clock,
    error::ApplicationError,
    hub::{DetachReason, RoomHub},
    presence::PresenceRegistry,
    repository::Repositories,
    sequencer::MessagePipeline,
    services::{
        CreatedRoom, HistoryPage, MatchResponse, QuestionService, QuestionServiceDependencies,
        RoomLifecycleDependencies, RoomLifecycleService,
    },
    session::{OutboundReceiver, Session},
};

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// 等待房间槽位的上限
    pub submit_timeout: Duration,
    pub history_limit: u32,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_millis(2_000),
            history_limit: 50,
        }
    }
}

pub struct ChatBroker {
    authenticator: Authenticator,
    presence: Arc<PresenceRegistry>,
    hub: Arc<RoomHub>,
    pipeline: Arc<MessagePipeline>,
    rooms: RoomLifecycleService,
    questions: QuestionService,
    clock: Arc<dyn Clock>,
}

impl ChatBroker {
    pub fn new(
        repositories: Repositories,
        authenticator: Authenticator,
        clock: Arc<dyn Clock>,
        settings: BrokerSettings,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let hub = Arc::new(RoomHub::new(clock.clone()));
        let pipeline = Arc::new(MessagePipeline::new(
            repositories.clone(),
            hub.clone(),
            clock.clone(),
            settings.submit_timeout,
        ));
        let questions = QuestionService::new(QuestionServiceDependencies {
            questions: repositories.questions.clone(),
            clock: clock.clone(),
        });
        let rooms = RoomLifecycleService::new(RoomLifecycleDependencies {
            repositories,
            hub: hub.clone(),
            pipeline: pipeline.clone(),
            clock: clock.clone(),
            history_limit: settings.history_limit,
        });

        Self {
            authenticator,
            presence,
            hub,
            pipeline,
            rooms,
            questions,
            clock,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn rooms(&self) -> &RoomLifecycleService {
        &self.rooms
    }

    pub async fn authenticate(&self, credential: &Credential) -> Result<Identity, ApplicationError> {
        self.authenticator.authenticate(credential).await
    }

    /// 为已认证身份建立会话并登记在线状态，首个出站事件为 `authenticated`
    pub async fn connect(&self, identity: Identity) -> (Arc<Session>, OutboundReceiver) {
        let (session, outbound) = Session::new(identity, self.clock.now());
        self.presence.register(session.clone()).await;
        session.send(ServerEvent::Authenticated {
            session_id: session.id(),
            user_id: session.user_id(),
            display_name: session.display_name().to_string(),
            role: session.identity().role,
        });
        info!(
            session_id = %session.id(),
            user_id = %session.user_id(),
            "会话已建立"
        );
        (session, outbound)
    }

    /// 会话终止时的清理：解除附着并注销在线状态，每个会话只执行一次
    pub async fn disconnect(&self, session: &Session) -> bool {
        if !session.begin_close() {
            return false;
        }
        let room = self.hub.detach(session, DetachReason::Disconnected).await;
        let offline = self.presence.unregister(session).await;
        info!(
            session_id = %session.id(),
            user_id = %session.user_id(),
            room_id = ?room,
            offline,
            "会话已断开"
        );
        true
    }

    pub async fn join_room(&self, session: &Arc<Session>, room_id: RoomId) -> Result<Room, ApplicationError> {
        self.rooms.join_room(session, room_id).await
    }

    pub async fn leave_room(&self, session: &Session, room_id: RoomId) -> Result<(), ApplicationError> {
        self.rooms.leave_room(session, room_id).await
    }

    async fn ensure_attached(&self, session: &Session, room_id: RoomId) -> Result<(), ApplicationError> {
        if self.hub.current_room(session.id()).await == Some(room_id) {
            Ok(())
        } else {
            Err(DomainError::NotInRoom.into())
        }
    }

    pub async fn send_message(
        &self,
        session: &Session,
        room_id: RoomId,
        content: String,
        kind: MessageKind,
    ) -> Result<Message, ApplicationError> {
        if let Err(err) = self.ensure_attached(session, room_id).await {
            // 房间关闭时附着已被撤销，报告房间状态而不是附着状态
            return match self.rooms.get_room(room_id).await {
                Ok(room) if !room.is_active() => Err(DomainError::RoomInactive.into()),
                _ => Err(err),
            };
        }
        self.pipeline.submit(room_id, session, content, kind).await
    }

    /// 输入状态只转发给房间内其他会话，不落库
    pub async fn set_typing(
        &self,
        session: &Session,
        room_id: RoomId,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        self.ensure_attached(session, room_id).await?;
        let event = ServerEvent::TypingIndicator {
            room_id,
            user_id: session.user_id(),
            display_name: session.display_name().to_string(),
            is_typing,
        };
        self.hub.broadcast(room_id, event, Some(session.id())).await;
        Ok(())
    }

    /// 建房并通知在线参与者
    pub async fn create_room(
        &self,
        question_id: QuestionId,
        requester: &Identity,
    ) -> Result<CreatedRoom, ApplicationError> {
        let created = self.rooms.create_room(question_id, requester).await?;
        let participant_ids: Vec<UserId> = created.participants.iter().map(|p| p.user_id).collect();
        self.notify_room_created(created.room.id, question_id, &participant_ids)
            .await;
        Ok(created)
    }

    /// 匹配服务建房后调用：预热房间并把 `room_created` 发给在线的参与者。返回投递的会话数。
    pub async fn notify_room_created(
        &self,
        room_id: RoomId,
        question_id: QuestionId,
        participant_ids: &[UserId],
    ) -> usize {
        self.hub
            .prepare_room(room_id, participant_ids.iter().copied())
            .await;

        let event = ServerEvent::RoomCreated {
            room_id,
            question_id,
        };
        let mut delivered = 0;
        for user_id in participant_ids {
            delivered += self.presence.send_to_user(*user_id, &event).await;
        }
        info!(room_id = %room_id, question_id = %question_id, delivered, "已通知参与者");
        delivered
    }

    pub async fn close_room(&self, room_id: RoomId, requester: &Identity) -> Result<Room, ApplicationError> {
        self.rooms.close_room(room_id, requester).await
    }

    pub async fn history(
        &self,
        requester: &Identity,
        room_id: RoomId,
        limit: Option<u32>,
        before: Option<MessageId>,
    ) -> Result<HistoryPage, ApplicationError> {
        self.rooms
            .list_messages(room_id, requester, limit, before)
            .await
    }

    /// 专家回应匹配；接受时通知提问者的所有会话
    pub async fn respond_to_question(
        &self,
        expert: &Identity,
        question_id: QuestionId,
        decision: MatchDecision,
    ) -> Result<MatchResponse, ApplicationError> {
        let response = self.questions.respond(expert, question_id, decision).await?;
        if decision == MatchDecision::Accept {
            let event = ServerEvent::ExpertAccepted {
                question_id,
                expert_id: expert.user_id,
                expert_name: expert.display_name.clone(),
            };
            self.presence
                .send_to_user(response.question.owner_id, &event)
                .await;
        }
        Ok(response)
    }
}
