use std::sync::Arc;

use domain::{ClientEvent, MatchDecision, ServerEvent};
use tracing::{debug, warn};

use crate::{broker::ChatBroker, error::ApplicationError, session::Session};

/// 入站事件分发器
///
/// 每个入站帧只对应一次经纪操作，不自动重试；错误只回给发起的会话。
#[derive(Clone)]
pub struct EventDispatcher {
    broker: Arc<ChatBroker>,
}

impl EventDispatcher {
    pub fn new(broker: Arc<ChatBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<ChatBroker> {
        &self.broker
    }

    /// 处理一帧文本
    pub async fn dispatch(&self, session: &Arc<Session>, frame: &str) {
        let event = match ClientEvent::decode(frame) {
            Ok(event) => event,
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "无法解析的入站帧");
                self.reply_error(session, &ApplicationError::invalid_event(err.to_string()));
                return;
            }
        };

        let name = event.name();
        debug!(session_id = %session.id(), event = name, "收到事件");
        if let Err(err) = self.handle(session, event).await {
            warn!(
                session_id = %session.id(),
                event = name,
                code = err.code(),
                error = %err,
                "事件被拒绝"
            );
            self.reply_error(session, &err);
        }
    }

    fn reply_error(&self, session: &Session, err: &ApplicationError) {
        session.send(ServerEvent::error(err.code(), err.to_string()));
    }

    async fn handle(&self, session: &Arc<Session>, event: ClientEvent) -> Result<(), ApplicationError> {
        let broker = &self.broker;
        match event {
            ClientEvent::Authenticate { .. } => {
                return Err(ApplicationError::invalid_event("session already authenticated"));
            }
            ClientEvent::JoinRoom { room_id } => {
                broker.join_room(session, room_id).await?;
            }
            ClientEvent::LeaveRoom { room_id } => {
                broker.leave_room(session, room_id).await?;
                session.send(ServerEvent::LeftRoom { room_id });
            }
            ClientEvent::SendMessage {
                room_id,
                content,
                kind,
            } => {
                broker.send_message(session, room_id, content, kind).await?;
            }
            ClientEvent::TypingStart { room_id } => {
                broker.set_typing(session, room_id, true).await?;
            }
            ClientEvent::TypingStop { room_id } => {
                broker.set_typing(session, room_id, false).await?;
            }
            ClientEvent::AcceptQuestion { question_id } => {
                broker
                    .respond_to_question(session.identity(), question_id, MatchDecision::Accept)
                    .await?;
                session.send(ServerEvent::QuestionAccepted { question_id });
            }
            ClientEvent::RejectQuestion { question_id } => {
                broker
                    .respond_to_question(session.identity(), question_id, MatchDecision::Reject)
                    .await?;
                session.send(ServerEvent::QuestionRejected { question_id });
            }
            ClientEvent::CreateRoom { question_id } => {
                broker.create_room(question_id, session.identity()).await?;
            }
            ClientEvent::CloseRoom { room_id } => {
                broker.close_room(room_id, session.identity()).await?;
            }
            ClientEvent::GetHistory {
                room_id,
                limit,
                before,
            } => {
                let page = broker
                    .history(session.identity(), room_id, limit, before)
                    .await?;
                session.send(ServerEvent::History {
                    room_id,
                    messages: page.messages,
                    has_more: page.has_more,
                });
            }
            ClientEvent::Ping => {
                session.send(ServerEvent::Pong);
            }
        }
        Ok(())
    }
}
