//! 房间广播中心
//!
//! 记录每个活跃房间当前附着的会话，并按附着顺序扇出事件。
//! 每个房间有自己的扇出锁，同一房间的事件在所有接收者处顺序一致。
//!
//! 锁顺序固定为 `attachments` → `rooms` → 房间扇出锁，广播只取后两者。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{DomainError, RoomId, ServerEvent, SessionId, UserId};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::session::Session;

/// 会话离开房间的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// 客户端主动离开，广播 `user_left`
    Left,
    /// 连接中断，广播 `user_disconnected`
    Disconnected,
}

#[derive(Default)]
struct RoomChannel {
    /// 按附着顺序排列
    sessions: Mutex<Vec<Arc<Session>>>,
    /// 参与者投影；`None` 表示尚未由建房结果预热
    participants: RwLock<Option<HashSet<UserId>>>,
}

impl RoomChannel {
    fn fan_out(sessions: &[Arc<Session>], event: &ServerEvent, exclude: Option<SessionId>) -> usize {
        let mut delivered = 0;
        for session in sessions.iter().filter(|s| Some(s.id()) != exclude) {
            if session.send(event.clone()) {
                delivered += 1;
            } else {
                warn!(
                    session_id = %session.id(),
                    event = event.name(),
                    "出站队列已关闭，丢弃事件"
                );
            }
        }
        delivered
    }
}

pub struct RoomHub {
    rooms: RwLock<HashMap<RoomId, Arc<RoomChannel>>>,
    attachments: Mutex<HashMap<SessionId, RoomId>>,
    clock: Arc<dyn Clock>,
}

impl RoomHub {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            attachments: Mutex::new(HashMap::new()),
            clock,
        }
    }

    async fn channel(&self, room_id: RoomId) -> Option<Arc<RoomChannel>> {
        self.rooms.read().await.get(&room_id).cloned()
    }

    async fn channel_or_create(&self, room_id: RoomId) -> Arc<RoomChannel> {
        self.rooms.write().await.entry(room_id).or_default().clone()
    }

    /// 预热房间的参与者投影
    pub async fn prepare_room(&self, room_id: RoomId, participants: impl IntoIterator<Item = UserId>) {
        let channel = self.channel_or_create(room_id).await;
        channel
            .participants
            .write()
            .await
            .get_or_insert_with(HashSet::new)
            .extend(participants);
    }

    pub async fn participants(&self, room_id: RoomId) -> Vec<UserId> {
        match self.channel(room_id).await {
            Some(channel) => channel
                .participants
                .read()
                .await
                .iter()
                .flatten()
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }

    /// 按投影判断成员关系。房间未预热时返回 `None`，需要查询存储。
    pub async fn is_participant(&self, room_id: RoomId, user_id: UserId) -> Option<bool> {
        let channel = self.channel(room_id).await?;
        let participants = channel.participants.read().await;
        participants.as_ref().map(|known| known.contains(&user_id))
    }

    /// 将会话附着到房间，并向房间内其他会话广播 `user_joined`。
    ///
    /// 会话已附着在任意房间（包括同一房间）时返回 `AlreadyInRoom`；
    /// 会话已断开时返回 `SessionClosed`。断开先置关闭标记再取 `attachments`，
    /// 所以这里的检查与 `detach` 不会同时漏掉。
    pub async fn attach(&self, session: &Arc<Session>, room_id: RoomId) -> Result<(), DomainError> {
        let mut attachments = self.attachments.lock().await;
        if session.is_closed() {
            return Err(DomainError::SessionClosed);
        }
        if attachments.contains_key(&session.id()) {
            return Err(DomainError::AlreadyInRoom);
        }
        attachments.insert(session.id(), room_id);

        let channel = self.channel_or_create(room_id).await;
        if let Some(known) = channel.participants.write().await.as_mut() {
            known.insert(session.user_id());
        }

        let mut sessions = channel.sessions.lock().await;
        sessions.push(session.clone());
        let event = ServerEvent::UserJoined {
            room_id,
            user_id: session.user_id(),
            display_name: session.display_name().to_string(),
            timestamp: self.clock.now(),
        };
        RoomChannel::fan_out(&sessions, &event, Some(session.id()));
        debug!(
            room_id = %room_id,
            session_id = %session.id(),
            attached = sessions.len(),
            "会话已附着到房间"
        );
        Ok(())
    }

    /// 解除会话附着，返回原房间。
    ///
    /// 只有第一次调用会返回房间并向剩余会话广播离开事件。
    pub async fn detach(&self, session: &Session, reason: DetachReason) -> Option<RoomId> {
        let mut attachments = self.attachments.lock().await;
        let room_id = attachments.remove(&session.id())?;

        let Some(channel) = self.channel(room_id).await else {
            return Some(room_id);
        };
        let mut sessions = channel.sessions.lock().await;
        sessions.retain(|s| s.id() != session.id());

        if !sessions.is_empty() {
            let display_name = session.display_name().to_string();
            let timestamp = self.clock.now();
            let event = match reason {
                DetachReason::Left => ServerEvent::UserLeft {
                    room_id,
                    user_id: session.user_id(),
                    display_name,
                    timestamp,
                },
                DetachReason::Disconnected => ServerEvent::UserDisconnected {
                    room_id,
                    user_id: session.user_id(),
                    display_name,
                    timestamp,
                },
            };
            RoomChannel::fan_out(&sessions, &event, None);
        }
        debug!(
            room_id = %room_id,
            session_id = %session.id(),
            reason = ?reason,
            remaining = sessions.len(),
            "会话已离开房间"
        );
        Some(room_id)
    }

    /// 向房间内所有附着会话广播，`exclude` 指定的会话除外。返回投递数。
    pub async fn broadcast(
        &self,
        room_id: RoomId,
        event: ServerEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let Some(channel) = self.channel(room_id).await else {
            return 0;
        };
        let sessions = channel.sessions.lock().await;
        RoomChannel::fan_out(&sessions, &event, exclude)
    }

    /// 广播 `room_closed` 后撤销房间，所有会话随之解除附着。返回收到通知的会话数。
    pub async fn close_room(&self, room_id: RoomId) -> usize {
        let mut attachments = self.attachments.lock().await;
        let Some(channel) = self.rooms.write().await.remove(&room_id) else {
            return 0;
        };

        let mut sessions = channel.sessions.lock().await;
        let delivered = RoomChannel::fan_out(&sessions, &ServerEvent::RoomClosed { room_id }, None);
        for session in sessions.drain(..) {
            attachments.remove(&session.id());
        }
        info!(room_id = %room_id, notified = delivered, "房间已撤销");
        delivered
    }

    pub async fn attached_sessions(&self, room_id: RoomId) -> Vec<Arc<Session>> {
        match self.channel(room_id).await {
            Some(channel) => channel.sessions.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// 某个身份在房间内仍附着的会话数
    pub async fn sessions_of_user(&self, room_id: RoomId, user_id: UserId) -> usize {
        self.attached_sessions(room_id)
            .await
            .iter()
            .filter(|s| s.user_id() == user_id)
            .count()
    }

    pub async fn current_room(&self, session_id: SessionId) -> Option<RoomId> {
        self.attachments.lock().await.get(&session_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::session::OutboundReceiver;
    use chrono::Utc;
    use domain::{Identity, UserRole};

    fn hub() -> RoomHub {
        RoomHub::new(Arc::new(SystemClock))
    }

    fn connect(name: &str) -> (Arc<Session>, OutboundReceiver) {
        Session::new(
            Identity::new(UserId::generate(), name, UserRole::Expert),
            Utc::now(),
        )
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn attach_twice_is_rejected() {
        let hub = hub();
        let room = RoomId::generate();
        let (session, _rx) = connect("Alex Kim");

        hub.attach(&session, room).await.unwrap();
        assert_eq!(
            hub.attach(&session, room).await,
            Err(DomainError::AlreadyInRoom)
        );
        assert_eq!(
            hub.attach(&session, RoomId::generate()).await,
            Err(DomainError::AlreadyInRoom)
        );
        assert_eq!(hub.current_room(session.id()).await, Some(room));
    }

    #[tokio::test]
    async fn join_and_leave_are_announced_to_others() {
        let hub = hub();
        let room = RoomId::generate();
        let (alex, mut alex_rx) = connect("Alex Kim");
        let (sarah, mut sarah_rx) = connect("Sarah Lee");

        hub.attach(&alex, room).await.unwrap();
        hub.attach(&sarah, room).await.unwrap();

        let events = drain(&mut alex_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::UserJoined { user_id, .. }] if *user_id == sarah.user_id()
        ));
        assert!(drain(&mut sarah_rx).is_empty());

        assert_eq!(hub.detach(&sarah, DetachReason::Left).await, Some(room));
        assert!(matches!(
            drain(&mut alex_rx).as_slice(),
            [ServerEvent::UserLeft { .. }]
        ));
    }

    #[tokio::test]
    async fn second_detach_is_a_no_op() {
        let hub = hub();
        let room = RoomId::generate();
        let (alex, mut alex_rx) = connect("Alex Kim");
        let (mike, _mike_rx) = connect("Mike Park");
        hub.attach(&alex, room).await.unwrap();
        hub.attach(&mike, room).await.unwrap();
        drain(&mut alex_rx);

        assert_eq!(hub.detach(&mike, DetachReason::Disconnected).await, Some(room));
        assert_eq!(hub.detach(&mike, DetachReason::Disconnected).await, None);
        assert_eq!(hub.detach(&mike, DetachReason::Left).await, None);

        let events = drain(&mut alex_rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::UserDisconnected { .. }));
        assert_eq!(hub.attached_sessions(room).await.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_session() {
        let hub = hub();
        let room = RoomId::generate();
        let (alex, mut alex_rx) = connect("Alex Kim");
        let (sarah, mut sarah_rx) = connect("Sarah Lee");
        hub.attach(&alex, room).await.unwrap();
        hub.attach(&sarah, room).await.unwrap();
        drain(&mut alex_rx);

        let delivered = hub.broadcast(room, ServerEvent::Pong, Some(alex.id())).await;
        assert_eq!(delivered, 1);
        assert!(drain(&mut alex_rx).is_empty());
        assert_eq!(drain(&mut sarah_rx), vec![ServerEvent::Pong]);

        assert_eq!(hub.broadcast(RoomId::generate(), ServerEvent::Pong, None).await, 0);
    }

    #[tokio::test]
    async fn closing_room_releases_every_session() {
        let hub = hub();
        let room = RoomId::generate();
        let (alex, mut alex_rx) = connect("Alex Kim");
        hub.attach(&alex, room).await.unwrap();

        assert_eq!(hub.close_room(room).await, 1);
        assert_eq!(drain(&mut alex_rx), vec![ServerEvent::RoomClosed { room_id: room }]);
        assert_eq!(hub.current_room(alex.id()).await, None);
        assert_eq!(hub.close_room(room).await, 0);
    }

    #[tokio::test]
    async fn prepared_participants_are_remembered() {
        let hub = hub();
        let room = RoomId::generate();
        let ids = [UserId::generate(), UserId::generate()];
        hub.prepare_room(room, ids).await;

        let mut participants = hub.participants(room).await;
        participants.sort();
        let mut expected = ids.to_vec();
        expected.sort();
        assert_eq!(participants, expected);

        assert_eq!(hub.is_participant(room, ids[0]).await, Some(true));
        assert_eq!(hub.is_participant(room, UserId::generate()).await, Some(false));
        assert_eq!(hub.is_participant(RoomId::generate(), ids[0]).await, None);
    }

    #[tokio::test]
    async fn attaching_alone_does_not_prepare_the_projection() {
        let hub = hub();
        let room = RoomId::generate();
        let (alex, _rx) = connect("Alex Kim");
        hub.attach(&alex, room).await.unwrap();

        assert_eq!(hub.is_participant(room, UserId::generate()).await, None);
        assert!(hub.participants(room).await.is_empty());
    }

    #[tokio::test]
    async fn closed_session_cannot_attach() {
        let hub = hub();
        let room = RoomId::generate();
        let (alex, mut alex_rx) = connect("Alex Kim");
        let (mike, _mike_rx) = connect("Mike Park");
        hub.attach(&alex, room).await.unwrap();

        assert!(mike.begin_close());
        assert_eq!(hub.attach(&mike, room).await, Err(DomainError::SessionClosed));
        assert_eq!(hub.current_room(mike.id()).await, None);
        assert_eq!(hub.attached_sessions(room).await.len(), 1);
        assert!(drain(&mut alex_rx).is_empty());
    }
}
