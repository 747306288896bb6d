//! 连接会话
//!
//! 一个会话对应一个客户端的一条已认证连接，拥有自己的出站队列。
//! 当前所在房间由 [`RoomHub`](crate::hub::RoomHub) 记录，而不是会话自身。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use domain::{Identity, ServerEvent, SessionId, Timestamp, UserId};
use tokio::sync::mpsc;

pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerEvent>;

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: Identity,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    connected_at: Timestamp,
    closed: AtomicBool,
}

impl Session {
    /// 创建会话，返回出站队列的接收端供传输层写回客户端
    pub fn new(identity: Identity, connected_at: Timestamp) -> (Arc<Self>, OutboundReceiver) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: SessionId::generate(),
            identity,
            outbound,
            connected_at,
            closed: AtomicBool::new(false),
        });
        (session, receiver)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.identity.display_name
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    /// 投递事件到出站队列；会话已关闭或接收端已释放时返回 false
    pub fn send(&self, event: ServerEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outbound.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 标记会话关闭，只有第一次调用返回 true
    pub(crate) fn begin_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::UserRole;

    #[test]
    fn send_after_close_is_dropped() {
        let identity = Identity::new(UserId::generate(), "Mike Park", UserRole::Expert);
        let (session, mut rx) = Session::new(identity, Utc::now());

        assert!(session.send(ServerEvent::Pong));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Pong);

        assert!(session.begin_close());
        assert!(!session.begin_close());
        assert!(!session.send(ServerEvent::Pong));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn every_session_gets_its_own_id() {
        let identity = Identity::new(UserId::generate(), "Alex Kim", UserRole::Questioner);
        let (a, _rx_a) = Session::new(identity.clone(), Utc::now());
        let (b, _rx_b) = Session::new(identity, Utc::now());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.user_id(), b.user_id());
    }
}
