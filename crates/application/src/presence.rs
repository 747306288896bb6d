use std::collections::HashMap;
use std::sync::Arc;

use domain::{ServerEvent, SessionId, UserId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::Session;

/// 在线状态注册表
///
/// 以身份 → 会话集合的形式记录在线连接，一个身份可以同时拥有多个会话。
/// 只存在于内存，不作为房间成员关系的依据。
#[derive(Default)]
pub struct PresenceRegistry {
    users: RwLock<HashMap<UserId, HashMap<SessionId, Arc<Session>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记会话，重复登记不会产生重复条目
    pub async fn register(&self, session: Arc<Session>) {
        let mut users = self.users.write().await;
        let sessions = users.entry(session.user_id()).or_default();
        sessions.insert(session.id(), session.clone());
        debug!(
            user_id = %session.user_id(),
            session_id = %session.id(),
            sessions = sessions.len(),
            "会话上线"
        );
    }

    /// 注销会话，返回该身份是否因此离线
    pub async fn unregister(&self, session: &Session) -> bool {
        let mut users = self.users.write().await;
        let Some(sessions) = users.get_mut(&session.user_id()) else {
            return false;
        };
        if sessions.remove(&session.id()).is_none() {
            return false;
        }
        if sessions.is_empty() {
            users.remove(&session.user_id());
            debug!(user_id = %session.user_id(), "用户离线");
            return true;
        }
        false
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.users.read().await.contains_key(&user_id)
    }

    pub async fn sessions_of(&self, user_id: UserId) -> Vec<Arc<Session>> {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 向某个身份的所有会话投递事件，返回成功投递的会话数
    pub async fn send_to_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
        self.sessions_of(user_id)
            .await
            .iter()
            .filter(|session| session.send(event.clone()))
            .count()
    }

    /// 在线身份数
    pub async fn online_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{Identity, UserRole};

    fn identity(name: &str) -> Identity {
        Identity::new(UserId::generate(), name, UserRole::Expert)
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = PresenceRegistry::new();
        let (session, _rx) = Session::new(identity("Sarah Lee"), Utc::now());

        registry.register(session.clone()).await;
        registry.register(session.clone()).await;

        assert!(registry.is_online(session.user_id()).await);
        assert_eq!(registry.sessions_of(session.user_id()).await.len(), 1);
        assert_eq!(registry.online_count().await, 1);

        assert!(registry.unregister(&session).await);
        assert!(!registry.unregister(&session).await);
        assert!(!registry.is_online(session.user_id()).await);
    }

    #[tokio::test]
    async fn identity_stays_online_while_any_session_remains() {
        let registry = PresenceRegistry::new();
        let who = identity("Mike Park");
        let (laptop, mut laptop_rx) = Session::new(who.clone(), Utc::now());
        let (phone, mut phone_rx) = Session::new(who.clone(), Utc::now());
        registry.register(laptop.clone()).await;
        registry.register(phone.clone()).await;

        assert_eq!(registry.send_to_user(who.user_id, &ServerEvent::Pong).await, 2);
        assert_eq!(laptop_rx.try_recv().unwrap(), ServerEvent::Pong);
        assert_eq!(phone_rx.try_recv().unwrap(), ServerEvent::Pong);

        assert!(!registry.unregister(&laptop).await);
        assert!(registry.is_online(who.user_id).await);
        assert!(registry.unregister(&phone).await);
        assert_eq!(registry.online_count().await, 0);
    }

    #[tokio::test]
    async fn send_to_offline_user_reaches_nobody() {
        let registry = PresenceRegistry::new();
        assert_eq!(
            registry.send_to_user(UserId::generate(), &ServerEvent::Pong).await,
            0
        );
    }
}
