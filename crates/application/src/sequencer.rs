//! 消息排序与持久化流水线
//!
//! 每个房间同一时刻只处理一次提交：取得房间槽位 → 分配序号 → 持久化 → 广播。
//! 广播在槽位释放前完成，因此所有接收者看到的顺序与序号顺序一致。
//! 不同房间的提交互不阻塞。
//!
//! 槽位只为存在且活跃的房间保留：房间不存在或已关闭时，最后一个持有者负责丢弃。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    DomainError, Message, MessageContent, MessageId, MessageKind, Room, RoomId, ServerEvent,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::hub::RoomHub;
use crate::repository::Repositories;
use crate::session::Session;

#[derive(Debug, Default)]
pub struct SlotState {
    /// 已持久化的最大序号；`None` 表示需要从存储重新加载
    last_id: Option<MessageId>,
}

/// 持有期间独占房间的串行槽位
pub type RoomSlot = OwnedMutexGuard<SlotState>;

pub struct MessagePipeline {
    repositories: Repositories,
    hub: Arc<RoomHub>,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<RoomId, Arc<Mutex<SlotState>>>>,
    submit_timeout: Duration,
}

impl MessagePipeline {
    pub fn new(
        repositories: Repositories,
        hub: Arc<RoomHub>,
        clock: Arc<dyn Clock>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            repositories,
            hub,
            clock,
            slots: Mutex::new(HashMap::new()),
            submit_timeout,
        }
    }

    /// 在限定时间内取得房间槽位，超时返回 `Busy`
    pub async fn acquire(&self, room_id: RoomId) -> Result<RoomSlot, ApplicationError> {
        let slot = self.slots.lock().await.entry(room_id).or_default().clone();
        tokio::time::timeout(self.submit_timeout, slot.lock_owned())
            .await
            .map_err(|_| {
                warn!(room_id = %room_id, "等待房间槽位超时");
                ApplicationError::Busy
            })
    }

    /// 取得槽位并加载房间。房间不存在时返回 `RoomNotFound`；
    /// 房间已关闭时照常返回，由调用方决定错误码。两种情况都会丢弃槽位。
    pub async fn acquire_room(&self, room_id: RoomId) -> Result<(RoomSlot, Room), ApplicationError> {
        let slot = self.acquire(room_id).await?;
        match self.repositories.rooms.find_by_id(room_id).await? {
            Some(room) => {
                if !room.is_active() {
                    self.release_slot(room_id, &slot).await;
                }
                Ok((slot, room))
            }
            None => {
                self.release_slot(room_id, &slot).await;
                Err(DomainError::RoomNotFound.into())
            }
        }
    }

    /// 从表中移除槽位。还有其他等待者时保留，由它们之中最后一个移除。
    pub async fn release_slot(&self, room_id: RoomId, slot: &RoomSlot) {
        let mut slots = self.slots.lock().await;
        let held = RoomSlot::mutex(slot);
        // 表中一份加上 `slot` 自身一份
        let unshared = slots
            .get(&room_id)
            .is_some_and(|current| Arc::ptr_eq(current, held) && Arc::strong_count(held) == 2);
        if unshared {
            slots.remove(&room_id);
            debug!(room_id = %room_id, "房间槽位已释放");
        }
    }

    /// 当前保留的房间槽位数
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// 提交一条消息，成功时消息已持久化并已广播给房间内所有附着会话
    pub async fn submit(
        &self,
        room_id: RoomId,
        sender: &Session,
        content: String,
        kind: MessageKind,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(content)?;
        let (mut slot, room) = self.acquire_room(room_id).await?;
        room.ensure_active()?;

        let participant = self
            .repositories
            .participants
            .find(room_id, sender.user_id())
            .await?;
        if !participant.is_some_and(|p| p.is_present()) {
            return Err(DomainError::NotAuthorized.into());
        }

        let id = match slot.last_id {
            Some(last) => last.next(),
            None => self
                .repositories
                .messages
                .last_message_id(room_id)
                .await?
                .map_or(MessageId::FIRST, MessageId::next),
        };

        let message = Message::new(
            id,
            room_id,
            sender.user_id(),
            content,
            kind,
            self.clock.now(),
        );
        let message = match self.repositories.messages.insert(message).await {
            Ok(message) => message,
            Err(err) => {
                slot.last_id = None;
                error!(room_id = %room_id, message_id = %id, error = %err, "消息持久化失败");
                return Err(ApplicationError::PersistFailed(err));
            }
        };
        slot.last_id = Some(message.id);

        let delivered = self
            .hub
            .broadcast(
                room_id,
                ServerEvent::NewMessage {
                    message: message.clone(),
                    sender_name: sender.display_name().to_string(),
                },
                None,
            )
            .await;
        debug!(
            room_id = %room_id,
            message_id = %message.id,
            delivered,
            "消息已广播"
        );
        Ok(message)
    }
}
