//! 应用层实现。
//!
//! 实时聊天经纪：连接会话、在线状态、房间广播、按房间串行的消息流水线，
//! 以及房间生命周期和专家匹配回应等用例。存储和认证通过 trait 注入。

pub mod auth;
pub mod broker;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod sequencer;
pub mod services;
pub mod session;

pub use auth::{AuthError, AuthService, Authenticator, Credential, DemoDirectory};
pub use broker::{BrokerSettings, ChatBroker};
pub use clock::{Clock, SystemClock};
pub use dispatcher::EventDispatcher;
pub use error::ApplicationError;
pub use hub::{DetachReason, RoomHub};
pub use memory::{DemoSeed, InMemoryStore};
pub use presence::PresenceRegistry;
pub use repository::{
    MessageRepository, ParticipantRepository, QuestionRepository, Repositories, RoomRepository,
};
pub use sequencer::{MessagePipeline, RoomSlot};
pub use services::{
    CreatedRoom, HistoryPage, MatchResponse, QuestionService, QuestionServiceDependencies,
    RoomLifecycleDependencies, RoomLifecycleService,
};
pub use session::{OutboundReceiver, Session};
