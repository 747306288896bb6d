//! 领域实体定义
//!
//! 包含系统的核心实体：身份、问题、聊天室、参与者、消息，以及 WebSocket 事件协议。

pub mod identity;
pub mod message;
pub mod participant;
pub mod question;
pub mod room;
pub mod websocket;

// 重新导出核心实体
pub use identity::{Identity, UserRole};
pub use message::{Message, MessageKind};
pub use participant::Participant;
pub use question::{ExpertMatch, MatchDecision, MatchStatus, Question, QuestionStatus};
pub use room::{Room, RoomStatus};
pub use websocket::{ClientEvent, ServerEvent};
