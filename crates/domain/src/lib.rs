//! 专家问答实时聊天核心领域模型
//!
//! 包含身份、问题、房间、参与者、消息等实体，以及客户端/服务端之间的事件协议。

pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
