//! 基础设施层实现。
//!
//! 提供 PostgreSQL 存储和 JWT 认证两个适配器，实现应用层定义的接口。

pub mod auth;
pub mod builder;
pub mod migrations;
pub mod repository;

pub use auth::{Claims, JwtAuthService};
pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgStore};
