//! 统一配置中心
//!
//! 加载顺序：内置默认值 → `chatroom.toml`（可选）→ `CHATROOM_` 前缀的环境变量，
//! 嵌套字段用 `__` 分隔，例如 `CHATROOM_BROKER__SUBMIT_TIMEOUT_MS=500`。

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "chatroom.toml";
pub const ENV_PREFIX: &str = "CHATROOM_";

/// 全局应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub broker: BrokerConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// 数据库配置
///
/// 未配置 `url` 时使用内存存储并写入演示数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 签名密钥，至少 32 个字符
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// 允许 `demo_user` 直接换取预置身份
    pub demo_mode: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-key-not-for-production-use-minimum-32-chars".to_string(),
            token_ttl_hours: 24,
            demo_mode: false,
        }
    }
}

/// 经纪层配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// 等待房间槽位的上限
    pub submit_timeout_ms: u64,
    /// 未认证连接的存活上限
    pub handshake_timeout_ms: u64,
    pub history_limit: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 2_000,
            handshake_timeout_ms: 10_000,
            history_limit: 50,
        }
    }
}

impl BrokerConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl AppConfig {
    /// 从默认配置文件和环境变量加载
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment(path).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 合并后的配置源，文件不存在时跳过
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 至少 256 位
        if self.auth.jwt_secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "token ttl must be positive".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }
        if matches!(&self.database.url, Some(url) if url.trim().is_empty()) {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.broker.submit_timeout_ms == 0 || self.broker.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidBrokerConfig(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.broker.history_limit == 0 {
            return Err(ConfigError::InvalidBrokerConfig(
                "history limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid broker configuration: {0}")]
    InvalidBrokerConfig(String),
}
