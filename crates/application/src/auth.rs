//! 连接认证
//!
//! 经纪层信任外部认证服务返回的身份；演示模式下可以直接用预置身份替代 token。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Identity, UserId, UserRole};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApplicationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("demo mode is disabled")]
    DemoDisabled,
    #[error("unknown demo user: {0}")]
    UnknownDemoUser(String),
}

/// 外部认证服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    /// 校验 token 并返回身份
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// 握手时客户端提交的凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    /// 演示账号（邮箱）
    Demo(String),
}

/// 演示模式下的预置身份
#[derive(Debug, Clone)]
pub struct DemoDirectory {
    users: HashMap<String, Identity>,
}

impl DemoDirectory {
    pub const QUESTIONER: &'static str = "alex@demo.com";
    pub const FIRST_EXPERT: &'static str = "sarah@demo.com";
    pub const SECOND_EXPERT: &'static str = "mike@demo.com";

    /// 一名提问者和两名专家
    pub fn standard() -> Self {
        let users = [
            (Self::QUESTIONER, 0xa1, "Alex Kim", UserRole::Questioner),
            (Self::FIRST_EXPERT, 0xa2, "Sarah Lee", UserRole::Expert),
            (Self::SECOND_EXPERT, 0xa3, "Mike Park", UserRole::Expert),
        ]
        .into_iter()
        .map(|(email, id, name, role)| {
            (
                email.to_string(),
                Identity::new(UserId::from(Uuid::from_u128(id)), name, role),
            )
        })
        .collect();
        Self { users }
    }

    pub fn lookup(&self, email: &str) -> Option<&Identity> {
        self.users.get(email)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.users.values()
    }
}

/// 握手认证入口
pub struct Authenticator {
    service: Arc<dyn AuthService>,
    demo: Option<DemoDirectory>,
}

impl Authenticator {
    pub fn new(service: Arc<dyn AuthService>) -> Self {
        Self {
            service,
            demo: None,
        }
    }

    /// 启用演示身份替代
    pub fn with_demo(mut self, directory: DemoDirectory) -> Self {
        self.demo = Some(directory);
        self
    }

    pub fn demo_enabled(&self) -> bool {
        self.demo.is_some()
    }

    pub async fn authenticate(&self, credential: &Credential) -> Result<Identity, ApplicationError> {
        match credential {
            Credential::Token(token) => {
                if token.trim().is_empty() {
                    return Err(AuthError::MissingCredential.into());
                }
                Ok(self.service.verify(token).await?)
            }
            Credential::Demo(email) => {
                let directory = self.demo.as_ref().ok_or(AuthError::DemoDisabled)?;
                directory
                    .lookup(email)
                    .cloned()
                    .ok_or_else(|| AuthError::UnknownDemoUser(email.clone()).into())
            }
        }
    }
}
