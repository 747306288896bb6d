//! JWT 认证实现
//!
//! HS256 对称签名，claims 中携带用户标识、显示名和角色。

use application::{AuthError, AuthService};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use domain::{Identity, UserId, UserRole};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtAuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: Duration,
}

impl JwtAuthService {
    pub fn new(secret: &str, expiration: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration,
        }
    }

    /// 签发 token，供认证服务和测试使用
    pub fn issue_token(&self, identity: &Identity) -> Result<String, AuthError> {
        let claims = Claims {
            sub: identity.user_id.into(),
            name: identity.display_name.clone(),
            role: identity.role.as_str().to_string(),
            exp: (Utc::now() + self.expiration).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::InvalidCredential(format!("token generation failed: {err}")))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| AuthError::InvalidCredential(err.to_string()))
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.decode_claims(token)?;
        let role = UserRole::parse(&claims.role)
            .ok_or_else(|| AuthError::InvalidCredential(format!("unknown role: {}", claims.role)))?;
        debug!(user_id = %claims.sub, role = role.as_str(), "token 校验通过");
        Ok(Identity::new(UserId::from(claims.sub), claims.name, role))
    }
}
