use async_trait::async_trait;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 外部の認証基盤が発行する利用者ID
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 利用者のロール
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// 認証済みの呼び出し元
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(UserId::new(user_id), Role::User)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(UserId::new(user_id), Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Access denied")]
pub struct AccessDenied;

/// 所有者または管理者のみ許可する
pub fn authorize(caller: &Caller, owner: &UserId) -> Result<(), AccessDenied> {
    if caller.is_admin() || caller.user_id == *owner {
        Ok(())
    } else {
        Err(AccessDenied)
    }
}

/// 管理者のみ許可する
pub fn require_admin(caller: &Caller) -> Result<(), AccessDenied> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(AccessDenied)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
}

/// 認証基盤
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// トークンを検証して呼び出し元を返す
    async fn identify(&self, token: &str) -> Result<Caller, IdentityError>;
}
