use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::identity::{Caller, IdentityError, IdentityProvider, UserId};
use crate::Token;

/// 設定ファイルのトークン表で利用者を識別する
#[derive(Clone, Debug, Default)]
pub struct StaticTokenIdentityProvider {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenIdentityProvider {
    pub fn new<'a, I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = &'a Token>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| {
                    (
                        t.token.clone(),
                        Caller::new(UserId::new(t.user_id.clone()), t.role),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentityProvider {
    async fn identify(&self, token: &str) -> Result<Caller, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::Role;

    #[tokio::test]
    async fn test_identify() {
        let tokens = vec![
            Token {
                token: "user-token".to_owned(),
                user_id: "clerk-001".to_owned(),
                role: Role::User,
            },
            Token {
                token: "admin-token".to_owned(),
                user_id: "clerk-admin".to_owned(),
                role: Role::Admin,
            },
        ];
        let provider = StaticTokenIdentityProvider::new(&tokens);
        assert_eq!(
            provider.identify("user-token").await,
            Ok(Caller::user("clerk-001"))
        );
        assert_eq!(
            provider.identify("admin-token").await,
            Ok(Caller::admin("clerk-admin"))
        );
        assert_eq!(
            provider.identify("nope").await,
            Err(IdentityError::InvalidToken)
        );
        assert_eq!(provider.identify("").await, Err(IdentityError::MissingToken));
    }
}
