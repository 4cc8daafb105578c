use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use quickpark::domain::identity::{Caller, IdentityError};

use crate::{error::ApiError, AppState};

/// `Authorization: Bearer <token>` から解決した呼び出し元
#[derive(Clone, Debug)]
pub struct AuthorizedCaller(pub Caller);

fn bearer_token(headers: &HeaderMap) -> Result<&str, IdentityError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(IdentityError::MissingToken)?;
    let value = value.trim();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(IdentityError::InvalidToken);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(IdentityError::MissingToken);
    }
    Ok(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthorizedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let caller = state.identity.identify(token).await?;
        Ok(Self(caller))
    }
}
