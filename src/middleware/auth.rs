use crate::{
    error::{AppError, AppResult},
    utils::jwt::{decode_jwt, is_access_token},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

/// Who is making the request, as vouched for by the sign-in service's token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
    pub name: Option<String>,
}

impl AuthContext {
    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_empty()
    }

    pub fn can_edit(&self) -> bool {
        self.is_authenticated() && matches!(self.role, Role::Admin | Role::Editor)
    }

    pub fn require_editor(&self) -> AppResult<()> {
        if self.can_edit() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Rejects requests without a valid access token and stores the
/// resulting `AuthContext` in the request extensions.
pub async fn auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let context = context_from_token(&token).ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Like `auth_middleware` but lets anonymous visitors through.
/// A bad token is treated as no token.
pub async fn optional_auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(context) = extract_bearer_token(&headers).and_then(|t| context_from_token(&t)) {
        request.extensions_mut().insert(context);
    }
    next.run(request).await
}

fn context_from_token(token: &str) -> Option<AuthContext> {
    let claims = decode_jwt(token).ok()?;
    if !is_access_token(&claims) || claims.sub.is_empty() {
        return None;
    }
    Some(AuthContext {
        user_id: claims.sub,
        role: claims.role,
        name: claims.name,
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

impl<S> OptionalFromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthContext>().cloned())
    }
}
