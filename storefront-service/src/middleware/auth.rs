//! Bearer-token extractors.
//!
//! Handlers that need a caller ask for `AuthPrincipal` (or `AdminPrincipal`)
//! and pass the principal on to the service call explicitly. Nothing is
//! stashed in request extensions.

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use service_core::error::AppError;

use crate::models::Principal;
use crate::services::TokenService;

/// A verified caller of any role.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub Principal);

/// A verified caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthPrincipal
where
    TokenService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Not authorized, no token provided"))
        })?;

        let principal = TokenService::from_ref(state).verify(token)?;
        tracing::Span::current().record("user_id", principal.id.as_str());

        Ok(AuthPrincipal(principal))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminPrincipal
where
    TokenService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthPrincipal(principal) = AuthPrincipal::from_request_parts(parts, state).await?;

        if !principal.is_admin() {
            tracing::warn!(user_id = %principal.id, "Admin route refused for non-admin principal");
            return Err(AppError::Forbidden(anyhow::anyhow!("Not authorized as an admin")));
        }

        Ok(AdminPrincipal(principal))
    }
}
