use axum::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;
use crate::keys::Actor;

#[derive(Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Authenticated caller. Rejects the request when no valid token is presented.
pub struct AuthUser(pub Actor);

/// Caller on routes where authentication is optional.
pub struct MaybeAuthUser(pub Option<Actor>);

fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(cookie_header) = parts.headers.get(axum::http::header::COOKIE) {
        let cookies = cookie_header.to_str().unwrap_or("");
        let token = cookies.split(';').find_map(|c| {
            let c = c.trim();
            c.strip_prefix("auth_token=").map(|s| s.to_string())
        });
        if token.is_some() {
            return token;
        }
    }
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|authz| authz.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").map(|s| s.to_string()))
}

fn actor_from_token(token: &str) -> Result<Actor, AppError> {
    let secret = crate::config::JWT_SECRET.as_str();
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|err| {
        tracing::debug!(?err, "rejected bearer token");
        AppError::NotAuthenticated
    })?;
    Ok(Actor::new(decoded.claims.sub, decoded.claims.roles))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(AppError::NotAuthenticated)?;
        actor_from_token(&token).map(AuthUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match token_from_parts(parts) {
            Some(token) => actor_from_token(&token).map(|actor| MaybeAuthUser(Some(actor))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}
