use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use serde::{Deserialize, Serialize};

/// Access-token claims. Doubles as an axum extractor: any handler that
/// takes `claims: Claims` is JWT-guarded.
///
/// The username is embedded at issue time so the realtime layer can tag
/// cursor and chat events without a lookup; a rename takes effect on
/// the next login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (UUIDv7)
    pub sub: String,
    pub username: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
}

/// Signing secret, stashed in request extensions by the router
/// middleware so the extractor below can reach it without state access.
#[derive(Clone)]
pub struct JwtSecret(pub Vec<u8>);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(StatusCode::UNAUTHORIZED)?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

        crate::auth::jwt::validate_access_token(&secret.0, token)
            .map_err(|_| StatusCode::UNAUTHORIZED)
    }
}
