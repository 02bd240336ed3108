use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;

/// Access token lifetime: 24 hours.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 86_400;

/// Room grant lifetime: 5 minutes. Long enough to open the socket and
/// join after fetching a project, short enough that a leaked grant is
/// useless.
pub const ROOM_GRANT_TTL_SECS: i64 = 300;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
/// Key MUST be cryptographically random, never human-readable.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        // Invalid key file — regenerate
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    // Generate new 256-bit random key
    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, &key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token (24-hour expiry).
/// Claims: sub=user_id, username, iat, exp. The username is embedded so
/// the realtime layer can tag cursor and chat events without a DB lookup.
pub fn issue_access_token(
    secret: &[u8],
    user_id: &str,
    username: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECS,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Validate an access token and return its claims.
pub fn validate_access_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

/// Claims for a room grant: a short-lived capability binding one user to
/// one project room. Issued when the project is fetched over HTTP,
/// consumed by the websocket join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomGrantClaims {
    /// User ID the grant was issued to
    pub sub: String,
    /// Project ID the grant authorizes joining
    pub room: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Issue a room grant for a user/project pair.
pub fn issue_room_grant(
    secret: &[u8],
    user_id: &str,
    project_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = RoomGrantClaims {
        sub: user_id.to_string(),
        room: project_id.to_string(),
        iat: now,
        exp: now + ROOM_GRANT_TTL_SECS,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Validate a room grant against the joining user and the requested room.
/// Returns false for any mismatch, bad signature, or expired grant.
pub fn validate_room_grant(secret: &[u8], grant: &str, user_id: &str, project_id: &str) -> bool {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    match decode::<RoomGrantClaims>(grant, &DecodingKey::from_secret(secret), &validation) {
        Ok(data) => data.claims.sub == user_id && data.claims.room == project_id,
        Err(_) => false,
    }
}
