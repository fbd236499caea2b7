//! JWT issuance and verification for human users.
//!
//! Tokens are signed with HS256 and carry the user id, email, and admin
//! flag. Verification pins the algorithm to HS256 so a token signed with
//! a different algorithm is always rejected.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Claims carried in an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a string.
    pub sub: String,
    /// Login email.
    pub email: String,
    /// Whether the user may access admin endpoints.
    pub is_admin: bool,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
}

/// Issue a signed access token.
pub fn issue_token(
    user_id: i64,
    email: &str,
    is_admin: bool,
    secret: &str,
    expire_hours: i64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        is_admin,
        exp: (now + Duration::hours(expire_hours)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Verify a token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub", "iat"]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AuthError::InvalidToken)?;

    Ok(data.claims)
}
