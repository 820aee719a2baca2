use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token type carried by end-user sessions.
pub const ACCESS_TOKEN_TYPE: &str = "access";
/// Token type for backend services pushing notifications.
pub const SERVICE_TOKEN_TYPE: &str = "service";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("expected a `{expected}` token")]
    WrongTokenType { expected: &'static str },
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(rename = "type")]
    pub token_type: String,
}

pub fn create_token(
    user_id: &str,
    secret: &str,
    expiry_secs: u64,
    token_type: &str,
) -> Result<String, AuthError> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + expiry_secs as usize,
        token_type: token_type.to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn validate_token(
    token: &str,
    secret: &str,
    expected_type: &'static str,
) -> Result<Claims, AuthError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;
    if claims.token_type != expected_type {
        return Err(AuthError::WrongTokenType {
            expected: expected_type,
        });
    }
    if claims.sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(claims)
}
