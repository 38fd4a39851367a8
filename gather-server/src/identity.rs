//! Bearer credential verification for REST calls and gateway handshakes.

use axum::http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded;

use crate::error::{ChatError, ChatResult};
use crate::ids::UserId;

/// Fallback header carrying a raw token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Validates a credential and yields the caller's user id.
///
/// Synchronous because it also runs inside the WebSocket handshake callback.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> ChatResult<UserId>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsUser {
    pub id: UserId,
}

/// Token payload: `{ "user": { "id": ... }, "exp": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user: ClaimsUser,
    pub exp: usize,
}

/// HS256 verifier over a shared secret.
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mint a token for `user_id` valid for `ttl_secs`.
    pub fn issue(&self, user_id: &UserId, ttl_secs: i64) -> ChatResult<String> {
        let exp = chrono::Utc::now().timestamp() + ttl_secs;
        let claims = Claims {
            user: ClaimsUser {
                id: user_id.clone(),
            },
            exp: usize::try_from(exp).unwrap_or(0),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ChatError::Internal(format!("token encoding failed: {}", e)))
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> ChatResult<UserId> {
        let data = decode::<Claims>(credential.trim(), &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "Rejected credential");
            match e.kind() {
                ErrorKind::ExpiredSignature => ChatError::Unauthenticated("Token has expired".to_string()),
                _ => ChatError::Unauthenticated("Token is not valid".to_string()),
            }
        })?;

        let user_id = data.claims.user.id;
        if user_id.is_blank() {
            return Err(ChatError::Unauthenticated("Token is not valid".to_string()));
        }
        Ok(user_id)
    }
}

fn bearer(value: &str) -> Option<&str> {
    let value = value.trim();
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// Credential from `Authorization: Bearer`, falling back to `x-auth-token`.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer)
    {
        return Some(token.to_string());
    }
    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Value of the `token` query parameter on an upgrade URL, percent-decoded.
pub fn credential_from_query(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.trim().to_string())
        .filter(|token| !token.is_empty())
}
