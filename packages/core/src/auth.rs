//! Bearer-token access guard and password hashing.
//!
//! Tokens are self-contained HMAC-SHA256 blobs: a version byte, a JSON
//! payload (user id plus issue and expiry timestamps), and a truncated
//! authentication tag, base64url-encoded into one opaque string. No
//! token state is kept server-side; possession of a valid signature is
//! the credential. Tag comparison goes through the `hmac` crate and is
//! constant-time.
//!
//! Passwords are stored as salted SHA-256 digests in a versioned
//! `v1$<salt>$<digest>` format so the scheme can be swapped later
//! without invalidating existing rows.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: u8 = 1;
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed token")]
    InvalidFormat,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid credentials")]
    BadCredentials,
}

/// Verified token contents, attached to guarded requests as an extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies access tokens for one signing key.
pub struct AccessGuard {
    key: Vec<u8>,
    token_ttl: Duration,
}

impl AccessGuard {
    pub fn new(secret: &str, token_ttl_seconds: i64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            token_ttl: Duration::seconds(token_ttl_seconds),
        }
    }

    /// Guard with a random 32-byte key, for tests.
    pub fn with_random_key(token_ttl_seconds: i64) -> Self {
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            key,
            token_ttl: Duration::seconds(token_ttl_seconds),
        }
    }

    /// Mint a token for `user_id`, valid for the configured TTL from `now`.
    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) -> String {
        let identity = Identity {
            user_id,
            issued_at: now,
            expires_at: now + self.token_ttl,
        };
        let payload =
            serde_json::to_vec(&identity).expect("identity payload should serialize");

        let mut data = Vec::with_capacity(1 + payload.len() + TAG_LEN);
        data.push(TOKEN_VERSION);
        data.extend_from_slice(&payload);
        let tag = self.sign(&data);
        data.extend_from_slice(&tag[..TAG_LEN]);
        URL_SAFE_NO_PAD.encode(data)
    }

    /// Check signature, version, and expiry; return the embedded identity.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let data = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AuthError::InvalidFormat)?;
        if data.len() <= 1 + TAG_LEN {
            return Err(AuthError::InvalidFormat);
        }

        let (signed, tag) = data.split_at(data.len() - TAG_LEN);
        if signed[0] != TOKEN_VERSION {
            return Err(AuthError::InvalidFormat);
        }

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("hmac accepts keys of any length");
        mac.update(signed);
        mac.verify_truncated_left(tag)
            .map_err(|_| AuthError::InvalidSignature)?;

        let identity: Identity =
            serde_json::from_slice(&signed[1..]).map_err(|_| AuthError::InvalidFormat)?;
        if now >= identity.expires_at {
            return Err(AuthError::Expired);
        }
        Ok(identity)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("hmac accepts keys of any length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

// ---- Password hashing ----

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!("v1${}${}", hex::encode(salt), hex::encode(digest))
}

/// Check `password` against a stored `v1$<salt>$<digest>` string.
/// Unknown formats verify as false rather than erroring.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("v1"), Some(salt_hex), Some(digest_hex), None) => {
            let salt = match hex::decode(salt_hex) {
                Ok(salt) => salt,
                Err(_) => return false,
            };
            let expected = match hex::decode(digest_hex) {
                Ok(digest) => digest,
                Err(_) => return false,
            };
            salted_digest(&salt, password).as_slice() == expected.as_slice()
        }
        _ => false,
    }
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

// ---- Middleware ----

/// Require a valid `Authorization: Bearer <token>` header and attach the
/// verified [`Identity`] to the request extensions.
pub async fn require_auth(
    State(guard): State<Arc<AccessGuard>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| unauthorized(&AuthError::MissingToken))?;
    let identity = guard
        .verify(token, Utc::now())
        .map_err(|err| unauthorized(&err))?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// 401 body shared by the middleware and the login handler.
pub fn unauthorized(err: &AuthError) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": { "kind": "unauthorized", "message": err.to_string() }
        })),
    )
}
