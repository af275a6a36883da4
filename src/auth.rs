//! Session token validation.
//!
//! Token issuance is external; the server only validates. A token is
//! `base64url(claims_json) "." base64url(hmac_sha256(claims_json))` signed
//! with a shared key. Verification is constant-time via the hmac crate.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::protocol::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: UserId,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Errors produced during token validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

/// Validates session tokens against the shared signing key.
#[derive(Clone)]
pub struct TokenValidator {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator").finish_non_exhaustive()
    }
}

impl TokenValidator {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let (claims_b64, mac_b64) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let claims_bytes = BASE64.decode(claims_b64).map_err(|_| AuthError::Malformed)?;
        let mac_bytes = BASE64.decode(mac_b64).map_err(|_| AuthError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| AuthError::BadSignature)?;
        mac.update(&claims_bytes);
        mac.verify_slice(&mac_bytes).map_err(|_| AuthError::BadSignature)?;

        let claims: TokenClaims =
            serde_json::from_slice(&claims_bytes).map_err(|_| AuthError::Malformed)?;
        if now >= claims.expires_at {
            return Err(AuthError::Expired(claims.expires_at));
        }
        Ok(claims)
    }

    /// Sign claims into a token. The production issuer lives elsewhere; this
    /// exists for tooling and tests.
    pub fn mint(&self, claims: &TokenClaims) -> String {
        let claims_bytes = serde_json::to_vec(claims).unwrap_or_default();
        // HMAC accepts keys of any length, so construction cannot fail
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return String::new();
        };
        mac.update(&claims_bytes);
        let tag = mac.finalize().into_bytes();
        format!("{}.{}", BASE64.encode(&claims_bytes), BASE64.encode(tag))
    }
}
