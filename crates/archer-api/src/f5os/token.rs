// Cached F5OS bearer token with local expiry check.
//
// F5OS hands out a JWT in the `X-Auth-Token` response header. Only the
// `exp` claim is read; the signature is the device's business.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

impl CachedToken {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at = jwt_expiry(&value);
        Self { value, expires_at }
    }

    /// `true` while the token can still be sent. Tokens without a
    /// readable `exp` stay valid until the device rejects them.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now + TimeDelta::seconds(EXPIRY_SKEW_SECS) < exp)
    }
}

/// Decode the `exp` claim of a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}
