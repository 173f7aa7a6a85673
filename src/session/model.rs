//! Session entities.
//!
//! Timestamps are Unix seconds, the unit the OTT service reports expiries in.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a generated device id.
pub const DEVICE_ID_LEN: usize = 16;

const DEVICE_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mask a secret for display, keeping the first four characters.
pub fn mask_token(token: &str) -> String {
    match token.char_indices().nth(4) {
        Some((idx, _)) => format!("{}****", &token[..idx]),
        None => "*".repeat(token.chars().count()),
    }
}

/// User credentials for the OAuth login form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"[redacted]")
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Stable identity of this install.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
}

impl DeviceIdentity {
    /// Generate a fresh 16-character uppercase alphanumeric id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let device_id = (0..DEVICE_ID_LEN)
            .map(|_| DEVICE_ID_ALPHABET[rng.gen_range(0..DEVICE_ID_ALPHABET.len())] as char)
            .collect();
        Self { device_id }
    }

    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.device_id
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.device_id)
    }
}

/// Token pair returned by the OAuth token endpoint, expiry still relative.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds from issue.
    pub expires_in: i64,
}

impl fmt::Debug for OAuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthGrant")
            .field("access_token", &mask_token(&self.access_token))
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Persisted OAuth token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry.
    pub expires_at: i64,
}

impl OAuthToken {
    /// Anchor a grant's relative lifetime at `now`.
    pub fn from_grant(grant: OAuthGrant, now: i64) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: now.saturating_add(grant.expires_in),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &mask_token(&self.access_token))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// KS session issued without credentials. Only good for escalation.
#[derive(Clone, PartialEq, Eq)]
pub struct AnonymousSession {
    pub ks_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl fmt::Debug for AnonymousSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymousSession")
            .field("ks_token", &mask_token(&self.ks_token))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Escalated KS session, the bearer credential for catalog and device calls.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceSession {
    pub ks_token: String,
    pub refresh_token: String,
    /// Absolute expiry.
    pub expires_at: i64,
}

impl ServiceSession {
    /// Usable strictly before `expires_at`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

impl fmt::Debug for ServiceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSession")
            .field("ks_token", &mask_token(&self.ks_token))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Household the escalated user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdBinding {
    /// `-1` when the service did not report one.
    pub household_id: i64,
    /// `-1` when the household has no users.
    pub user_id: String,
}
