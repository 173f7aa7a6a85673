//! PKCE (Proof Key for Code Exchange) pairs for the authorization-code flow.
//!
//! A pair is generated fresh for every authorizer run and never persisted.
//! The verifier is 43 URL-safe characters (32 random bytes, base64url).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

use super::error::{Error, Result};

/// Verifier entropy in bytes. Encodes to exactly 43 characters.
const VERIFIER_BYTES: usize = 32;

/// Challenge method supported by a PKCE pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    /// SHA-256 of the verifier, base64url without padding.
    S256,
    /// The verifier itself.
    Plain,
}

impl ChallengeMethod {
    /// Parse the method name advertised by the discovery endpoint.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(Error::protocol(format!(
                "unsupported code challenge method '{other}'"
            ))),
        }
    }

    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

/// A code verifier and its derived challenge.
#[derive(Clone)]
pub struct Pkce {
    /// Secret sent only with the token exchange.
    pub verifier: String,
    /// Value sent with the authorization request.
    pub challenge: String,
    /// How `challenge` was derived from `verifier`.
    pub method: ChallengeMethod,
}

impl fmt::Debug for Pkce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

impl Pkce {
    /// Generate a new S256 pair.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(ChallengeMethod::S256)
    }

    /// Generate a new pair using the given challenge method.
    #[must_use]
    pub fn generate_with(method: ChallengeMethod) -> Self {
        let random_bytes: [u8; VERIFIER_BYTES] = rand::thread_rng().gen();
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        let challenge = derive_challenge(&verifier, method);
        Self {
            verifier,
            challenge,
            method,
        }
    }

    /// Check that `challenge` was derived from `verifier` with `method`.
    #[must_use]
    pub fn verify(verifier: &str, challenge: &str, method: ChallengeMethod) -> bool {
        derive_challenge(verifier, method) == challenge
    }
}

fn derive_challenge(verifier: &str, method: ChallengeMethod) -> String {
    match method {
        ChallengeMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
        ChallengeMethod::Plain => verifier.to_string(),
    }
}
