//! Error types for the session lifecycle.
//!
//! Failures fall into a small taxonomy that callers can pattern-match on
//! through [`Error::kind`]:
//!
//! - **Transport**: network failures and timeouts. Safe to retry by user action.
//! - **Protocol**: malformed or unexpected responses. Retry the whole flow.
//! - **Rejected**: the service said no ([`AuthError`]). Show the server message.
//! - **Invariant**: the service violated a contract we rely on. Abort.
//! - **Local**: configuration, storage and I/O on this machine.
//!
//! # Example
//!
//! ```rust
//! use yeti_session::session::error::{AuthError, Error, ErrorKind};
//!
//! let err = Error::from(AuthError::login_failed("Invalid credentials", 400));
//! assert_eq!(err.kind(), ErrorKind::Rejected);
//! assert!(err.is_login_failure());
//! assert!(!err.is_recoverable());
//! ```

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or timeout failure.
    Transport,
    /// The service answered with something we could not interpret.
    Protocol,
    /// Application-level rejection carrying a server message.
    Rejected,
    /// The service broke an invariant of the flow.
    Invariant,
    /// Local configuration, storage or filesystem failure.
    Local,
}

/// Unified error type for session operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Rejection reported by the OAuth or OTT service.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Malformed or unexpected response.
    ///
    /// Missing discovery parameters, non-2xx statuses on calls without a
    /// dedicated rejection type, and undecodable bodies all end up here.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server confirmed a device id different from the local one.
    #[error("Device id mismatch: expected {expected}, server returned {actual}")]
    DeviceIdMismatch {
        /// Locally generated device id.
        expected: String,
        /// Device id confirmed by the household service.
        actual: String,
    },

    /// Network or HTTP transport error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Create a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Transport,
            Self::Protocol(_) | Self::Json(_) | Self::Url(_) => ErrorKind::Protocol,
            Self::Auth(_) => ErrorKind::Rejected,
            Self::DeviceIdMismatch { .. } => ErrorKind::Invariant,
            Self::Config(_) | Self::Storage(_) | Self::Io(_) => ErrorKind::Local,
        }
    }

    /// Check if this is a login rejection, including a failed session refresh.
    #[must_use]
    pub fn is_login_failure(&self) -> bool {
        matches!(self, Self::Auth(auth) if auth.is_login_failure())
    }

    /// Check if this is the "device not registered" sentinel.
    #[must_use]
    pub fn is_device_not_registered(&self) -> bool {
        matches!(self, Self::Auth(AuthError::DeviceNotRegistered))
    }

    /// Check if this error is transient and safe to retry.
    ///
    /// Only transport failures qualify. Everything else needs either a
    /// fresh run of the whole flow or user action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }

    /// Server-provided message and code, if this is a server rejection.
    #[must_use]
    pub fn server_message(&self) -> Option<(&str, i64)> {
        match self {
            Self::Auth(auth) => auth.server_message(),
            _ => None,
        }
    }
}

/// Rejections reported by the OAuth or OTT service.
///
/// Messages and codes are carried verbatim so they can be shown to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// Credentials or OTT login were rejected.
    #[error("Login failed: {message} ({code})")]
    LoginFailed {
        /// Server message.
        message: String,
        /// Server code, 0 when none was given.
        code: i64,
    },

    /// The service refused to refresh the KS session.
    ///
    /// A specialization of [`AuthError::LoginFailed`].
    #[error("Session refresh failed: {message} ({code})")]
    RefreshSessionFailed {
        /// Server message.
        message: String,
        /// Server code, 0 when none was given.
        code: i64,
    },

    /// The household refused to register this device.
    #[error("Failed to add device to household: {message}")]
    AddHouseholdDevice {
        /// Server message.
        message: String,
    },

    /// The current device is not part of the household yet.
    #[error("Device is not registered in the household")]
    DeviceNotRegistered,

    /// The household refused to remove a device.
    #[error("Device removal failed: {message} ({code})")]
    DeviceDeletionFailed {
        /// Server message.
        message: String,
        /// Server code, 0 when none was given.
        code: i64,
    },
}

impl AuthError {
    /// Create a login failure.
    #[must_use]
    pub fn login_failed(message: impl Into<String>, code: i64) -> Self {
        Self::LoginFailed {
            message: message.into(),
            code,
        }
    }

    /// Create a refresh failure.
    #[must_use]
    pub fn refresh_failed(message: impl Into<String>, code: i64) -> Self {
        Self::RefreshSessionFailed {
            message: message.into(),
            code,
        }
    }

    /// True for [`AuthError::LoginFailed`] and its refresh subtype.
    #[must_use]
    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            Self::LoginFailed { .. } | Self::RefreshSessionFailed { .. }
        )
    }

    /// Server message and code for variants that carry them.
    #[must_use]
    pub fn server_message(&self) -> Option<(&str, i64)> {
        match self {
            Self::LoginFailed { message, code }
            | Self::RefreshSessionFailed { message, code }
            | Self::DeviceDeletionFailed { message, code } => Some((message, *code)),
            Self::AddHouseholdDevice { message } => Some((message, 0)),
            Self::DeviceNotRegistered => None,
        }
    }
}

#[cfg(feature = "keyring")]
impl From<keyring::Error> for Error {
    fn from(e: keyring::Error) -> Self {
        Self::Storage(format!("Keyring error: {e}"))
    }
}

/// Deserialize a server error code that may be a number or a numeric string.
///
/// Anything that is neither maps to 0.
pub(crate) fn lenient_code<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}
