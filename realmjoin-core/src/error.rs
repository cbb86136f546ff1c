//! Error domain exposed to unprivileged callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in the realm error domain.
///
/// These are the only errors that cross the IPC boundary verbatim. Anything
/// outside this domain is logged to the diagnostics stream in full and
/// replaced with a generic classified error before reaching the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "domain", content = "message", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum RealmError {
    /// Something went wrong inside the daemon or an external tool.
    #[error("{0}")]
    Internal(String),

    /// No provider could resolve the requested name.
    #[error("{0}")]
    DiscoveryFailed(String),

    /// A join workflow stage failed.
    #[error("{0}")]
    EnrollFailed(String),

    /// A leave workflow stage failed.
    #[error("{0}")]
    UnenrollFailed(String),

    /// Changing permitted logins failed.
    #[error("{0}")]
    SetLoginsFailed(String),

    /// Another privileged action is already in progress.
    #[error("{0}")]
    Busy(String),

    /// The supplied admin credentials were rejected, or the join tool
    /// reported a permission problem.
    #[error("{0}")]
    AuthFailed(String),

    /// The caller is not authorized to invoke this method.
    #[error("{0}")]
    NotAuthorized(String),

    /// Malformed caller input, rejected before any side effect.
    #[error("{0}")]
    InvalidArgument(String),
}

impl RealmError {
    /// Stable wire identifier for this error, used in IPC replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Internal(_) => "internal",
            Self::DiscoveryFailed(_) => "discovery-failed",
            Self::EnrollFailed(_) => "enroll-failed",
            Self::UnenrollFailed(_) => "unenroll-failed",
            Self::SetLoginsFailed(_) => "set-logins-failed",
            Self::Busy(_) => "busy",
            Self::AuthFailed(_) => "auth-failed",
            Self::NotAuthorized(_) => "not-authorized",
            Self::InvalidArgument(_) => "invalid-args",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthFailed(message.into())
    }

    pub fn busy() -> Self {
        Self::Busy("Already running another action".into())
    }

    pub fn not_authorized() -> Self {
        Self::NotAuthorized("Not authorized to perform this action".into())
    }
}
