//! Error types for plex-upgrade
//!
//! Authentication, resource and playlist lookup failures are fatal for the
//! current session. Search failures only affect a single track. Mutation
//! failures abort the commit step and are reported together with whatever
//! was already applied.

use std::fmt;

use thiserror::Error;

/// Why an authentication attempt was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The stored or configured token is no longer accepted
    InvalidToken,
    /// Username/email or password is wrong
    InvalidCredentials,
    /// The account has two-factor authentication enabled and no code was given
    VerificationCodeRequired,
    /// Any other refusal, with the server's message
    Rejected(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::InvalidToken => write!(f, "invalid token"),
            AuthFailure::InvalidCredentials => {
                write!(f, "invalid email, username, or password")
            }
            AuthFailure::VerificationCodeRequired => {
                write!(f, "a two-factor verification code is required")
            }
            AuthFailure::Rejected(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(AuthFailure),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    /// Catalog search for a single track failed
    #[error("Search for \"{query}\" failed: {reason}")]
    Search { query: String, reason: String },

    /// Adding to or removing from a playlist failed.
    ///
    /// Tracks are applied in the order given, so the first `applied` of them
    /// reached the server.
    #[error("Playlist update failed after {applied} changes: {reason}")]
    Mutation { applied: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the run can continue with the next track after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Search { .. })
    }

    pub fn mutation(applied: usize, reason: impl fmt::Display) -> Self {
        Error::Mutation {
            applied,
            reason: reason.to_string(),
        }
    }

    /// Number of tracks a failed playlist update applied before failing
    pub fn applied_changes(&self) -> usize {
        match self {
            Error::Mutation { applied, .. } => *applied,
            _ => 0,
        }
    }

    pub fn search(query: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::Search {
            query: query.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
