// Membership Gate - Error Types
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Failures that cross a module boundary. The policy itself is total and has
// no error type. Profile fetch failures are absorbed by the store and only
// ever show up as a fail-closed SessionState.

use thiserror::Error;

/// Failure reported by a ProfileResolver for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileFetchError {
    /// Backing store unreachable or timed out on its side.
    #[error("profile store unavailable: {0}")]
    Unavailable(String),

    /// No profile record exists for the identity.
    #[error("no profile record for identity {0}")]
    NotFound(String),

    /// Record exists but could not be decoded.
    #[error("malformed profile record: {0}")]
    Malformed(String),
}

impl ProfileFetchError {
    /// Short label for log lines and audit output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Rejected gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config field '{field}' must not be empty")]
    EmptyPath { field: &'static str },

    #[error("config field '{field}' must be an absolute path, got '{path}'")]
    RelativePath { field: &'static str, path: String },

    #[error("exempt_paths contains an empty entry")]
    EmptyExemptEntry,

    #[error("max_redirect_hops is {hops}, configured redirect targets need at least {required}")]
    RedirectHopsTooLow { hops: usize, required: usize },
}
