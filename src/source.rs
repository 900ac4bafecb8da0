// Membership Gate - External Collaborators
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Interface boundary to the identity provider (SessionSource) and the
// profile document store (ProfileResolver). Neither is implemented here
// beyond the in-memory doubles in memory.rs.

use crate::error::ProfileFetchError;
use crate::session::{Identity, Profile};
use crate::store::{ProfileReply, SessionSink};
use serde::{Deserialize, Serialize};

/// One identity-provider notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub identity: Option<Identity>,
}

impl SessionEvent {
    pub fn signed_in(identity: Identity) -> Self {
        Self { identity: Some(identity) }
    }

    pub fn signed_out() -> Self {
        Self { identity: None }
    }

    pub fn identity_present(&self) -> bool {
        self.identity.is_some()
    }
}

/// Supplies session events over time.
///
/// `register` hands over the sink events must be pushed into and returns
/// the teardown handle for that registration. Sources may emit from inside
/// `register` (current-user replay) or at any later point.
pub trait SessionSource {
    fn register(&self, sink: SessionSink) -> Registration;
}

/// Resolves the profile record for an identity.
///
/// The resolver owns `reply` and completes it whenever the fetch finishes,
/// synchronously or later from any thread. Dropping the reply without
/// resolving leaves the fetch pending forever, which the gate tolerates.
pub trait ProfileResolver: Send + Sync {
    fn fetch_profile(&self, identity: &Identity, reply: ProfileReply);
}

/// Result type a ProfileReply is completed with
pub type ProfileResult = Result<Profile, ProfileFetchError>;

/// Teardown handle for a SessionSource registration.
/// Releasing runs the teardown once; later calls are no-ops. Dropping releases.
pub struct Registration {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self { teardown: Some(Box::new(teardown)) }
    }

    /// Registration with nothing to tear down
    pub fn inert() -> Self {
        Self { teardown: None }
    }

    pub fn release(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    pub fn is_released(&self) -> bool {
        self.teardown.is_none()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("released", &self.is_released())
            .finish()
    }
}
