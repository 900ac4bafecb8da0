// Membership Gate - Session State
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Immutable session snapshots. SessionStore builds a fresh value on every
// update and swaps the Arc; nothing here is ever mutated after publication.
// Tracks: phase, identity, role, membership standing, profile fetch status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque session identity handed over by the identity provider.
/// `Debug` and `Serialize` emit the fingerprint only.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars of SHA256. Log lines carry this, never the raw token.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.fingerprint()).finish()
    }
}

impl Serialize for Identity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.fingerprint())
    }
}

/// Coarse authorization label attached to a profile (student, instructor, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn student() -> Self {
        Self::new("student")
    }

    pub fn instructor() -> Self {
        Self::new("instructor")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Billing standing as stored on the profile record.
/// Anything unrecognised decodes to Unknown and is treated as inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Inactive,
    PastDue,
    Canceled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MembershipStatus {
    pub fn is_active(self) -> bool {
        self == MembershipStatus::Active
    }
}

/// Profile record returned by the ProfileResolver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub membership_status: MembershipStatus,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl Profile {
    pub fn new(role: Role, membership_status: MembershipStatus) -> Self {
        Self {
            role: Some(role),
            membership_status,
            plan: None,
            price: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Loading,
    Unauthenticated,
    Authenticated,
}

/// Where the profile fetch for the current identity stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    /// No identity, nothing to fetch
    Absent,
    Pending,
    Resolved,
    Failed,
}

/// One coherent snapshot of session, role and membership.
///
/// Fields are private so the phase invariants hold by construction:
/// Loading and Unauthenticated never carry identity or role, and
/// Authenticated always carries an identity.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    phase: Phase,
    identity: Option<Identity>,
    role: Option<Role>,
    membership_active: bool,
    profile: ProfileStatus,
    plan: Option<String>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Initial state, before the session source has reported anything
    pub fn loading() -> Self {
        Self::bare(Phase::Loading, None, ProfileStatus::Absent)
    }

    pub fn unauthenticated() -> Self {
        Self::bare(Phase::Unauthenticated, None, ProfileStatus::Absent)
    }

    /// Freshly signed in, profile not yet resolved
    pub fn authenticated(identity: Identity) -> Self {
        Self::bare(Phase::Authenticated, Some(identity), ProfileStatus::Pending)
    }

    fn bare(phase: Phase, identity: Option<Identity>, profile: ProfileStatus) -> Self {
        Self {
            phase,
            identity,
            role: None,
            membership_active: false,
            profile,
            plan: None,
            updated_at: Utc::now(),
        }
    }

    /// Successor snapshot with the profile applied.
    /// Only meaningful for Authenticated; other phases come back unchanged.
    pub fn with_profile(&self, profile: &Profile) -> Self {
        if self.phase != Phase::Authenticated {
            return self.clone();
        }
        Self {
            phase: Phase::Authenticated,
            identity: self.identity.clone(),
            role: profile.role.clone(),
            membership_active: profile.membership_status.is_active(),
            profile: ProfileStatus::Resolved,
            plan: profile.plan.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Successor snapshot after a failed fetch: still signed in, no role,
    /// no membership.
    pub fn with_profile_failure(&self) -> Self {
        if self.phase != Phase::Authenticated {
            return self.clone();
        }
        Self {
            profile: ProfileStatus::Failed,
            ..Self::authenticated_like(self)
        }
    }

    /// Successor snapshot for a re-issued fetch on the same identity
    pub fn with_profile_pending(&self) -> Self {
        if self.phase != Phase::Authenticated {
            return self.clone();
        }
        Self::authenticated_like(self)
    }

    fn authenticated_like(prev: &SessionState) -> Self {
        Self::bare(Phase::Authenticated, prev.identity.clone(), ProfileStatus::Pending)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn membership_active(&self) -> bool {
        self.membership_active
    }

    pub fn profile_status(&self) -> ProfileStatus {
        self.profile
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    /// Status summary string
    pub fn summary(&self) -> String {
        format!(
            "Phase: {:?} | Identity: {} | Role: {} | Member: {} | Profile: {:?}",
            self.phase,
            self.identity.as_ref().map(|i| i.fingerprint()).unwrap_or_else(|| "none".to_string()),
            self.role.as_ref().map(|r| r.as_str()).unwrap_or("none"),
            self.membership_active,
            self.profile,
        )
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::loading()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_output_never_carries_raw_identity() {
        let state = SessionState::authenticated(Identity::new("secret-token-123"));
        let fingerprint = Identity::new("secret-token-123").fingerprint();

        let debug = format!("{:?}", state);
        assert!(!debug.contains("secret-token-123"), "got: {debug}");
        assert!(debug.contains(&fingerprint), "got: {debug}");

        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("secret-token-123"), "got: {json}");
        assert!(json.contains(&fingerprint), "got: {json}");
    }

    #[test]
    fn loading_carries_nothing() {
        let state = SessionState::loading();
        assert_eq!(state.phase(), Phase::Loading);
        assert!(state.identity().is_none());
        assert!(state.role().is_none());
        assert!(!state.membership_active());
        assert_eq!(state.profile_status(), ProfileStatus::Absent);
    }

    #[test]
    fn authenticated_starts_pending_and_unprivileged() {
        let state = SessionState::authenticated(Identity::new("uid-1"));
        assert_eq!(state.phase(), Phase::Authenticated);
        assert_eq!(state.identity().map(|i| i.as_str()), Some("uid-1"));
        assert!(state.role().is_none());
        assert!(!state.membership_active());
        assert_eq!(state.profile_status(), ProfileStatus::Pending);
    }

    #[test]
    fn with_profile_populates_role_and_membership() {
        let base = SessionState::authenticated(Identity::new("uid-1"));
        let mut profile = Profile::new(Role::instructor(), MembershipStatus::Active);
        profile.plan = Some("annual".to_string());
        let state = base.with_profile(&profile);
        assert_eq!(state.role(), Some(&Role::instructor()));
        assert!(state.membership_active());
        assert_eq!(state.plan(), Some("annual"));
        assert_eq!(state.profile_status(), ProfileStatus::Resolved);
        // source snapshot untouched
        assert!(base.role().is_none());
    }

    #[test]
    fn with_profile_ignored_outside_authenticated() {
        let profile = Profile::new(Role::student(), MembershipStatus::Active);
        let state = SessionState::unauthenticated().with_profile(&profile);
        assert_eq!(state.phase(), Phase::Unauthenticated);
        assert!(state.role().is_none());
        assert!(!state.membership_active());
    }

    #[test]
    fn failure_is_fail_closed() {
        let resolved = SessionState::authenticated(Identity::new("uid-1"))
            .with_profile(&Profile::new(Role::student(), MembershipStatus::Active));
        let failed = resolved.with_profile_failure();
        assert_eq!(failed.phase(), Phase::Authenticated);
        assert!(failed.identity().is_some());
        assert!(failed.role().is_none());
        assert!(!failed.membership_active());
        assert_eq!(failed.profile_status(), ProfileStatus::Failed);
    }

    #[test]
    fn only_active_status_grants_membership() {
        for status in [
            MembershipStatus::Inactive,
            MembershipStatus::PastDue,
            MembershipStatus::Canceled,
            MembershipStatus::Unknown,
        ] {
            assert!(!status.is_active(), "{:?} should not be active", status);
        }
        assert!(MembershipStatus::Active.is_active());
    }

    #[test]
    fn profile_decodes_camel_case_and_unknown_status() {
        let profile: Profile = serde_json::from_str(
            r#"{"role":"student","membershipStatus":"trialing","plan":"monthly","price":9.99}"#,
        )
        .unwrap();
        assert_eq!(profile.role, Some(Role::student()));
        assert_eq!(profile.membership_status, MembershipStatus::Unknown);
        assert_eq!(profile.price, Some(9.99));

        let bare: Profile = serde_json::from_str("{}").unwrap();
        assert!(bare.role.is_none());
        assert_eq!(bare.membership_status, MembershipStatus::Unknown);
    }

    #[test]
    fn fingerprint_is_stable_and_redacted() {
        let id = Identity::new("secret-token-value");
        let fp = id.fingerprint();
        assert_eq!(fp.len(), 12);
        assert_eq!(fp, Identity::new("secret-token-value").fingerprint());
        assert!(!fp.contains("secret"));
        assert!(!id.fingerprint().is_empty());
        assert!(!SessionState::authenticated(id).summary().contains("secret"));
    }
}
