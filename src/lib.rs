// Membership Gate - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod paths;
pub mod config;
pub mod error;
pub mod session;
pub mod source;
pub mod store;
pub mod policy;
pub mod gate;
pub mod memory;
pub mod scenario;

/// AUDIT: LMDB-backed gate outcome trail
pub mod storage;

pub use config::GateConfig;
pub use error::{ConfigError, ProfileFetchError};
pub use gate::{GateController, GateHandle, GateOutcome, GateView, Navigator};
pub use policy::{AccessDecision, AccessPolicy, DecisionRule, NavigationRequest, Verdict};
pub use session::{Identity, MembershipStatus, Phase, Profile, ProfileStatus, Role, SessionState};
pub use source::{ProfileResolver, Registration, SessionEvent, SessionSource};
pub use store::{ProfileReply, SessionSink, SessionStore, Subscription};
