// Membership Gate - In-Memory Collaborators
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Scriptable SessionSource, ProfileResolvers and Navigator.
// Used by the simulate command and by tests across the crate.

use crate::error::ProfileFetchError;
use crate::gate::Navigator;
use crate::session::{Identity, Profile};
use crate::source::{ProfileResolver, ProfileResult, Registration, SessionEvent, SessionSource};
use crate::store::{ProfileReply, SessionSink};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// SESSION SOURCE
// ============================================================================

/// SessionSource driven by explicit calls. Holds one registration at a time.
#[derive(Default)]
pub struct ManualSessionSource {
    sink: Arc<Mutex<Option<SessionSink>>>,
}

impl ManualSessionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event to the registered sink. Returns false if nobody listens.
    pub fn emit(&self, event: SessionEvent) -> bool {
        // clone out so the store never runs under our lock
        let sink = lock(&self.sink).clone();
        match sink {
            Some(sink) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }

    pub fn sign_in(&self, identity: &str) -> bool {
        self.emit(SessionEvent::signed_in(Identity::new(identity)))
    }

    pub fn sign_out(&self) -> bool {
        self.emit(SessionEvent::signed_out())
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.sink).is_some()
    }
}

impl SessionSource for ManualSessionSource {
    fn register(&self, sink: SessionSink) -> Registration {
        *lock(&self.sink) = Some(sink);
        let slot = self.sink.clone();
        Registration::new(move || {
            *lock(&slot) = None;
        })
    }
}

// ============================================================================
// PROFILE RESOLVERS
// ============================================================================

/// Holds every fetch until the caller completes it
#[derive(Default)]
pub struct DeferredProfileResolver {
    pending: Mutex<Vec<ProfileReply>>,
    requested: Mutex<Vec<Identity>>,
}

impl DeferredProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete the oldest outstanding fetch for `identity`.
    /// Returns false if none is outstanding.
    pub fn complete(&self, identity: &str, result: ProfileResult) -> bool {
        let reply = {
            let mut pending = lock(&self.pending);
            match pending.iter().position(|r| r.identity().as_str() == identity) {
                Some(idx) => pending.remove(idx),
                None => return false,
            }
        };
        reply.resolve(result);
        true
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Every identity a fetch was issued for, in order
    pub fn requested(&self) -> Vec<Identity> {
        lock(&self.requested).clone()
    }
}

impl ProfileResolver for DeferredProfileResolver {
    fn fetch_profile(&self, identity: &Identity, reply: ProfileReply) {
        lock(&self.requested).push(identity.clone());
        lock(&self.pending).push(reply);
    }
}

/// Answers immediately from a fixed table; unknown identities are NotFound
#[derive(Default)]
pub struct StaticProfileResolver {
    profiles: HashMap<Identity, Profile>,
}

impl StaticProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identity: &str, profile: Profile) -> Self {
        self.profiles.insert(Identity::new(identity), profile);
        self
    }
}

impl ProfileResolver for StaticProfileResolver {
    fn fetch_profile(&self, identity: &Identity, reply: ProfileReply) {
        let result = self
            .profiles
            .get(identity)
            .cloned()
            .ok_or_else(|| ProfileFetchError::NotFound(identity.fingerprint()));
        reply.resolve(result);
    }
}

// ============================================================================
// NAVIGATOR
// ============================================================================

type ReplaceHook = Box<dyn Fn(&str) + Send + Sync>;

/// Records every replace() call; optional hook runs after recording
#[derive(Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<String>>,
    hook: Mutex<Option<ReplaceHook>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` on every replace, e.g. to echo the route back into the gate
    pub fn set_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Box::new(hook));
    }

    pub fn replaced(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    pub fn last(&self) -> Option<String> {
        lock(&self.history).last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, path: &str) {
        lock(&self.history).push(path.to_string());
        let hook = lock(&self.hook);
        if let Some(ref hook) = *hook {
            hook(path);
        }
    }
}
