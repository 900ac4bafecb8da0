// Membership Gate - Session Store
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single writer for SessionState. Merges SessionSource events and
// ProfileResolver replies into immutable snapshots and broadcasts each
// replacement to subscribers in subscription order.
//
// Profile fetches are tagged with (identity, epoch). Any sign-in, sign-out
// or retry bumps the epoch, so a reply from an older session never lands.
// After shutdown nothing is emitted, late replies included.

use crate::session::{Identity, Phase, ProfileStatus, SessionState};
use crate::source::{ProfileResolver, ProfileResult, Registration, SessionEvent, SessionSource};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback = Arc<dyn Fn(&Arc<SessionState>) + Send + Sync>;

struct StoreInner {
    state: Arc<SessionState>,
    epoch: u64,
    subscribers: Vec<(u64, Callback)>,
    next_subscriber: u64,
    /// Snapshots published but not yet broadcast
    queue: VecDeque<Arc<SessionState>>,
    draining: bool,
    torn_down: bool,
    registration: Option<Registration>,
}

impl StoreInner {
    fn publish(&mut self, next: SessionState) {
        let snapshot = Arc::new(next);
        self.state = snapshot.clone();
        self.queue.push_back(snapshot);
    }

    /// Tag for a new fetch; invalidates every fetch issued before it
    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// At most one outstanding fetch per identity: a repeated sign-in for the
    /// current identity only refetches when the last fetch failed.
    fn on_identity(&mut self, identity: Identity) -> Option<(Identity, u64)> {
        let same = self.state.identity() == Some(&identity);
        if same {
            match self.state.profile_status() {
                ProfileStatus::Pending | ProfileStatus::Resolved => {
                    log::debug!("Duplicate sign-in for {} ignored", identity.fingerprint());
                    return None;
                }
                ProfileStatus::Failed | ProfileStatus::Absent => {
                    let next = self.state.with_profile_pending();
                    self.publish(next);
                }
            }
        } else {
            log::info!("Signed in {}", identity.fingerprint());
            self.publish(SessionState::authenticated(identity.clone()));
        }
        let epoch = self.next_epoch();
        Some((identity, epoch))
    }
}

struct StoreShared {
    inner: Mutex<StoreInner>,
    resolver: Arc<dyn ProfileResolver>,
}

/// Process-wide session state holder. Construct one per application (or per
/// test) and pass it by reference to whatever consumes it.
pub struct SessionStore {
    shared: Arc<StoreShared>,
}

impl SessionStore {
    /// Starts in Loading and registers with `source`
    pub fn new(source: &dyn SessionSource, resolver: Arc<dyn ProfileResolver>) -> Self {
        let shared = Arc::new(StoreShared {
            inner: Mutex::new(StoreInner {
                state: Arc::new(SessionState::loading()),
                epoch: 0,
                subscribers: Vec::new(),
                next_subscriber: 0,
                queue: VecDeque::new(),
                draining: false,
                torn_down: false,
                registration: None,
            }),
            resolver,
        });

        let sink = SessionSink { shared: Arc::downgrade(&shared) };
        let registration = source.register(sink);
        shared.lock().registration = Some(registration);

        Self { shared }
    }

    /// Current best-known snapshot
    pub fn current(&self) -> Arc<SessionState> {
        self.shared.lock().state.clone()
    }

    /// Register for every future snapshot replacement.
    /// Callbacks run on the thread that caused the update, never under a lock.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<SessionState>) + Send + Sync + 'static,
    {
        let mut inner = self.shared.lock();
        if inner.torn_down {
            return Subscription::inert();
        }
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        Subscription { shared: Arc::downgrade(&self.shared), id: Some(id) }
    }

    /// Re-issue the profile fetch after a failure. Returns true if a fetch went out.
    pub fn retry_profile(&self) -> bool {
        let fetch = {
            let mut inner = self.shared.lock();
            if inner.torn_down || inner.state.profile_status() != ProfileStatus::Failed {
                return false;
            }
            let identity = match inner.state.identity() {
                Some(identity) => identity.clone(),
                None => return false,
            };
            log::info!("Retrying profile fetch for {}", identity.fingerprint());
            let next = inner.state.with_profile_pending();
            inner.publish(next);
            let epoch = inner.next_epoch();
            (identity, epoch)
        };
        self.shared.drain();
        self.shared.issue_fetch(fetch.0, fetch.1);
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().torn_down
    }

    /// Release the source registration and drop all subscribers. Idempotent.
    pub fn shutdown(&self) {
        let registration = {
            let mut inner = self.shared.lock();
            if inner.torn_down {
                return;
            }
            inner.torn_down = true;
            inner.subscribers.clear();
            inner.queue.clear();
            inner.registration.take()
        };
        if let Some(mut registration) = registration {
            registration.release();
        }
        log::info!("Session store shut down");
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("SessionStore")
            .field("state", &inner.state)
            .field("epoch", &inner.epoch)
            .field("subscribers", &inner.subscribers.len())
            .field("torn_down", &inner.torn_down)
            .finish()
    }
}

impl StoreShared {
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panicking subscriber never runs under this lock, so the data is intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle_event(self: &Arc<Self>, event: SessionEvent) {
        let fetch = {
            let mut inner = self.lock();
            if inner.torn_down {
                log::debug!("Session event after shutdown ignored");
                return;
            }
            match event.identity {
                Some(identity) => inner.on_identity(identity),
                None => {
                    if inner.state.phase() != Phase::Unauthenticated {
                        if let Some(prev) = inner.state.identity() {
                            log::info!("Signed out {}", prev.fingerprint());
                        }
                        inner.next_epoch();
                        inner.publish(SessionState::unauthenticated());
                    }
                    None
                }
            }
        };
        self.drain();
        if let Some((identity, epoch)) = fetch {
            self.issue_fetch(identity, epoch);
        }
    }

    fn issue_fetch(self: &Arc<Self>, identity: Identity, epoch: u64) {
        log::debug!("Fetching profile for {} (epoch {})", identity.fingerprint(), epoch);
        let reply = ProfileReply {
            shared: Arc::downgrade(self),
            identity: identity.clone(),
            epoch,
        };
        self.resolver.fetch_profile(&identity, reply);
    }

    fn apply_profile(&self, identity: &Identity, epoch: u64, result: ProfileResult) {
        {
            let mut inner = self.lock();
            if inner.torn_down || inner.epoch != epoch || inner.state.identity() != Some(identity) {
                log::debug!(
                    "Discarding stale profile reply for {} (epoch {}, current {})",
                    identity.fingerprint(), epoch, inner.epoch
                );
                return;
            }
            match result {
                Ok(profile) => {
                    log::info!(
                        "Profile resolved for {}: role={} membership={:?}",
                        identity.fingerprint(),
                        profile.role.as_ref().map(|r| r.as_str()).unwrap_or("none"),
                        profile.membership_status
                    );
                    let next = inner.state.with_profile(&profile);
                    inner.publish(next);
                }
                Err(e) => {
                    log::warn!(
                        "Profile fetch failed for {} ({}): {}, staying unprivileged",
                        identity.fingerprint(), e.kind(), e
                    );
                    let next = inner.state.with_profile_failure();
                    inner.publish(next);
                }
            }
        }
        self.drain();
    }

    /// Deliver queued snapshots in order. A call made while another drain is
    /// running (re-entrant or from another thread) leaves its snapshot queued
    /// for the active drainer.
    fn drain(&self) {
        {
            let mut inner = self.lock();
            if inner.draining {
                return;
            }
            inner.draining = true;
        }
        let mut guard = DrainGuard { shared: self, armed: true };
        loop {
            let (snapshot, subscribers) = {
                let mut inner = self.lock();
                match inner.queue.pop_front() {
                    Some(snapshot) if !inner.torn_down => {
                        let subscribers: Vec<Callback> =
                            inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
                        (snapshot, subscribers)
                    }
                    _ => {
                        inner.queue.clear();
                        inner.draining = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            for callback in subscribers {
                callback(&snapshot);
            }
        }
    }
}

/// Clears the draining flag if a subscriber panics mid-broadcast
struct DrainGuard<'a> {
    shared: &'a StoreShared,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock().draining = false;
        }
    }
}

/// Handle a SessionSource pushes events into. Events arriving after the
/// store is gone or shut down are dropped.
#[derive(Clone)]
pub struct SessionSink {
    shared: Weak<StoreShared>,
}

impl SessionSink {
    pub fn emit(&self, event: SessionEvent) {
        match self.shared.upgrade() {
            Some(shared) => shared.handle_event(event),
            None => log::debug!("Session event for dropped store ignored"),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.lock().torn_down,
            None => true,
        }
    }
}

impl fmt::Debug for SessionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSink").field("closed", &self.is_closed()).finish()
    }
}

/// Completion handle for one profile fetch, tagged with the identity and
/// epoch it was issued for.
pub struct ProfileReply {
    shared: Weak<StoreShared>,
    identity: Identity,
    epoch: u64,
}

impl ProfileReply {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn resolve(self, result: ProfileResult) {
        match self.shared.upgrade() {
            Some(shared) => shared.apply_profile(&self.identity, self.epoch, result),
            None => log::debug!("Profile reply for dropped store discarded"),
        }
    }
}

impl fmt::Debug for ProfileReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileReply")
            .field("identity", &self.identity.fingerprint())
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Unsubscribe handle. `unsubscribe` is idempotent and safe after the store
/// has shut down or been dropped. Dropping unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<StoreShared>,
    id: Option<u64>,
}

impl Subscription {
    fn inert() -> Self {
        Self { shared: Weak::new(), id: None }
    }

    pub fn unsubscribe(&mut self) {
        let Some(id) = self.id.take() else { return };
        if let Some(shared) = self.shared.upgrade() {
            shared.lock().subscribers.retain(|(sid, _)| *sid != id);
        }
    }

    /// False once unsubscribed, after shutdown, or when the store is gone
    pub fn is_active(&self) -> bool {
        match (self.id, self.shared.upgrade()) {
            (Some(id), Some(shared)) => shared.lock().subscribers.iter().any(|(sid, _)| *sid == id),
            _ => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
