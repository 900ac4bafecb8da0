// Membership Gate - Gate Controller (Primary Enforcement Point)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every navigation passes through here, and every SessionState change
// re-runs the active one. Evaluate -> resolve redirect chain -> render or
// replace(). The only component with side effects.
// Redirects are replace-style so back-navigation can't step around the gate.
// The policy is never invoked from inside a navigation side effect.

use crate::policy::{AccessDecision, AccessPolicy, DecisionRule, NavigationRequest, Verdict};
use crate::session::{Role, SessionState};
use crate::store::{SessionStore, Subscription};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Surrounding router
pub trait Navigator: Send + Sync {
    /// Navigate without adding a history entry
    fn replace(&self, path: &str);
}

/// What the surrounding app should display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum GateView {
    /// No navigation evaluated yet
    Idle,
    /// Neutral loading indicator
    Loading,
    Render { path: String },
    /// Redirect chain never settled; the app sits at `path` and renders
    /// nothing gated
    Blocked { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Navigate,
    StateChange,
}

/// Audit record for one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub timestamp: DateTime<Utc>,
    pub trigger: Trigger,
    pub requested: String,
    pub required_role: Option<Role>,
    pub rule: DecisionRule,
    pub decision: AccessDecision,
    /// Where the app ended up; None while pending
    pub landed: Option<String>,
    /// Redirect chain was cut short to stop a loop
    pub loop_broken: bool,
    /// Chain ran out of hops on a page the policy still redirects
    #[serde(default)]
    pub blocked: bool,
}

/// Result of following a decision through its redirect chain
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolution {
    verdict: Verdict,
    landed: String,
    loop_broken: bool,
    blocked: bool,
}

struct GateInner {
    state: Arc<SessionState>,
    /// Original request of the active navigation
    active: Option<NavigationRequest>,
    /// Path the app is currently at
    location: Option<String>,
    view: GateView,
    outcomes: VecDeque<GateOutcome>,
    in_side_effect: bool,
    deferred: VecDeque<NavigationRequest>,
    state_dirty: bool,
    last_replaced: Option<String>,
    detached: bool,
}

struct GateShared {
    policy: AccessPolicy,
    navigator: Arc<dyn Navigator>,
    inner: Mutex<GateInner>,
}

/// Bridges navigation attempts and session changes to the policy
pub struct GateController {
    shared: Arc<GateShared>,
    subscription: Subscription,
}

impl GateController {
    /// Subscribe to `store` and start gating
    pub fn attach(store: &SessionStore, policy: AccessPolicy, navigator: Arc<dyn Navigator>) -> Self {
        let shared = Arc::new(GateShared {
            policy,
            navigator,
            inner: Mutex::new(GateInner {
                state: Arc::new(SessionState::loading()),
                active: None,
                location: None,
                view: GateView::Idle,
                outcomes: VecDeque::new(),
                in_side_effect: false,
                deferred: VecDeque::new(),
                state_dirty: false,
                last_replaced: None,
                detached: false,
            }),
        });

        let weak = Arc::downgrade(&shared);
        let subscription = store.subscribe(move |state| {
            if let Some(shared) = weak.upgrade() {
                shared.on_state(state.clone());
            }
        });
        // seeded after subscribing so no snapshot published in between is missed
        shared.lock().state = store.current();

        Self { shared, subscription }
    }

    /// New navigation attempt by the app (it is now at `request.target_path`)
    pub fn navigate(&self, request: NavigationRequest) {
        self.shared.navigate(request);
    }

    /// Handle for the router to report navigations from inside `replace`
    pub fn handle(&self) -> GateHandle {
        GateHandle { shared: Arc::downgrade(&self.shared) }
    }

    pub fn view(&self) -> GateView {
        self.shared.lock().view.clone()
    }

    pub fn location(&self) -> Option<String> {
        self.shared.lock().location.clone()
    }

    pub fn active_request(&self) -> Option<NavigationRequest> {
        self.shared.lock().active.clone()
    }

    /// Bounded audit trail, oldest first
    pub fn outcomes(&self) -> Vec<GateOutcome> {
        self.shared.lock().outcomes.iter().cloned().collect()
    }

    /// Stop reacting to session changes and navigations. Idempotent.
    pub fn detach(&mut self) {
        self.subscription.unsubscribe();
        self.shared.lock().detached = true;
    }
}

/// Weak handle to a controller; navigations after the controller is gone
/// are dropped.
#[derive(Clone)]
pub struct GateHandle {
    shared: Weak<GateShared>,
}

impl GateHandle {
    pub fn navigate(&self, request: NavigationRequest) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                shared.navigate(request);
                true
            }
            None => false,
        }
    }
}

impl GateShared {
    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn navigate(&self, request: NavigationRequest) {
        {
            let mut inner = self.lock();
            if inner.detached {
                return;
            }
            if inner.in_side_effect {
                log::debug!("Navigation to {} during redirect queued", request.target_path);
                inner.deferred.push_back(request);
                return;
            }
            inner.location = Some(request.target_path.clone());
            inner.active = Some(request);
        }
        self.run(Trigger::Navigate);
    }

    fn on_state(&self, state: Arc<SessionState>) {
        {
            let mut inner = self.lock();
            if inner.detached {
                return;
            }
            inner.state = state;
            if inner.in_side_effect {
                inner.state_dirty = true;
                return;
            }
            if inner.active.is_none() {
                return;
            }
        }
        self.run(Trigger::StateChange);
    }

    fn run(&self, mut trigger: Trigger) {
        loop {
            let replace_to = {
                let mut inner = self.lock();
                let Some(request) = inner.active.clone() else { return };
                let resolution = self.resolve(&inner.state, &request);
                self.record(&mut inner, trigger, &request, &resolution);

                inner.view = match resolution.verdict.decision {
                    AccessDecision::Pending => GateView::Loading,
                    _ if resolution.blocked => GateView::Blocked { path: resolution.landed.clone() },
                    _ => GateView::Render { path: resolution.landed.clone() },
                };
                if inner.location.as_deref() == Some(resolution.landed.as_str()) {
                    None
                } else {
                    inner.location = Some(resolution.landed.clone());
                    inner.last_replaced = Some(resolution.landed.clone());
                    inner.in_side_effect = true;
                    Some(resolution.landed)
                }
            };

            let Some(path) = replace_to else { return };
            self.navigator.replace(&path);

            let mut inner = self.lock();
            inner.in_side_effect = false;
            let mut next = None;
            while let Some(request) = inner.deferred.pop_front() {
                if inner.last_replaced.as_deref() == Some(request.target_path.as_str()) {
                    // router echoing the redirect we just issued
                    continue;
                }
                if let Some(superseded) = next.replace(request) {
                    log::debug!("Queued navigation to {} superseded", superseded.target_path);
                }
            }
            let dirty = std::mem::take(&mut inner.state_dirty);
            match next {
                Some(request) => {
                    inner.location = Some(request.target_path.clone());
                    inner.active = Some(request);
                    trigger = Trigger::Navigate;
                }
                None if dirty => trigger = Trigger::StateChange,
                None => return,
            }
        }
    }

    /// Follow redirects as fresh role-less requests until a hop renders or
    /// redirects to itself (terminal allow). A chain still redirecting when
    /// `max_redirect_hops` runs out lands blocked, never rendered.
    fn resolve(&self, state: &SessionState, request: &NavigationRequest) -> Resolution {
        let verdict = self.policy.evaluate(state, request);
        let AccessDecision::RedirectTo(first_hop) = verdict.decision.clone() else {
            return Resolution {
                landed: request.target_path.clone(),
                verdict,
                loop_broken: false,
                blocked: false,
            };
        };

        let max_hops = self.policy.config().max_redirect_hops;
        let mut current = first_hop;
        let mut hops = 1;
        loop {
            let AccessDecision::RedirectTo(next) = self.policy.decide(state, &NavigationRequest::to(current.clone()))
            else {
                return Resolution { verdict, landed: current, loop_broken: false, blocked: false };
            };
            if next == current {
                // signed-out user on the landing page, member-less user on the upsell page
                log::debug!("{} redirects to itself, rendering it", current);
                return Resolution { verdict, landed: current, loop_broken: true, blocked: false };
            }
            if hops >= max_hops {
                log::warn!(
                    "Redirect chain from {} still redirecting at {} -> {} after {} hop(s), blocking",
                    request.target_path, current, next, hops
                );
                return Resolution { verdict, landed: current, loop_broken: true, blocked: true };
            }
            current = next;
            hops += 1;
        }
    }

    fn record(&self, inner: &mut GateInner, trigger: Trigger, request: &NavigationRequest, resolution: &Resolution) {
        log::debug!(
            "{:?} {} -> {:?} via {:?}",
            trigger, request.target_path, resolution.verdict.decision, resolution.verdict.rule
        );
        let landed = match resolution.verdict.decision {
            AccessDecision::Pending => None,
            _ => Some(resolution.landed.clone()),
        };
        inner.outcomes.push_back(GateOutcome {
            timestamp: Utc::now(),
            trigger,
            requested: request.target_path.clone(),
            required_role: request.required_role.clone(),
            rule: resolution.verdict.rule,
            decision: resolution.verdict.decision.clone(),
            landed,
            loop_broken: resolution.loop_broken,
            blocked: resolution.blocked,
        });
        let capacity = self.policy.config().audit_capacity.max(1);
        while inner.outcomes.len() > capacity {
            inner.outcomes.pop_front();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::error::ProfileFetchError;
    use crate::memory::{DeferredProfileResolver, ManualSessionSource, RecordingNavigator};
    use crate::session::{MembershipStatus, Profile};

    struct Rig {
        source: ManualSessionSource,
        resolver: Arc<DeferredProfileResolver>,
        nav: Arc<RecordingNavigator>,
        store: SessionStore,
        gate: GateController,
    }

    fn rig_with(config: GateConfig) -> Rig {
        let source = ManualSessionSource::new();
        let resolver = Arc::new(DeferredProfileResolver::new());
        let store = SessionStore::new(&source, resolver.clone());
        let nav = Arc::new(RecordingNavigator::new());
        let gate = GateController::attach(&store, AccessPolicy::new(&config), nav.clone());
        Rig { source, resolver, nav, store, gate }
    }

    fn rig() -> Rig {
        rig_with(GateConfig::default())
    }

    fn render(path: &str) -> GateView {
        GateView::Render { path: path.to_string() }
    }

    fn profile(role: Role, status: MembershipStatus) -> Profile {
        Profile::new(role, status)
    }

    #[test]
    fn pending_while_loading_then_resolves() {
        let r = rig();
        r.gate.navigate(NavigationRequest::to("/dashboard"));
        assert_eq!(r.gate.view(), GateView::Loading);
        assert!(r.nav.replaced().is_empty());

        r.source.sign_out();
        assert_eq!(r.gate.view(), render("/"));
        assert_eq!(r.nav.replaced(), vec!["/".to_string()]);
    }

    #[test]
    fn sign_in_to_member_end_to_end() {
        let r = rig();
        r.gate.navigate(NavigationRequest::to("/dashboard"));
        r.source.sign_in("uid-1");

        // profile outstanding: never Pending, upsell instead
        assert_eq!(r.store.current().role(), None);
        assert_eq!(r.gate.view(), render("/membership"));
        assert_eq!(r.nav.last().as_deref(), Some("/membership"));

        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Active)));
        assert_eq!(r.gate.view(), render("/dashboard"));
        assert_eq!(r.nav.replaced(), vec!["/membership".to_string(), "/dashboard".to_string()]);
        assert_eq!(r.gate.active_request(), Some(NavigationRequest::to("/dashboard")));
    }

    #[test]
    fn render_to_redirect_when_membership_lapses() {
        let r = rig();
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Active)));
        r.gate.navigate(NavigationRequest::to("/courses"));
        assert_eq!(r.gate.view(), render("/courses"));
        assert!(r.nav.replaced().is_empty());

        r.source.sign_out();
        assert_eq!(r.gate.view(), render("/"));
        assert_eq!(r.nav.last().as_deref(), Some("/"));
    }

    #[test]
    fn exempt_destination_renders_without_navigation() {
        let r = rig();
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Inactive)));
        r.gate.navigate(NavigationRequest::to("/Payment"));
        assert_eq!(r.gate.view(), render("/Payment"));
        assert!(r.nav.replaced().is_empty());
    }

    #[test]
    fn unauthenticated_at_landing_is_terminal_allow() {
        let r = rig();
        r.source.sign_out();
        r.gate.navigate(NavigationRequest::to("/"));
        assert_eq!(r.gate.view(), render("/"));
        assert!(r.nav.replaced().is_empty());
        let last = r.gate.outcomes().pop().unwrap();
        assert!(last.loop_broken);
        assert_eq!(last.rule, DecisionRule::Unauthenticated);
    }

    #[test]
    fn redirect_target_redirecting_to_itself_stops_there() {
        // upsell page not exempt: /courses -> /upgrade -> /upgrade
        let config = GateConfig {
            membership_upsell_path: "/upgrade".to_string(),
            ..GateConfig::default()
        };
        let r = rig_with(config);
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Inactive)));
        r.gate.navigate(NavigationRequest::to("/courses"));

        assert_eq!(r.gate.view(), render("/upgrade"));
        assert_eq!(r.nav.replaced(), vec!["/upgrade".to_string()]);
        assert!(r.gate.outcomes().last().unwrap().loop_broken);
    }

    #[test]
    fn redirect_chain_follows_to_final_target() {
        // role denied page is itself membership gated: -> /forbidden -> /membership
        let config = GateConfig {
            role_denied_path: Some("/forbidden".to_string()),
            ..GateConfig::default()
        };
        let r = rig_with(config);
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Inactive)));
        r.gate.navigate(NavigationRequest::requiring("/courses/new", Role::instructor()));

        assert_eq!(r.gate.view(), render("/membership"));
        assert_eq!(r.nav.replaced(), vec!["/membership".to_string()]);
        let last = r.gate.outcomes().pop().unwrap();
        assert_eq!(last.rule, DecisionRule::RoleMismatch);
        assert_eq!(last.decision, AccessDecision::RedirectTo("/forbidden".to_string()));
        assert!(!last.loop_broken);
    }

    #[test]
    fn chain_through_custom_landing_reaches_upsell() {
        // /courses/new -> /home (membership gated) -> /upgrade -> /upgrade
        let config = GateConfig {
            landing_path: "/home".to_string(),
            membership_upsell_path: "/upgrade".to_string(),
            ..GateConfig::default()
        };
        let r = rig_with(config);
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Inactive)));
        r.gate.navigate(NavigationRequest::requiring("/courses/new", Role::instructor()));

        assert_eq!(r.gate.view(), render("/upgrade"));
        assert_eq!(r.nav.replaced(), vec!["/upgrade".to_string()]);
        let last = r.gate.outcomes().pop().unwrap();
        assert_eq!(last.decision, AccessDecision::RedirectTo("/home".to_string()));
        assert!(last.loop_broken);
        assert!(!last.blocked);
    }

    #[test]
    fn hop_cap_blocks_instead_of_rendering_gated_page() {
        let config = GateConfig {
            role_denied_path: Some("/forbidden".to_string()),
            max_redirect_hops: 1,
            ..GateConfig::default()
        };
        let policy = AccessPolicy::new(&config);
        let r = rig_with(config);
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Inactive)));
        r.gate.navigate(NavigationRequest::requiring("/courses/new", Role::instructor()));

        // /forbidden is still membership gated, so it must not render
        assert_eq!(
            policy.decide(&r.store.current(), &NavigationRequest::to("/forbidden")),
            AccessDecision::RedirectTo("/membership".to_string())
        );
        assert_eq!(r.gate.view(), GateView::Blocked { path: "/forbidden".to_string() });
        let last = r.gate.outcomes().pop().unwrap();
        assert!(last.loop_broken);
        assert!(last.blocked);
        assert_eq!(last.landed.as_deref(), Some("/forbidden"));
    }

    #[test]
    fn hop_cap_covering_targets_reaches_final_page() {
        let config = GateConfig {
            role_denied_path: Some("/forbidden".to_string()),
            max_redirect_hops: 2,
            ..GateConfig::default()
        };
        assert!(config.validate().is_ok());
        let r = rig_with(config);
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Ok(profile(Role::student(), MembershipStatus::Inactive)));
        r.gate.navigate(NavigationRequest::requiring("/courses/new", Role::instructor()));

        assert_eq!(r.gate.view(), render("/membership"));
        assert!(!r.gate.outcomes().pop().unwrap().blocked);
    }

    #[test]
    fn attach_sees_state_published_before_it() {
        let r = rig();
        r.source.sign_out();
        let nav = Arc::new(RecordingNavigator::new());
        let late = GateController::attach(&r.store, AccessPolicy::default(), nav.clone());
        late.navigate(NavigationRequest::to("/dashboard"));
        assert_eq!(late.view(), render("/"));
        assert_eq!(nav.replaced(), vec!["/".to_string()]);
    }

    #[test]
    fn router_echo_during_replace_is_not_reevaluated() {
        let r = rig();
        let handle = r.gate.handle();
        r.nav.set_hook(move |path| {
            handle.navigate(NavigationRequest::to(path));
        });
        r.source.sign_in("uid-1");
        r.gate.navigate(NavigationRequest::to("/dashboard"));

        assert_eq!(r.nav.replaced(), vec!["/membership".to_string()]);
        assert_eq!(r.gate.active_request(), Some(NavigationRequest::to("/dashboard")));
        assert_eq!(r.gate.view(), render("/membership"));
    }

    #[test]
    fn navigation_queued_during_replace_runs_after() {
        let r = rig();
        let handle = r.gate.handle();
        r.nav.set_hook(move |path| {
            if path == "/membership" {
                handle.navigate(NavigationRequest::to("/payment"));
            }
        });
        r.source.sign_in("uid-1");
        r.gate.navigate(NavigationRequest::to("/dashboard"));

        assert_eq!(r.gate.active_request(), Some(NavigationRequest::to("/payment")));
        assert_eq!(r.gate.view(), render("/payment"));
        assert_eq!(r.nav.replaced(), vec!["/membership".to_string()]);
    }

    #[test]
    fn profile_failure_redirects_not_errors() {
        let r = rig();
        r.gate.navigate(NavigationRequest::requiring("/courses/new", Role::instructor()));
        r.source.sign_in("uid-1");
        r.resolver.complete("uid-1", Err(ProfileFetchError::Unavailable("timeout".into())));

        // landing page is itself membership gated for a signed-in non-member
        let last = r.gate.outcomes().pop().unwrap();
        assert_eq!(last.rule, DecisionRule::RoleMismatch);
        assert_eq!(last.decision, AccessDecision::RedirectTo("/".to_string()));
        assert_eq!(r.gate.view(), render("/membership"));
    }

    #[test]
    fn outcomes_are_bounded() {
        let config = GateConfig { audit_capacity: 3, ..GateConfig::default() };
        let r = rig_with(config);
        r.source.sign_out();
        for path in ["/a", "/b", "/c", "/d", "/e"] {
            r.gate.navigate(NavigationRequest::to(path));
        }
        let outcomes = r.gate.outcomes();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].requested, "/c");
        assert_eq!(outcomes[2].requested, "/e");
    }

    #[test]
    fn detach_stops_reacting() {
        let mut r = rig();
        r.gate.navigate(NavigationRequest::to("/dashboard"));
        r.gate.detach();
        r.gate.detach();
        r.source.sign_out();
        assert_eq!(r.gate.view(), GateView::Loading);
        assert!(r.nav.replaced().is_empty());
        assert_eq!(r.store.subscriber_count(), 0);
    }

    #[test]
    fn handle_outlives_controller_safely() {
        let r = rig();
        let handle = r.gate.handle();
        drop(r.gate);
        assert!(!handle.navigate(NavigationRequest::to("/dashboard")));
    }
}
