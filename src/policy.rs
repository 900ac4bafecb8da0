// Membership Gate - Access Policy
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Pure decision function: SessionState x NavigationRequest -> AccessDecision.
// Rules run in fixed order, first match wins:
//   loading -> pending, unauthenticated/role mismatch -> insufficient access,
//   inactive + exempt -> render, inactive -> upsell, otherwise render.
// Total over its input. No I/O, no hidden state.

use crate::config::GateConfig;
use crate::session::{Phase, Role, SessionState};
use serde::{Deserialize, Serialize};

/// One navigation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub target_path: String,
    /// Role gating is opt-in per destination
    #[serde(default)]
    pub required_role: Option<Role>,
}

impl NavigationRequest {
    pub fn to(target_path: impl Into<String>) -> Self {
        Self { target_path: target_path.into(), required_role: None }
    }

    pub fn requiring(target_path: impl Into<String>, role: Role) -> Self {
        Self { target_path: target_path.into(), required_role: Some(role) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "path", rename_all = "snake_case")]
pub enum AccessDecision {
    Render,
    RedirectTo(String),
    /// Show interim state, re-evaluate on next SessionState change
    Pending,
}

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    SessionLoading,
    Unauthenticated,
    RoleMismatch,
    MembershipExempt,
    MembershipRequired,
    Granted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: AccessDecision,
    pub rule: DecisionRule,
}

/// Role stage followed by membership stage, one unit.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    config: GateConfig,
}

impl AccessPolicy {
    pub fn new(config: &GateConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn decide(&self, state: &SessionState, request: &NavigationRequest) -> AccessDecision {
        self.evaluate(state, request).decision
    }

    /// Decision plus the rule that fired
    pub fn evaluate(&self, state: &SessionState, request: &NavigationRequest) -> Verdict {
        // Rule 1: nothing known yet
        if state.phase() == Phase::Loading {
            return verdict(AccessDecision::Pending, DecisionRule::SessionLoading);
        }

        // Rule 2: identity + role stage
        if state.phase() == Phase::Unauthenticated {
            return verdict(
                AccessDecision::RedirectTo(self.insufficient_access_target(request)),
                DecisionRule::Unauthenticated,
            );
        }
        if let Some(ref required) = request.required_role {
            if state.role() != Some(required) {
                return verdict(
                    AccessDecision::RedirectTo(self.insufficient_access_target(request)),
                    DecisionRule::RoleMismatch,
                );
            }
        }

        // Rules 3-4: membership stage
        if !state.membership_active() {
            if self.config.is_membership_exempt(&request.target_path) {
                return verdict(AccessDecision::Render, DecisionRule::MembershipExempt);
            }
            return verdict(
                AccessDecision::RedirectTo(self.config.membership_upsell_path.clone()),
                DecisionRule::MembershipRequired,
            );
        }

        // Rule 5
        verdict(AccessDecision::Render, DecisionRule::Granted)
    }

    /// Depends only on whether the destination required a role
    fn insufficient_access_target(&self, request: &NavigationRequest) -> String {
        match (&request.required_role, &self.config.role_denied_path) {
            (Some(_), Some(path)) => path.clone(),
            _ => self.config.landing_path.clone(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(&GateConfig::default())
    }
}

fn verdict(decision: AccessDecision, rule: DecisionRule) -> Verdict {
    Verdict { decision, rule }
}

// ============================================================================
// TESTS
// ============================================================================
