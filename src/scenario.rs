// Membership Gate - Scenario Runner
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Drives a real SessionStore + GateController through a scripted sequence
// of identity, profile and navigation events using the in-memory
// collaborators. Backs the `simulate` command.

use crate::config::GateConfig;
use crate::error::ProfileFetchError;
use crate::gate::{GateController, GateOutcome, GateView};
use crate::memory::{DeferredProfileResolver, ManualSessionSource, RecordingNavigator};
use crate::policy::{AccessPolicy, NavigationRequest};
use crate::session::{Profile, Role, SessionState};
use crate::store::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    SignIn { identity: String },
    SignOut,
    /// Complete the oldest outstanding fetch for `identity`
    Resolve { identity: String, profile: Profile },
    Fail { identity: String, reason: String },
    Retry,
    Navigate {
        path: String,
        #[serde(default)]
        role: Option<String>,
    },
}

impl Step {
    /// Step kind without its payload; identities stay out of reports and logs
    pub fn action(&self) -> &'static str {
        match self {
            Step::SignIn { .. } => "sign_in",
            Step::SignOut => "sign_out",
            Step::Resolve { .. } => "resolve",
            Step::Fail { .. } => "fail",
            Step::Retry => "retry",
            Step::Navigate { .. } => "navigate",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Snapshot after one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    /// Step had nothing to act on (no registered source, no outstanding fetch)
    pub ignored: bool,
    pub state: SessionState,
    pub view: GateView,
    pub navigations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub outcomes: Vec<GateOutcome>,
}

pub fn run(config: &GateConfig, scenario: &Scenario) -> ScenarioReport {
    let source = ManualSessionSource::new();
    let resolver = Arc::new(DeferredProfileResolver::new());
    let store = SessionStore::new(&source, resolver.clone());
    let navigator = Arc::new(RecordingNavigator::new());
    let mut gate = GateController::attach(&store, AccessPolicy::new(config), navigator.clone());

    let mut reports = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let acted = match step {
            Step::SignIn { identity } => source.sign_in(identity),
            Step::SignOut => source.sign_out(),
            Step::Resolve { identity, profile } => resolver.complete(identity, Ok(profile.clone())),
            Step::Fail { identity, reason } => resolver.complete(
                identity,
                Err(ProfileFetchError::Unavailable(reason.clone())),
            ),
            Step::Retry => store.retry_profile(),
            Step::Navigate { path, role } => {
                gate.navigate(NavigationRequest {
                    target_path: path.clone(),
                    required_role: role.as_deref().map(Role::new),
                });
                true
            }
        };
        if !acted {
            log::warn!("Step {} ({}) had nothing to act on", index, step.action());
        }
        reports.push(StepReport {
            index,
            action: step.action(),
            ignored: !acted,
            state: store.current().as_ref().clone(),
            view: gate.view(),
            navigations: navigator.replaced(),
        });
    }

    let outcomes = gate.outcomes();
    gate.detach();
    store.shutdown();
    ScenarioReport { steps: reports, outcomes }
}
