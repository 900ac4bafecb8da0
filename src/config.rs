// Membership Gate - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Redirect targets, membership-exempt destinations, loop and audit bounds.
// Loaded from a JSON file; defaults match the current deployment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Insufficient-access target (also where signed-out users land)
    pub landing_path: String,
    /// Optional dedicated target when a destination required a role.
    /// Falls back to landing_path.
    pub role_denied_path: Option<String>,
    /// Where inactive members are sent
    pub membership_upsell_path: String,
    /// Destination identifiers reachable without active membership.
    /// Case-insensitive exact match, one leading '/' ignored.
    pub exempt_paths: Vec<String>,
    /// Upper bound on redirect hops resolved per navigation
    pub max_redirect_hops: usize,
    /// Gate outcomes kept in memory per controller
    pub audit_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            landing_path: "/".to_string(),
            role_denied_path: None,
            membership_upsell_path: "/membership".to_string(),
            exempt_paths: vec![
                "membership".to_string(),
                "payment".to_string(),
                "digitalwallet".to_string(),
                "creditdebit".to_string(),
            ],
            max_redirect_hops: 4,
            audit_capacity: 200,
        }
    }
}

impl GateConfig {
    /// Load config from JSON file, falling back to defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save config to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_target("landing_path", &self.landing_path)?;
        check_target("membership_upsell_path", &self.membership_upsell_path)?;
        if let Some(ref p) = self.role_denied_path {
            check_target("role_denied_path", p)?;
        }
        if self.exempt_paths.iter().any(|p| p.trim_start_matches('/').is_empty()) {
            return Err(ConfigError::EmptyExemptEntry);
        }
        let required = self.required_redirect_hops();
        if self.max_redirect_hops < required {
            return Err(ConfigError::RedirectHopsTooLow { hops: self.max_redirect_hops, required });
        }
        Ok(())
    }

    /// Longest redirect chain the policy can produce. Hops carry no role, so
    /// every chain settles on the landing or upsell page by its second hop;
    /// when all targets are the same page it settles on the first.
    pub fn required_redirect_hops(&self) -> usize {
        let mut targets = vec![self.landing_path.as_str(), self.membership_upsell_path.as_str()];
        if let Some(ref p) = self.role_denied_path {
            targets.push(p.as_str());
        }
        targets.sort_unstable();
        targets.dedup();
        targets.len().min(2)
    }

    /// Membership-exempt check. Exact match only: "/payment/extra" and
    /// "/payments" are NOT exempt when "payment" is.
    pub fn is_membership_exempt(&self, target_path: &str) -> bool {
        let candidate = exempt_key(target_path);
        self.exempt_paths
            .iter()
            .any(|exempt| exempt_key(exempt).eq_ignore_ascii_case(candidate))
    }
}

/// Exempt entries are written as bare identifiers but requests carry paths
fn exempt_key(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

fn check_target(field: &'static str, path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::EmptyPath { field });
    }
    if !path.starts_with('/') {
        return Err(ConfigError::RelativePath { field, path: path.to_string() });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
