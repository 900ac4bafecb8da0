// Membership Gate - Path Resolution
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single source of truth for on-disk locations used by the CLI.
// Cached via OnceLock for zero-overhead repeated access.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static GATE_HOME_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Gate home directory.
///
/// Resolution order:
///   1. MEMBERSHIP_GATE_HOME environment variable
///   2. HOME env + /.membership-gate
///   3. Current directory
pub fn gate_home() -> &'static Path {
    GATE_HOME_CACHE.get_or_init(|| {
        resolve_home(
            std::env::var("MEMBERSHIP_GATE_HOME").ok(),
            std::env::var("HOME").ok(),
        )
    })
}

fn resolve_home(explicit: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(root) = explicit.filter(|r| !r.is_empty()) {
        return PathBuf::from(root);
    }
    if let Some(home) = home.filter(|h| !h.is_empty()) {
        return PathBuf::from(home).join(".membership-gate");
    }
    PathBuf::from(".")
}

/// Default gate config file
pub fn default_config_path() -> PathBuf {
    gate_home().join("gate.json")
}

/// Default LMDB audit directory
pub fn default_storage_path() -> PathBuf {
    gate_home().join("AUDIT.DB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_home_wins() {
        let p = resolve_home(Some("/srv/gate".into()), Some("/home/u".into()));
        assert_eq!(p, PathBuf::from("/srv/gate"));
    }

    #[test]
    fn falls_back_to_home_then_cwd() {
        assert_eq!(
            resolve_home(None, Some("/home/u".into())),
            PathBuf::from("/home/u/.membership-gate")
        );
        assert_eq!(resolve_home(Some(String::new()), None), PathBuf::from("."));
    }
}
