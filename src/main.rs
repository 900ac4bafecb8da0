// Membership Gate - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// CLI over the gate engine.
// Usage:
//   membership-gate decide --phase authenticated --role student --path /courses   # One-shot decision
//   membership-gate simulate <scenario.json> [--record]                          # Scripted run
//   membership-gate audit [--limit N] [--clear]                                  # Stored outcomes
//   membership-gate config-show                                                  # Effective config
//   membership-gate config-export <json_file>                                    # Write config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use membership_gate::{
    paths, scenario, storage::AuditStorage, AccessDecision, AccessPolicy, GateConfig, Identity,
    MembershipStatus, NavigationRequest, Profile, Role, SessionState,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "membership-gate")]
#[command(author = "Joseph Stone")]
#[command(version = "0.1.0")]
#[command(about = "Membership Gate - session-driven access gating")]
struct Cli {
    /// Gate config JSON (defaults used when missing)
    #[arg(short, long, default_value_os_t = paths::default_config_path())]
    config: PathBuf,

    /// Audit storage directory (AUDIT.DB)
    #[arg(short, long, default_value_os_t = paths::default_storage_path())]
    storage: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PhaseArg {
    Loading,
    Unauthenticated,
    Authenticated,
}

#[derive(Subcommand)]
enum Commands {
    /// One-shot decision for a synthetic session; exit 1 unless Render
    Decide {
        #[arg(long, value_enum)]
        phase: PhaseArg,

        /// Identity for authenticated sessions
        #[arg(long, default_value = "cli-user")]
        identity: String,

        /// Resolved role; omit for a still-pending profile
        #[arg(long)]
        role: Option<String>,

        /// Membership active
        #[arg(long)]
        member: bool,

        /// Destination path
        #[arg(long)]
        path: String,

        /// Role the destination requires
        #[arg(long)]
        require: Option<String>,
    },

    /// Run a scripted scenario through store + controller
    Simulate {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Persist gate outcomes to audit storage
        #[arg(long)]
        record: bool,
    },

    /// Show stored gate outcomes, newest first
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Delete all stored outcomes
        #[arg(long)]
        clear: bool,
    },

    /// Print effective config
    ConfigShow,

    /// Write effective config to a JSON file
    ConfigExport {
        json_file: PathBuf,
    },
}

fn synthetic_state(phase: PhaseArg, identity: &str, role: Option<&str>, member: bool) -> SessionState {
    match phase {
        PhaseArg::Loading => SessionState::loading(),
        PhaseArg::Unauthenticated => SessionState::unauthenticated(),
        PhaseArg::Authenticated => {
            let base = SessionState::authenticated(Identity::new(identity));
            match role {
                Some(role) => {
                    let status = if member { MembershipStatus::Active } else { MembershipStatus::Inactive };
                    base.with_profile(&Profile::new(Role::new(role), status))
                }
                None => base,
            }
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging (safe if already init)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    let cli = Cli::parse();

    let config = GateConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match &cli.command {
        Commands::Decide { phase, identity, role, member, path, require } => {
            let state = synthetic_state(*phase, identity, role.as_deref(), *member);
            let request = NavigationRequest {
                target_path: path.clone(),
                required_role: require.as_deref().map(Role::new),
            };
            let verdict = AccessPolicy::new(&config).evaluate(&state, &request);

            println!("{}", serde_json::to_string_pretty(&verdict)?);

            if verdict.decision != AccessDecision::Render {
                std::process::exit(1);
            }
        }

        Commands::Simulate { scenario: file, record } => {
            let json = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read scenario {:?}", file))?;
            let script = scenario::Scenario::from_json(&json)
                .with_context(|| format!("Invalid scenario JSON in {:?}", file))?;

            let report = scenario::run(&config, &script);
            for step in &report.steps {
                println!("{}", serde_json::to_string(step)?);
            }

            if *record {
                let storage = AuditStorage::open(&cli.storage)
                    .with_context(|| format!("Failed to open audit storage at {:?}", cli.storage))?;
                let written = storage.append_all(&report.outcomes)?;
                println!("Recorded {} outcome(s) to {:?}", written, cli.storage);
            }
        }

        Commands::Audit { limit, clear } => {
            let storage = AuditStorage::open(&cli.storage)
                .with_context(|| format!("Failed to open audit storage at {:?}", cli.storage))?;

            if *clear {
                storage.clear()?;
                println!("Audit trail cleared.");
                return Ok(());
            }

            println!("Stored outcomes: {}", storage.entry_count()?);
            for outcome in storage.recent(*limit)? {
                println!(
                    "{} | {:?} | {} -> {} | {:?}{}{}",
                    outcome.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    outcome.trigger,
                    outcome.requested,
                    outcome.landed.as_deref().unwrap_or("(pending)"),
                    outcome.rule,
                    if outcome.loop_broken { " | LOOP STOPPED" } else { "" },
                    if outcome.blocked { " | BLOCKED" } else { "" },
                );
            }
        }

        Commands::ConfigShow => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::ConfigExport { json_file } => {
            config.save(json_file)
                .with_context(|| format!("Failed to write config to {:?}", json_file))?;
            println!("Config written to {:?}", json_file);
        }
    }

    Ok(())
}
