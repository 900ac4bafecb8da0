// Membership Gate - LMDB Audit Storage
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Persists gate outcomes to LMDB at <home>/AUDIT.DB.
// Keys are zero-padded sequence numbers so LMDB order is append order.

use crate::gate::GateOutcome;
use anyhow::Result;
use heed::types::*;
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;

/// LMDB storage for gate outcomes
pub struct AuditStorage {
    env: Env,
    /// sequence key → JSON GateOutcome
    db: Database<Str, Str>,
}

const MAX_DB_SIZE: usize = 20 * 1024 * 1024; // 20MB

impl AuditStorage {
    /// Open or create LMDB at the given path
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAX_DB_SIZE)
                .max_dbs(2)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, Some("gate_audit"))?;
        wtxn.commit()?;

        log::info!("Audit LMDB opened at {:?}", path);
        Ok(Self { env, db })
    }

    /// Append one outcome, returns its sequence number
    pub fn append(&self, outcome: &GateOutcome) -> Result<u64> {
        let json = serde_json::to_string(outcome)?;
        let mut wtxn = self.env.write_txn()?;
        let seq = match self.db.last(&wtxn)? {
            Some((key, _)) => key.parse::<u64>()? + 1,
            None => 0,
        };
        self.db.put(&mut wtxn, &sequence_key(seq), &json)?;
        wtxn.commit()?;
        Ok(seq)
    }

    /// Append all outcomes in one transaction
    pub fn append_all(&self, outcomes: &[GateOutcome]) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let mut seq = match self.db.last(&wtxn)? {
            Some((key, _)) => key.parse::<u64>()? + 1,
            None => 0,
        };
        for outcome in outcomes {
            let json = serde_json::to_string(outcome)?;
            self.db.put(&mut wtxn, &sequence_key(seq), &json)?;
            seq += 1;
        }
        wtxn.commit()?;
        Ok(outcomes.len())
    }

    /// Most recent outcomes, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<GateOutcome>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for entry in self.db.rev_iter(&rtxn)?.take(limit) {
            let (_, json) = entry?;
            out.push(serde_json::from_str(json)?);
        }
        Ok(out)
    }

    /// Get entry count
    pub fn entry_count(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        let stat = self.db.stat(&rtxn)?;
        Ok(stat.entries as u64)
    }

    /// Drop every stored outcome
    pub fn clear(&self) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }
}

fn sequence_key(seq: u64) -> String {
    format!("{:020}", seq)
}

// ============================================================================
// TESTS
// ============================================================================
