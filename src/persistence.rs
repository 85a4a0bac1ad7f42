//! Crash-safe session state snapshots.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::execution::orders::{Position, Trade};
use crate::execution::tier::TierState;

const STATE_FILE: &str = "session_state.json";
const BACKUP_FILE: &str = "session_state.backup.json";

/// Everything needed to resume a session after a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub date: NaiveDate,
    pub symbol: String,
    pub open_positions: Vec<Position>,
    pub daily_pnl: f64,
    pub trades: Vec<Trade>,
    pub is_halted: bool,
    pub halt_reason: Option<String>,
    pub tier: TierState,
    pub saved_at: DateTime<Utc>,
}

/// JSON snapshot store with single-file backup rotation.
///
/// Saves are synchronous: the previous snapshot is renamed to the backup
/// first, so a crash mid-write leaves a loadable state behind. A failed
/// write restores the backup and surfaces the error, which callers treat
/// as fatal.
pub struct SessionStore {
    state_path: PathBuf,
    backup_path: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = state_dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating state dir {}", dir.display()))?;
        Ok(Self {
            state_path: dir.join(STATE_FILE),
            backup_path: dir.join(BACKUP_FILE),
        })
    }

    pub fn save(&self, state: &SessionState) -> Result<()> {
        if self.state_path.exists() {
            fs::rename(&self.state_path, &self.backup_path)
                .context("rotating state file to backup")?;
        }

        let json = serde_json::to_string_pretty(state).context("serializing session state")?;
        if let Err(e) = fs::write(&self.state_path, json) {
            // Put the previous snapshot back so a restart still resumes
            if self.backup_path.exists() {
                let _ = fs::rename(&self.backup_path, &self.state_path);
            }
            return Err(e).with_context(|| {
                format!("writing session state to {}", self.state_path.display())
            });
        }
        Ok(())
    }

    /// Load the latest snapshot, falling back to the backup when the
    /// primary is missing or corrupt. Returns `None` when neither exists.
    pub fn load(&self) -> Option<SessionState> {
        match self.read_state(&self.state_path) {
            Ok(state) => Some(state),
            Err(primary_err) => {
                if self.state_path.exists() {
                    warn!(error = %primary_err, "state file unreadable, trying backup");
                }
                match self.read_state(&self.backup_path) {
                    Ok(state) => {
                        warn!("resumed from backup snapshot");
                        Some(state)
                    }
                    Err(_) => None,
                }
            }
        }
    }

    /// Load a snapshot only if it belongs to the given trading day.
    /// Stale snapshots are ignored and a fresh session starts.
    pub fn load_for_day(&self, date: NaiveDate) -> Option<SessionState> {
        let state = self.load()?;
        if state.date == date {
            info!(saved_at = %state.saved_at, "resuming session from snapshot");
            Some(state)
        } else {
            info!(
                snapshot_date = %state.date,
                today = %date,
                "ignoring stale snapshot from a previous day"
            );
            None
        }
    }

    /// Remove snapshots after a clean session end.
    pub fn clear(&self) -> Result<()> {
        for path in [&self.state_path, &self.backup_path] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("removing {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn read_state(&self, path: &Path) -> Result<SessionState> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::tier::TierManager;
    use chrono::NaiveDate;
    use std::fs;

    fn state(date: NaiveDate, pnl: f64) -> SessionState {
        SessionState {
            date,
            symbol: "MES".to_string(),
            open_positions: Vec::new(),
            daily_pnl: pnl,
            trades: Vec::new(),
            is_halted: false,
            halt_reason: None,
            tier: TierManager::new(2500.0).state().clone(),
            saved_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.save(&state(day(14), -42.5)).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.daily_pnl, -42.5);
        assert_eq!(loaded.date, day(14));
    }

    #[test]
    fn test_backup_rotation_and_corruption_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.save(&state(day(14), 10.0)).unwrap();
        store.save(&state(day(14), 20.0)).unwrap();
        assert!(dir.path().join(BACKUP_FILE).exists());

        // Corrupt the primary: the backup still loads
        fs::write(dir.path().join(STATE_FILE), "{not json").unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.daily_pnl, 10.0);
    }

    #[test]
    fn test_same_day_resume_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        store.save(&state(day(14), 15.0)).unwrap();
        assert!(store.load_for_day(day(14)).is_some());
        assert!(store.load_for_day(day(15)).is_none());
    }

    #[test]
    fn test_missing_state_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.save(&state(day(14), 1.0)).unwrap();
        store.save(&state(day(14), 2.0)).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }
}
