//! Synchronization with a relay.
//!
//! A relay stores one canonical [`GlobalState`]. Pulling returns it; pushing
//! merges a candidate into it and returns the result. Every response is run
//! through the same merge before it is adopted, so a stale or repeated
//! response is harmless.

use crate::catalog::ProgramCatalog;
use crate::reconcile::merge_state_at;
use crate::state::{parse_state, read_locked, write_json_atomic};
use crate::{Error, GlobalState, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// The two operations a relay offers
pub trait SyncTransport {
    /// Currently persisted snapshot, or `None` if nothing was written yet
    fn pull(&self) -> Result<Option<GlobalState>>;

    /// Merge `candidate` into the persisted snapshot and return the result
    fn push(&self, candidate: &GlobalState) -> Result<GlobalState>;
}

/// A relay backed by a JSON file, e.g. on a shared or synced directory
///
/// Concurrent pushes from separate processes are serialized with an
/// exclusive lock on a `<store>.lock` sidecar held across read, merge and
/// write.
pub struct FileRelay<'a> {
    path: PathBuf,
    catalog: &'a ProgramCatalog,
}

impl<'a> FileRelay<'a> {
    pub fn new(path: impl Into<PathBuf>, catalog: &'a ProgramCatalog) -> Self {
        Self {
            path: path.into(),
            catalog,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn open_lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?)
    }

    fn merge_into_store(&self, candidate: &GlobalState) -> Result<GlobalState> {
        let existing = self.read_store()?;
        let merged = merge_state_at(
            existing.as_ref(),
            Some(candidate),
            self.catalog,
            chrono::Utc::now().timestamp_millis(),
        )
        .ok_or_else(|| Error::Sync("Nothing to store".into()))?;
        write_json_atomic(&self.path, &merged)?;
        Ok(merged)
    }

    fn read_store(&self) -> Result<Option<GlobalState>> {
        match read_locked(&self.path)? {
            Some(contents) => parse_state(&contents, self.catalog)
                .map(Some)
                .map_err(|e| {
                    Error::Sync(format!("Relay store {:?} is unreadable: {}", self.path, e))
                }),
            None => Ok(None),
        }
    }
}

impl SyncTransport for FileRelay<'_> {
    fn pull(&self) -> Result<Option<GlobalState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let stored = self.read_store();
        lock.unlock()?;
        stored
    }

    fn push(&self, candidate: &GlobalState) -> Result<GlobalState> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let result = self.merge_into_store(candidate);
        lock.unlock()?;

        if let Ok(merged) = &result {
            tracing::info!(
                "Relay {:?} now holds {} sessions",
                self.path,
                merged
                    .profiles
                    .values()
                    .map(|profile| profile.sessions.len())
                    .sum::<usize>()
            );
        }
        result
    }
}

/// Result of one synchronization round
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    /// The merged state to adopt locally
    Synced { state: GlobalState, pushed: bool },
    /// Nothing was adopted; local state is unchanged
    Failed { reason: String },
}

/// True when the relay is missing sessions the merged state has
fn relay_is_behind(merged: &GlobalState, remote: Option<&GlobalState>) -> bool {
    let Some(remote) = remote else {
        return true;
    };
    merged.profiles.iter().any(|(id, profile)| {
        remote
            .profiles
            .get(id)
            .map_or(true, |theirs| theirs.sessions != profile.sessions)
    })
}

/// Pull, merge, and push back if the relay is behind
///
/// Transport errors are not retried; they become [`SyncOutcome::Failed`].
pub fn synchronize(
    local: &GlobalState,
    transport: &dyn SyncTransport,
    catalog: &ProgramCatalog,
    now_ms: i64,
) -> SyncOutcome {
    let remote = match transport.pull() {
        Ok(remote) => remote,
        Err(e) => {
            tracing::warn!("Sync pull failed: {}", e);
            return SyncOutcome::Failed {
                reason: format!("pull failed: {}", e),
            };
        }
    };

    let Some(merged) = merge_state_at(Some(local), remote.as_ref(), catalog, now_ms) else {
        return SyncOutcome::Failed {
            reason: "nothing to merge".into(),
        };
    };

    if !relay_is_behind(&merged, remote.as_ref()) {
        tracing::info!("Relay is up to date");
        return SyncOutcome::Synced {
            state: merged,
            pushed: false,
        };
    }

    match transport.push(&merged) {
        Ok(stored) => {
            let state = merge_state_at(Some(&merged), Some(&stored), catalog, now_ms)
                .unwrap_or(merged);
            tracing::info!("Pushed local sessions to relay");
            SyncOutcome::Synced {
                state,
                pushed: true,
            }
        }
        Err(e) => {
            tracing::warn!("Sync push failed: {}", e);
            SyncOutcome::Failed {
                reason: format!("push failed: {}", e),
            }
        }
    }
}
