//! Global state persistence with file locking.
//!
//! This module handles saving and loading the device's [`GlobalState`] with
//! advisory locks and atomic replacement, so a crash mid-write never leaves a
//! torn file behind.

use crate::catalog::{ProgramCatalog, DEFAULT_PROFILE_ID};
use crate::migration::upgrade;
use crate::reconcile::default_profile;
use crate::{Error, GlobalSettings, GlobalState, Result, CURRENT_SCHEMA_VERSION};
use chrono::{Local, NaiveDate, Utc};
use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// A brand-new state with one default profile per catalog program
pub fn build_default_state(
    catalog: &ProgramCatalog,
    today: NaiveDate,
    now_ms: i64,
) -> GlobalState {
    let profiles = catalog
        .programs()
        .iter()
        .map(|program| {
            let mut profile = default_profile(program);
            profile.program_start_date = Some(today);
            (profile.id.clone(), profile)
        })
        .collect();

    GlobalState {
        schema_version: CURRENT_SCHEMA_VERSION,
        device_id: Uuid::new_v4().to_string(),
        settings: GlobalSettings::default(),
        active_profile_id: Some(DEFAULT_PROFILE_ID.to_string()),
        profiles,
        updated_at: now_ms,
    }
}

/// Read a file's contents under a shared lock
///
/// Returns `Ok(None)` if the file does not exist.
pub fn read_locked(path: &Path) -> Result<Option<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    file.lock_shared()?;
    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    file.unlock()?;
    read?;

    Ok(Some(contents))
}

/// Serialize `value` as compact JSON and atomically replace `path`
///
/// Writes to a temp file in the same directory, syncs it to disk and renames
/// it over the original.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;

    // Exclusive lock on the temp file serializes concurrent writers
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        let contents = serde_json::to_string(value)?;
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Parse and upgrade a persisted document of any schema version
pub fn parse_state(contents: &str, catalog: &ProgramCatalog) -> Result<GlobalState> {
    let value: Value = serde_json::from_str(contents)?;
    upgrade(value, catalog)
}

impl GlobalState {
    /// Load state from a file with shared locking
    ///
    /// Returns a fresh default state if the file doesn't exist. If the file
    /// is unreadable or corrupted, logs a warning and returns the default.
    /// Older schemas are migrated on the way in.
    pub fn load(path: &Path, catalog: &ProgramCatalog) -> Result<Self> {
        let fresh = || {
            build_default_state(
                catalog,
                Local::now().date_naive(),
                Utc::now().timestamp_millis(),
            )
        };

        let contents = match read_locked(path) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                tracing::info!("No state file found, using default state");
                return Ok(fresh());
            }
            Err(e) => {
                tracing::warn!("Unable to read state file {:?}: {}. Using defaults.", path, e);
                return Ok(fresh());
            }
        };

        match parse_state(&contents, catalog) {
            Ok(mut state) => {
                if state.device_id.is_empty() {
                    state.device_id = Uuid::new_v4().to_string();
                    tracing::info!("Assigned device id {}", state.device_id);
                }
                tracing::debug!("Loaded state from {:?}", path);
                Ok(state)
            }
            Err(e) => {
                tracing::warn!("Failed to parse state file {:?}: {}. Using defaults.", path, e);
                Ok(fresh())
            }
        }
    }

    /// Save state to a file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        tracing::debug!("Saved state to {:?}", path);
        Ok(())
    }

    /// Load state, modify it, and save it back atomically
    ///
    /// The logical timestamp is advanced after `f` succeeds.
    pub fn update<F>(path: &Path, catalog: &ProgramCatalog, f: F) -> Result<Self>
    where
        F: FnOnce(&mut GlobalState) -> Result<()>,
    {
        let mut state = Self::load(path, catalog)?;
        f(&mut state)?;
        state.touch(Utc::now().timestamp_millis());
        state.save(path)?;
        Ok(state)
    }
}
