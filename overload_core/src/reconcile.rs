//! Merging two copies of the global state.
//!
//! The session log is the source of truth. Merging unions the logs, keeps the
//! most complete copy of every session, and then rebuilds exercise states and
//! progress from the merged log. Because every derived field is recomputed,
//! merging is idempotent and the outcome does not depend on which device was
//! "ahead".

use crate::catalog::{ProgramCatalog, DEFAULT_PROFILE_ID};
use crate::progress::derive_progress;
use crate::progression::{normalize_exercise_states, rebuild_exercise_states};
use crate::{
    GlobalSettings, GlobalState, Profile, Program, SessionRecord, CURRENT_SCHEMA_VERSION,
};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ============================================================================
// Sessions
// ============================================================================

/// Order two records of the same session by completeness
///
/// Comparison table, first difference wins:
/// 1. more recorded sets
/// 2. more exercises
/// 3. later date, then later completion (or start) time
/// 4. canonical JSON encoding
///
/// `Ordering::Greater` means `a` is the more complete record.
pub fn compare_completeness(a: &SessionRecord, b: &SessionRecord) -> Ordering {
    a.total_sets()
        .cmp(&b.total_sets())
        .then_with(|| a.exercises.len().cmp(&b.exercises.len()))
        .then_with(|| {
            let created = |s: &SessionRecord| (s.date, s.completed_at.or(s.started_at));
            created(a).cmp(&created(b))
        })
        .then_with(|| canonical_json(a).cmp(&canonical_json(b)))
}

fn canonical_json(session: &SessionRecord) -> String {
    serde_json::to_string(session).unwrap_or_default()
}

fn keep_more_complete(slot: &mut SessionRecord, candidate: &SessionRecord) {
    if compare_completeness(candidate, slot) == Ordering::Greater {
        *slot = candidate.clone();
    }
}

/// Collapse records sharing a date and day key into the most complete one
pub fn dedupe_sessions_by_day(sessions: Vec<SessionRecord>) -> Vec<SessionRecord> {
    let mut by_day: BTreeMap<(chrono::NaiveDate, String), SessionRecord> = BTreeMap::new();
    for session in sessions {
        let key = (session.date, session.day_key.clone());
        match by_day.get_mut(&key) {
            Some(existing) => keep_more_complete(existing, &session),
            None => {
                by_day.insert(key, session);
            }
        }
    }
    by_day.into_values().collect()
}

/// Union two session logs without duplicates, in chronological order
///
/// Records without an identifier are given their composite key as one.
pub fn merge_sessions(local: &[SessionRecord], remote: &[SessionRecord]) -> Vec<SessionRecord> {
    let mut by_key: BTreeMap<String, SessionRecord> = BTreeMap::new();
    for session in local.iter().chain(remote.iter()) {
        let key = session.merge_key();
        let mut session = session.clone();
        session.id = key.clone();
        match by_key.get_mut(&key) {
            Some(existing) => keep_more_complete(existing, &session),
            None => {
                by_key.insert(key, session);
            }
        }
    }

    let mut merged = dedupe_sessions_by_day(by_key.into_values().collect());
    merged.sort_by(|a, b| a.chronological_cmp(b));
    merged
}

// ============================================================================
// Profiles
// ============================================================================

/// Side whose settings win when two copies of a profile disagree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authority {
    Local,
    Remote,
}

/// Pick the authoritative copy of a profile
///
/// Comparison table, first difference wins:
/// 1. more sessions
/// 2. later most recent session
/// 3. local
pub fn authority(local: &Profile, remote: &Profile) -> Authority {
    let by_count = remote.sessions.len().cmp(&local.sessions.len());
    let by_date = remote
        .latest_session_date()
        .cmp(&local.latest_session_date());
    match by_count.then(by_date) {
        Ordering::Greater => Authority::Remote,
        _ => Authority::Local,
    }
}

/// A fresh profile for a catalog program
pub fn default_profile(program: &Program) -> Profile {
    Profile {
        id: program.id.clone(),
        name: program.name.clone(),
        program_id: program.id.clone(),
        program_start_date: None,
        settings: program.default_settings.clone(),
        exercise_states: normalize_exercise_states(program, &BTreeMap::new()),
        sessions: Vec::new(),
        progress: derive_progress(&[], &program.training_days),
    }
}

/// Merge two copies of one profile
///
/// `program` is `None` when the profile follows a program this build does
/// not know; its states are then carried over without replay.
pub fn merge_profile(local: &Profile, remote: &Profile, program: Option<&Program>) -> Profile {
    let sessions = merge_sessions(&local.sessions, &remote.sessions);

    let (preferred, other) = match authority(local, remote) {
        Authority::Local => (local, remote),
        Authority::Remote => (remote, local),
    };

    let mut seed = other.exercise_states.clone();
    seed.extend(
        preferred
            .exercise_states
            .iter()
            .map(|(id, state)| (id.clone(), state.clone())),
    );

    let mut settings = preferred.settings.or(&other.settings);

    let (exercise_states, progress) = match program {
        Some(program) => {
            settings = settings.or(&program.default_settings);
            (
                rebuild_exercise_states(program, &sessions, &seed),
                derive_progress(&sessions, &program.training_days),
            )
        }
        None => {
            seed.retain(|_, state| state.is_valid());
            (seed, derive_progress(&sessions, &[]))
        }
    };

    let pick = |ours: &str, theirs: &str| -> String {
        let chosen = if ours.is_empty() { theirs } else { ours };
        chosen.to_string()
    };

    Profile {
        id: pick(&local.id, &remote.id),
        name: pick(
            &pick(&preferred.name, &other.name),
            program.map_or("", |program| program.name.as_str()),
        ),
        program_id: pick(&preferred.program_id, &other.program_id),
        program_start_date: preferred.program_start_date.or(other.program_start_date),
        settings,
        exercise_states,
        sessions,
        progress,
    }
}

/// Bring one profile's derived fields up to date
pub fn normalize_profile(profile: &Profile, catalog: &ProgramCatalog) -> Profile {
    merge_profile(profile, profile, catalog.get(profile.program_key()))
}

// ============================================================================
// Global State
// ============================================================================

fn merge_profiles(
    local: &BTreeMap<String, Profile>,
    remote: &BTreeMap<String, Profile>,
    catalog: &ProgramCatalog,
) -> BTreeMap<String, Profile> {
    let mut merged = BTreeMap::new();
    for id in local.keys().chain(remote.keys()) {
        if merged.contains_key(id) {
            continue;
        }
        let profile = match (local.get(id), remote.get(id)) {
            (Some(ours), Some(theirs)) => {
                let program = catalog
                    .get(ours.program_key())
                    .or_else(|| catalog.get(theirs.program_key()));
                merge_profile(ours, theirs, program)
            }
            (Some(only), None) | (None, Some(only)) => normalize_profile(only, catalog),
            (None, None) => continue,
        };
        merged.insert(id.clone(), profile);
    }

    for program in catalog.programs() {
        if !merged.contains_key(&program.id) {
            tracing::debug!("Adding missing profile {}", program.id);
            merged.insert(program.id.clone(), default_profile(program));
        }
    }

    merged
}

fn resolve_active_profile(
    candidates: [Option<&String>; 2],
    profiles: &BTreeMap<String, Profile>,
) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|id| profiles.contains_key(id.as_str()))
        .cloned()
        .or_else(|| {
            profiles
                .contains_key(DEFAULT_PROFILE_ID)
                .then(|| DEFAULT_PROFILE_ID.to_string())
        })
        .or_else(|| profiles.keys().next().cloned())
}

/// Self-merge: recompute every derived field without touching the timestamp
pub fn normalize_state(state: &GlobalState, catalog: &ProgramCatalog) -> GlobalState {
    let profiles = merge_profiles(&state.profiles, &BTreeMap::new(), catalog);
    let active_profile_id =
        resolve_active_profile([state.active_profile_id.as_ref(), None], &profiles);
    GlobalState {
        schema_version: CURRENT_SCHEMA_VERSION,
        device_id: state.device_id.clone(),
        settings: state.settings.clone(),
        active_profile_id,
        profiles,
        updated_at: state.updated_at,
    }
}

/// Merge two snapshots at a given wall-clock time
///
/// With one side absent the other is normalized and returned unchanged
/// otherwise. The sync endpoint always comes from `local`.
pub fn merge_state_at(
    local: Option<&GlobalState>,
    remote: Option<&GlobalState>,
    catalog: &ProgramCatalog,
    now_ms: i64,
) -> Option<GlobalState> {
    let (local, remote) = match (local, remote) {
        (None, None) => return None,
        (Some(only), None) | (None, Some(only)) => return Some(normalize_state(only, catalog)),
        (Some(local), Some(remote)) => (local, remote),
    };

    let profiles = merge_profiles(&local.profiles, &remote.profiles, catalog);
    let active_profile_id = resolve_active_profile(
        [local.active_profile_id.as_ref(), remote.active_profile_id.as_ref()],
        &profiles,
    );
    let device_id = if local.device_id.is_empty() {
        remote.device_id.clone()
    } else {
        local.device_id.clone()
    };

    let merged = GlobalState {
        schema_version: CURRENT_SCHEMA_VERSION,
        device_id,
        settings: GlobalSettings {
            sync_url: local.settings.sync_url.clone(),
        },
        active_profile_id,
        profiles,
        updated_at: local.updated_at.max(remote.updated_at).max(now_ms),
    };

    tracing::debug!(
        "Merged state: {} profiles, {} sessions",
        merged.profiles.len(),
        merged
            .profiles
            .values()
            .map(|profile| profile.sessions.len())
            .sum::<usize>()
    );
    Some(merged)
}

/// Merge two snapshots now
pub fn merge_state(
    local: Option<&GlobalState>,
    remote: Option<&GlobalState>,
    catalog: &ProgramCatalog,
) -> Option<GlobalState> {
    merge_state_at(local, remote, catalog, Utc::now().timestamp_millis())
}
