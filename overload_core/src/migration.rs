//! Versioned schema migration for persisted state.
//!
//! Version 1 was a flat single-athlete document (`settings`, `exerciseStates`,
//! `sessions` at the top level). Version 2 keys everything by profile. Each
//! step rewrites the raw JSON; the result is then parsed piecewise so one bad
//! record never discards the whole file.

use crate::catalog::{ProgramCatalog, DEFAULT_PROFILE_ID};
use crate::reconcile::normalize_state;
use crate::{
    Error, GlobalSettings, GlobalState, Profile, Result, SessionRecord, CURRENT_SCHEMA_VERSION,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Schema version of a raw document
pub fn detect_version(value: &Value) -> u32 {
    if let Some(version) = value.get("schemaVersion").and_then(Value::as_u64) {
        return u32::try_from(version).unwrap_or(u32::MAX);
    }
    if value.get("profiles").map_or(false, Value::is_object) {
        2
    } else {
        1
    }
}

/// Rewrite a flat v1 document into the v2 profile map
///
/// The single athlete of a v1 document becomes the default profile.
pub fn migrate_v1_to_v2(value: Value) -> Value {
    let field = |key: &str| value.get(key).cloned().unwrap_or(Value::Null);
    let settings = field("settings");
    let setting = |key: &str| settings.get(key).cloned().unwrap_or(Value::Null);

    let mut profile = Map::new();
    profile.insert("id".into(), json!(DEFAULT_PROFILE_ID));
    profile.insert("programId".into(), json!(DEFAULT_PROFILE_ID));
    profile.insert("programStartDate".into(), field("programStartDate"));
    profile.insert(
        "settings".into(),
        json!({
            "bodyweightKg": setting("bodyweightKg"),
            "restSeconds": setting("restSeconds"),
        }),
    );
    profile.insert(
        "exerciseStates".into(),
        value.get("exerciseStates").cloned().unwrap_or_else(|| json!({})),
    );
    profile.insert(
        "sessions".into(),
        value.get("sessions").cloned().unwrap_or_else(|| json!([])),
    );

    let mut profiles = Map::new();
    profiles.insert(DEFAULT_PROFILE_ID.into(), Value::Object(profile));

    json!({
        "schemaVersion": 2,
        "deviceId": field("deviceId"),
        "settings": { "syncUrl": setting("syncUrl") },
        "activeProfileId": DEFAULT_PROFILE_ID,
        "profiles": profiles,
        "updatedAt": field("updatedAt"),
    })
}

/// Apply every migration step up to the current schema
pub fn migrate(mut value: Value) -> Value {
    let mut version = detect_version(&value);
    if version > CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            "State schema {} is newer than {}, reading it as {}",
            version,
            CURRENT_SCHEMA_VERSION,
            CURRENT_SCHEMA_VERSION
        );
        return value;
    }
    while version < CURRENT_SCHEMA_VERSION {
        value = match version {
            1 => migrate_v1_to_v2(value),
            _ => value,
        };
        tracing::info!("Migrated state from schema {} to {}", version, version + 1);
        version += 1;
    }
    value
}

/// Parse a profile, dropping session records that cannot be read
fn parse_profile(id: &str, raw: &Value) -> Option<Profile> {
    let mut raw = raw.clone();
    let object = raw.as_object_mut()?;

    let sessions: Vec<Value> = match object.remove("sessions") {
        Some(Value::Array(sessions)) => sessions,
        _ => Vec::new(),
    };
    let mut kept = Vec::with_capacity(sessions.len());
    for session in sessions {
        match serde_json::from_value::<SessionRecord>(session) {
            Ok(record) => kept.push(record),
            Err(e) => tracing::warn!("Dropping unreadable session in profile {}: {}", id, e),
        }
    }

    if !object.get("exerciseStates").map_or(true, Value::is_object) {
        object.remove("exerciseStates");
    }
    if !object.get("settings").map_or(true, Value::is_object) {
        object.remove("settings");
    }
    object.insert("id".into(), json!(id));

    match serde_json::from_value::<Profile>(raw) {
        Ok(mut profile) => {
            profile.sessions = kept;
            Some(profile)
        }
        Err(e) => {
            tracing::warn!("Dropping unreadable profile {}: {}", id, e);
            None
        }
    }
}

/// Turn any persisted document into a normalized current-schema state
pub fn upgrade(value: Value, catalog: &ProgramCatalog) -> Result<GlobalState> {
    if !value.is_object() {
        return Err(Error::State("state document is not a JSON object".into()));
    }
    let value = migrate(value);

    let mut profiles = BTreeMap::new();
    if let Some(raw_profiles) = value.get("profiles").and_then(Value::as_object) {
        for (id, raw) in raw_profiles {
            if let Some(profile) = parse_profile(id, raw) {
                profiles.insert(id.clone(), profile);
            }
        }
    }

    let updated_at = value
        .get("updatedAt")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0);

    let state = GlobalState {
        schema_version: CURRENT_SCHEMA_VERSION,
        device_id: value
            .get("deviceId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        settings: value
            .get("settings")
            .cloned()
            .and_then(|settings| serde_json::from_value::<GlobalSettings>(settings).ok())
            .unwrap_or_default(),
        active_profile_id: value
            .get("activeProfileId")
            .and_then(Value::as_str)
            .map(str::to_string),
        profiles,
        updated_at,
    };

    Ok(normalize_state(&state, catalog))
}
