//! Core domain types for the Overload system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercise definitions and programs (static catalog data)
//! - Per-exercise progression state
//! - Session records (the append-only log) and session drafts
//! - Derived progress snapshots
//! - Profiles and the global state shared between devices
//!
//! Persisted types serialize with camelCase keys; that JSON shape is shared
//! with every client of a sync relay.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Day key of the non-progressing mobility slot
pub const MOBILITY_DAY: &str = "Mobility";

/// Prefix shared by every pull day key ("Pull A", "Pull B")
pub const PULL_DAY_PREFIX: &str = "Pull";

/// Schema version written by this crate
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Whether a day key is the non-progressing mobility day
pub fn is_mobility_day(day_key: &str) -> bool {
    day_key == MOBILITY_DAY
}

/// Whether a day key is a pull day
pub fn is_pull_day(day_key: &str) -> bool {
    day_key.starts_with(PULL_DAY_PREFIX)
}

// ============================================================================
// Catalog Types
// ============================================================================

/// Equipment an exercise is performed with
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Equipment {
    Barbell,
    Dumbbell,
    Smith,
    Cable,
    Machine,
    Bodyweight,
    Mobility,
}

/// An immutable exercise definition (e.g., "Back Squat")
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub equipment: Equipment,
    pub increment_kg: f64,
    pub start_weight_kg: f64,
    pub max_weight_kg: Option<f64>,
    pub uses_bodyweight: bool,
    pub fixed_target_reps: Option<u32>,
}

impl ExerciseDefinition {
    /// State an athlete starts with before any session touches this exercise
    pub fn default_state(&self) -> ExerciseState {
        ExerciseState {
            weight_kg: crate::progression::round_to(
                self.start_weight_kg,
                crate::progression::WEIGHT_STEP_KG,
            ),
            target_reps: self
                .fixed_target_reps
                .unwrap_or(crate::progression::LADDER_FLOOR),
            failure_count: 0,
        }
    }
}

/// Exercises involved in the pulldown → pull-up promotion rule
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyweightProgression {
    /// Loaded exercise whose history gates the promotion
    pub pulldown_id: String,
    /// Bodyweight exercise that replaces the pulldown slot
    pub pull_id: String,
    /// Assisted/negative exercise appended on pull days
    pub negative_id: String,
}

/// A training program: the micro-cycle, its exercises and day templates
#[derive(Clone, Debug)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub title: String,
    /// Ordered day keys of the repeating micro-cycle
    pub training_days: Vec<String>,
    pub exercises: HashMap<String, ExerciseDefinition>,
    /// Day key → exercise ids, longest first; early weeks use a prefix
    pub day_templates: HashMap<String, Vec<String>>,
    pub default_settings: ProfileSettings,
    pub bodyweight_progression: Option<BodyweightProgression>,
}

impl Program {
    /// Look up an exercise definition by id
    pub fn exercise(&self, id: &str) -> Option<&ExerciseDefinition> {
        self.exercises.get(id)
    }

    /// Training days that must all be completed to roll the week over
    pub fn required_days(&self) -> Vec<&str> {
        self.training_days
            .iter()
            .map(String::as_str)
            .filter(|day| !is_mobility_day(day))
            .collect()
    }
}

// ============================================================================
// Progression State
// ============================================================================

/// Per-athlete, per-exercise progression state
///
/// A materialized cache of replaying the session log; see
/// [`crate::progression::rebuild_exercise_states`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseState {
    #[serde(default = "unset_f64", deserialize_with = "lenient_f64")]
    pub weight_kg: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub target_reps: u32,
    #[serde(default, alias = "failures", deserialize_with = "lenient_u32")]
    pub failure_count: u32,
}

impl ExerciseState {
    /// Starting point for an exercise the catalog no longer knows about
    pub fn from_performance(performance: &ExercisePerformance) -> Self {
        Self {
            weight_kg: performance.weight_kg,
            target_reps: crate::progression::LADDER_FLOOR,
            failure_count: 0,
        }
    }

    /// True when every field holds a usable value
    pub fn is_valid(&self) -> bool {
        self.weight_kg.is_finite() && self.weight_kg >= 0.0 && self.target_reps > 0
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// A single performed set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetRecord {
    #[serde(deserialize_with = "lenient_u32")]
    pub reps: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub duration_sec: u32,
}

/// One exercise as it was performed inside a recorded session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePerformance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub equipment: Option<Equipment>,
    #[serde(deserialize_with = "lenient_u32")]
    pub target_reps: u32,
    #[serde(deserialize_with = "lenient_f64")]
    pub weight_kg: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub increment_kg: f64,
    #[serde(default)]
    pub bodyweight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight_kg: Option<f64>,
    #[serde(default)]
    pub uses_bodyweight: bool,
    #[serde(default)]
    pub sets: Vec<SetRecord>,
    #[serde(default)]
    pub success: bool,
}

impl ExercisePerformance {
    /// Every recorded set reached the target; no sets means no success
    pub fn met_target(&self) -> bool {
        !self.sets.is_empty() && self.sets.iter().all(|set| set.reps >= self.target_reps)
    }
}

/// An immutable entry of a profile's session log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Empty for records written before identifiers existed
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    pub day_key: String,
    #[serde(default = "first_week", deserialize_with = "lenient_u32")]
    pub week_number: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub sets_per_exercise: u32,
    #[serde(default)]
    pub exercises: Vec<ExercisePerformance>,
    /// Milliseconds since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Milliseconds since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl SessionRecord {
    /// Total number of sets recorded across all exercises
    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|exercise| exercise.sets.len()).sum()
    }

    /// Deterministic key for records that predate identifiers
    pub fn legacy_key(&self) -> String {
        let exercise_ids: Vec<&str> = self
            .exercises
            .iter()
            .map(|exercise| exercise.id.as_str())
            .collect();
        format!(
            "legacy-{}-{}-{}",
            self.date,
            self.day_key,
            exercise_ids.join("-")
        )
    }

    /// Identifier used for deduplication
    pub fn merge_key(&self) -> String {
        if self.id.is_empty() {
            self.legacy_key()
        } else {
            self.id.clone()
        }
    }

    /// Chronological ordering used for the session log
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.completed_at.cmp(&other.completed_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

// ============================================================================
// Planning and Drafts
// ============================================================================

/// An exercise resolved for today's plan
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedExercise {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub equipment: Equipment,
    pub uses_bodyweight: bool,
    pub increment_kg: f64,
    pub weight_kg: f64,
    pub bodyweight_kg: f64,
    pub target_reps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight_kg: Option<f64>,
}

/// A planned exercise plus the sets performed so far
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DraftExercise {
    #[serde(flatten)]
    pub planned: PlannedExercise,
    #[serde(default)]
    pub sets: Vec<SetRecord>,
}

/// A workout in progress, closed by [`crate::session::finish_session`]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraft {
    pub id: String,
    pub date: NaiveDate,
    pub day_key: String,
    pub week_number: u32,
    pub sets_per_exercise: u32,
    pub exercises: Vec<DraftExercise>,
    pub started_at: i64,
}

// ============================================================================
// Derived Progress
// ============================================================================

/// Week/cycle progress derived from the session log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub last_completed_date: Option<NaiveDate>,
    pub last_completed_day_key: Option<String>,
    pub last_completed_week_number: Option<u32>,
    pub current_week_number: u32,
    pub completed_days: BTreeSet<String>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            last_completed_date: None,
            last_completed_day_key: None,
            last_completed_week_number: None,
            current_week_number: 1,
            completed_days: BTreeSet::new(),
        }
    }
}

// ============================================================================
// Profiles and Global State
// ============================================================================

/// Per-profile settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    #[serde(default = "unset_f64", deserialize_with = "lenient_f64")]
    pub bodyweight_kg: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub rest_seconds: u32,
}

impl ProfileSettings {
    /// Settings with every field missing; normalization fills them in
    pub fn unset() -> Self {
        Self {
            bodyweight_kg: f64::NAN,
            rest_seconds: 0,
        }
    }

    /// Fill invalid fields from `fallback`
    pub fn or(&self, fallback: &ProfileSettings) -> ProfileSettings {
        ProfileSettings {
            bodyweight_kg: if self.bodyweight_kg.is_finite() && self.bodyweight_kg > 0.0 {
                self.bodyweight_kg
            } else {
                fallback.bodyweight_kg
            },
            rest_seconds: if self.rest_seconds > 0 {
                self.rest_seconds
            } else {
                fallback.rest_seconds
            },
        }
    }
}

/// One athlete following one program
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub program_id: String,
    #[serde(default)]
    pub program_start_date: Option<NaiveDate>,
    #[serde(default = "ProfileSettings::unset")]
    pub settings: ProfileSettings,
    #[serde(default)]
    pub exercise_states: BTreeMap<String, ExerciseState>,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    /// Derived; whatever was persisted is discarded on load
    #[serde(default, deserialize_with = "derived_progress")]
    pub progress: ProgressSnapshot,
}

impl Profile {
    /// Program this profile follows; older records only carry the profile id
    pub fn program_key(&self) -> &str {
        if self.program_id.is_empty() {
            &self.id
        } else {
            &self.program_id
        }
    }

    /// Date of the most recent session, if any
    pub fn latest_session_date(&self) -> Option<NaiveDate> {
        self.sessions.iter().map(|session| session.date).max()
    }
}

/// Device-wide settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Per-device sync endpoint; never taken from a remote copy
    #[serde(default)]
    pub sync_url: String,
}

/// The full snapshot persisted locally and exchanged with a relay
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub active_profile_id: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    /// Logical update time in milliseconds since epoch; a tie-breaker only
    #[serde(default)]
    pub updated_at: i64,
}

impl GlobalState {
    /// The profile currently selected on this device
    pub fn active_profile(&self) -> Option<&Profile> {
        self.active_profile_id
            .as_ref()
            .and_then(|id| self.profiles.get(id))
    }

    /// Advance the logical timestamp after a local mutation
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = self.updated_at.max(now_ms);
    }
}

// ============================================================================
// Lenient deserialization helpers
// ============================================================================

fn unset_f64() -> f64 {
    f64::NAN
}

fn first_week() -> u32 {
    1
}

fn current_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// Accept any JSON value; anything that is not a number becomes NaN
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(number) => number.as_f64().unwrap_or(f64::NAN),
        Value::String(text) => text.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

/// Accept any JSON value; anything that is not a non-negative number becomes 0
fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(match number {
        Some(n) if n.is_finite() && n >= 0.0 && n <= u32::MAX as f64 => n.round() as u32,
        _ => 0,
    })
}

/// Progress is recomputed from the log, so a malformed value is not an error
fn derived_progress<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ProgressSnapshot, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
