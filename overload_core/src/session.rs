//! Recording a workout: drafts in progress and closing them into the log.

use crate::progress::derive_progress;
use crate::progression::rebuild_exercise_states;
use crate::state::{read_locked, write_json_atomic};
use crate::{
    DraftExercise, Error, ExercisePerformance, PlannedExercise, Profile, Program, Result,
    SessionDraft, SessionRecord, SetRecord,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Open a draft for today's plan
pub fn start_session(
    plan: Vec<PlannedExercise>,
    day_key: &str,
    week_number: u32,
    sets_per_exercise: u32,
    date: NaiveDate,
    now_ms: i64,
) -> SessionDraft {
    SessionDraft {
        id: Uuid::new_v4().to_string(),
        date,
        day_key: day_key.to_string(),
        week_number,
        sets_per_exercise,
        exercises: plan
            .into_iter()
            .map(|planned| DraftExercise {
                planned,
                sets: Vec::new(),
            })
            .collect(),
        started_at: now_ms,
    }
}

impl SessionDraft {
    /// Record one set for an exercise
    ///
    /// The set goes to the first matching exercise that still has sets
    /// remaining, so an exercise planned twice fills in order.
    pub fn record_set(&mut self, exercise_id: &str, reps: u32, duration_sec: u32) -> Result<()> {
        let limit = self.sets_per_exercise as usize;
        let planned = self.exercises.iter().any(|e| e.planned.id == exercise_id);
        let slot = self
            .exercises
            .iter_mut()
            .filter(|exercise| exercise.planned.id == exercise_id)
            .find(|exercise| exercise.sets.len() < limit);

        match slot {
            Some(exercise) => {
                exercise.sets.push(SetRecord { reps, duration_sec });
                tracing::debug!(
                    "{}: set {}/{} at {} reps",
                    exercise_id,
                    exercise.sets.len(),
                    limit,
                    reps
                );
                Ok(())
            }
            None if planned => Err(
                Error::State(format!("All sets of {} are already recorded", exercise_id)),
            ),
            None => Err(Error::State(format!(
                "Exercise {} is not part of this session",
                exercise_id
            ))),
        }
    }

    /// The first exercise that still needs sets
    pub fn current_exercise(&self) -> Option<&DraftExercise> {
        let limit = self.sets_per_exercise as usize;
        self.exercises
            .iter()
            .find(|exercise| exercise.sets.len() < limit)
    }

    /// Every exercise has all of its sets
    pub fn is_complete(&self) -> bool {
        self.current_exercise().is_none()
    }

    /// Fill every remaining set, at the target reps unless `reps` is given
    pub fn complete_all(&mut self, reps: Option<u32>) {
        let limit = self.sets_per_exercise as usize;
        for exercise in &mut self.exercises {
            let reps = reps.unwrap_or(exercise.planned.target_reps);
            while exercise.sets.len() < limit {
                exercise.sets.push(SetRecord {
                    reps,
                    duration_sec: 0,
                });
            }
        }
    }
}

/// A draft saved between commands, tagged with the profile it belongs to
///
/// A bare [`SessionDraft`] document also parses; its profile id is then empty.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    #[serde(default)]
    pub profile_id: String,
    #[serde(flatten)]
    pub draft: SessionDraft,
}

impl ActiveSession {
    /// Load a saved draft; `Ok(None)` if there is none
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match read_locked(path)? {
            Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        tracing::debug!("Saved draft {} to {:?}", self.draft.id, path);
        Ok(())
    }

    /// Remove a saved draft, ignoring a missing file
    pub fn discard(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn performance_from_draft(exercise: &DraftExercise) -> ExercisePerformance {
    let planned = &exercise.planned;
    let mut performance = ExercisePerformance {
        id: planned.id.clone(),
        name: planned.name.clone(),
        description: Some(planned.description.clone()),
        equipment: Some(planned.equipment),
        target_reps: planned.target_reps,
        weight_kg: planned.weight_kg,
        increment_kg: planned.increment_kg,
        bodyweight_kg: Some(planned.bodyweight_kg),
        max_weight_kg: planned.max_weight_kg,
        uses_bodyweight: planned.uses_bodyweight,
        sets: exercise.sets.clone(),
        success: false,
    };
    performance.success = performance.met_target();
    performance
}

/// Close a draft into the profile's session log
///
/// Exercises without any recorded set are left out of the record. Exercise
/// states and progress are recomputed from the updated log.
pub fn finish_session(
    profile: &Profile,
    program: &Program,
    draft: &SessionDraft,
    completed_at: i64,
) -> Result<Profile> {
    let exercises: Vec<ExercisePerformance> = draft
        .exercises
        .iter()
        .filter(|exercise| !exercise.sets.is_empty())
        .map(performance_from_draft)
        .collect();

    if exercises.is_empty() {
        return Err(Error::State(format!(
            "Session {} has no recorded sets",
            draft.id
        )));
    }

    let record = SessionRecord {
        id: draft.id.clone(),
        date: draft.date,
        day_key: draft.day_key.clone(),
        week_number: draft.week_number,
        sets_per_exercise: draft.sets_per_exercise,
        exercises,
        started_at: Some(draft.started_at),
        completed_at: Some(completed_at),
    };

    let successes = record.exercises.iter().filter(|e| e.success).count();
    tracing::info!(
        "Finished {} on {}: {}/{} exercises on target",
        record.day_key,
        record.date,
        successes,
        record.exercises.len()
    );

    let mut updated = profile.clone();
    updated.sessions.push(record);
    updated.exercise_states =
        rebuild_exercise_states(program, &updated.sessions, &profile.exercise_states);
    updated.progress = derive_progress(&updated.sessions, &program.training_days);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{build_day_plan, SETS_PER_EXERCISE};
    use crate::progression::replay;
    use crate::{build_default_catalog, ProfileSettings, ProgressSnapshot};
    use std::collections::BTreeMap;

    fn profile() -> Profile {
        Profile {
            id: "jacob".into(),
            name: "Jacob".into(),
            program_id: "jacob".into(),
            program_start_date: None,
            settings: ProfileSettings {
                bodyweight_kg: 105.0,
                rest_seconds: 90,
            },
            exercise_states: BTreeMap::new(),
            sessions: vec![],
            progress: ProgressSnapshot::default(),
        }
    }

    fn draft(day_key: &str, date: &str) -> SessionDraft {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();
        let plan = build_day_plan(program, day_key, 1, &BTreeMap::new(), &[], 105.0);
        start_session(
            plan,
            day_key,
            1,
            SETS_PER_EXERCISE,
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_start_session_assigns_unique_ids() {
        let first = draft("Push A", "2024-01-01");
        let second = draft("Push A", "2024-01-01");
        assert_ne!(first.id, second.id);
        assert_eq!(first.exercises.len(), 3);
        assert!(first.exercises.iter().all(|e| e.sets.is_empty()));
        assert!(!first.is_complete());
    }

    #[test]
    fn test_record_set_fills_in_order() {
        let mut session = draft("Push A", "2024-01-01");
        for _ in 0..3 {
            session.record_set("squat", 5, 45).unwrap();
        }
        assert_eq!(session.current_exercise().unwrap().planned.id, "bench");

        let err = session.record_set("squat", 5, 45).unwrap_err();
        assert!(err.to_string().contains("already recorded"));

        let err = session.record_set("deadlift", 5, 45).unwrap_err();
        assert!(err.to_string().contains("not part of this session"));
    }

    #[test]
    fn test_complete_all_uses_targets() {
        let mut session = draft("Push A", "2024-01-01");
        session.record_set("squat", 4, 50).unwrap();
        session.complete_all(None);
        assert!(session.is_complete());
        assert_eq!(session.exercises[0].sets[0].reps, 4);
        assert_eq!(session.exercises[0].sets[2].reps, 5);
    }

    #[test]
    fn test_finish_session_appends_and_progresses() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let mut session = draft("Push A", "2024-01-01");
        session.complete_all(None);
        session.exercises[1].sets[2].reps = 3;

        let updated = finish_session(&profile(), program, &session, 1_700_000_100_000).unwrap();
        assert_eq!(updated.sessions.len(), 1);

        let record = &updated.sessions[0];
        assert_eq!(record.id, session.id);
        assert_eq!(record.completed_at, Some(1_700_000_100_000));
        assert!(record.exercises[0].success);
        assert!(!record.exercises[1].success);

        assert_eq!(updated.exercise_states["squat"].target_reps, 6);
        assert_eq!(updated.exercise_states["bench"].target_reps, 5);
        assert_eq!(updated.exercise_states["bench"].failure_count, 1);
        assert_eq!(updated.progress.last_completed_day_key.as_deref(), Some("Push A"));
        assert_eq!(updated.exercise_states, replay(program, &updated.sessions));
    }

    #[test]
    fn test_finish_session_skips_untouched_exercises() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let mut session = draft("Push A", "2024-01-01");
        session.record_set("squat", 5, 40).unwrap();

        let updated = finish_session(&profile(), program, &session, 1).unwrap();
        assert_eq!(updated.sessions[0].exercises.len(), 1);
        assert_eq!(updated.sessions[0].total_sets(), 1);
    }

    #[test]
    fn test_active_session_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("draft.json");
        assert!(ActiveSession::load(&path).unwrap().is_none());

        let mut session = draft("Pull A", "2024-01-02");
        session.record_set("deadlift", 5, 60).unwrap();
        let active = ActiveSession {
            profile_id: "jacob".into(),
            draft: session,
        };
        active.save(&path).unwrap();

        let loaded = ActiveSession::load(&path).unwrap().unwrap();
        assert_eq!(loaded, active);

        ActiveSession::discard(&path).unwrap();
        ActiveSession::discard(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_bare_draft_parses_without_profile() {
        let session = draft("Push B", "2024-01-04");
        let json = serde_json::to_string(&session).unwrap();
        let active: ActiveSession = serde_json::from_str(&json).unwrap();
        assert!(active.profile_id.is_empty());
        assert_eq!(active.draft, session);
    }

    #[test]
    fn test_finish_empty_session_fails() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let session = draft("Push A", "2024-01-01");
        assert!(finish_session(&profile(), program, &session, 1).is_err());
    }
}
