//! Progression logic for evolving per-exercise state.
//!
//! This module implements the rep ladder and load rules:
//! - Success below the ladder ceiling adds one target rep
//! - Success at the ceiling adds one increment and resets to the floor
//! - A weight cap holds the exercise at the ceiling instead
//! - Two consecutive failures deload by 5% and reset to the floor
//!
//! Exercise state is never trusted on its own: [`rebuild_exercise_states`]
//! replays the session log through [`update_exercise_state`] and is run after
//! every log mutation and every merge.

use crate::{ExercisePerformance, ExerciseState, Program, SessionRecord};
use std::collections::{BTreeMap, HashSet};

/// Target reps every ladder starts from
pub const LADDER_FLOOR: u32 = 5;

/// Target reps at which success converts into a weight increment
pub const LADDER_CEILING: u32 = 7;

/// Consecutive failures that trigger a deload
pub const DELOAD_AFTER_FAILURES: u32 = 2;

/// Multiplier applied to the working weight on deload
pub const DELOAD_FACTOR: f64 = 0.95;

/// Smallest loadable weight step
pub const WEIGHT_STEP_KG: f64 = 0.25;

/// Round `value` to the nearest multiple of `step`
pub fn round_to(value: f64, step: f64) -> f64 {
    if step == 0.0 {
        return value;
    }
    (value / step).round() * step
}

/// Round to the loadable step and clamp to the cap
///
/// Bodyweight exercises carry added load only and are left unrounded.
pub fn resolve_weight(weight_kg: f64, max_weight_kg: Option<f64>, uses_bodyweight: bool) -> f64 {
    let rounded = if uses_bodyweight {
        weight_kg
    } else {
        round_to(weight_kg, WEIGHT_STEP_KG)
    };
    match max_weight_kg {
        Some(max) if rounded > max => max,
        _ => rounded,
    }
}

/// Compute the next state of one exercise after a completed performance
///
/// The performance's recorded weight and target reps are the base of the
/// next state; the failure counter is carried from `current`.
pub fn update_exercise_state(
    current: &ExerciseState,
    performance: &ExercisePerformance,
) -> ExerciseState {
    if performance.increment_kg == 0.0 || !performance.increment_kg.is_finite() {
        return current.clone();
    }

    if performance.sets.is_empty() {
        tracing::debug!("No sets recorded for {}, state unchanged", performance.id);
        return current.clone();
    }

    let base_weight = if performance.weight_kg.is_finite() {
        performance.weight_kg
    } else {
        current.weight_kg
    };
    let weight = resolve_weight(
        base_weight,
        performance.max_weight_kg,
        performance.uses_bodyweight,
    );
    let target = performance.target_reps;

    if performance.met_target() {
        if target < LADDER_CEILING {
            tracing::debug!("{}: ladder {} -> {} reps", performance.id, target, target + 1);
            return ExerciseState {
                weight_kg: weight,
                target_reps: target + 1,
                failure_count: 0,
            };
        }

        let raised = weight + performance.increment_kg;
        if let Some(max) = performance.max_weight_kg {
            if raised > max {
                tracing::debug!("{}: held at cap {} kg", performance.id, max);
                return ExerciseState {
                    weight_kg: weight,
                    target_reps: target,
                    failure_count: 0,
                };
            }
        }

        let next_weight = resolve_weight(
            raised,
            performance.max_weight_kg,
            performance.uses_bodyweight,
        );
        tracing::debug!("{}: weight {} -> {} kg", performance.id, weight, next_weight);
        return ExerciseState {
            weight_kg: next_weight,
            target_reps: LADDER_FLOOR,
            failure_count: 0,
        };
    }

    let failures = current.failure_count + 1;
    if failures >= DELOAD_AFTER_FAILURES {
        let deloaded = resolve_weight(
            weight * DELOAD_FACTOR,
            performance.max_weight_kg,
            performance.uses_bodyweight,
        );
        tracing::debug!("{}: deload {} -> {} kg", performance.id, weight, deloaded);
        return ExerciseState {
            weight_kg: deloaded,
            target_reps: LADDER_FLOOR,
            failure_count: 0,
        };
    }

    ExerciseState {
        weight_kg: weight,
        target_reps: target,
        failure_count: failures,
    }
}

/// Give every program exercise a usable state
///
/// Invalid fields are replaced with the catalog default one by one. States of
/// exercises outside the program are kept when they are valid.
pub fn normalize_exercise_states(
    program: &Program,
    raw: &BTreeMap<String, ExerciseState>,
) -> BTreeMap<String, ExerciseState> {
    let mut states: BTreeMap<String, ExerciseState> = raw
        .iter()
        .filter(|(id, state)| program.exercise(id).is_none() && state.is_valid())
        .map(|(id, state)| (id.clone(), state.clone()))
        .collect();

    for (id, definition) in &program.exercises {
        let default = definition.default_state();
        let state = match raw.get(id) {
            Some(existing) => ExerciseState {
                weight_kg: if existing.weight_kg.is_finite() && existing.weight_kg >= 0.0 {
                    existing.weight_kg
                } else {
                    tracing::warn!("Invalid weight for {}, using catalog default", id);
                    default.weight_kg
                },
                target_reps: if existing.target_reps > 0 {
                    existing.target_reps
                } else {
                    default.target_reps
                },
                failure_count: existing.failure_count,
            },
            None => default,
        };
        states.insert(id.clone(), state);
    }

    states
}

/// Fill unusable numbers of a logged performance before it is replayed
///
/// A zero target takes the current state's target; a non-finite or negative
/// increment takes the catalog increment (or zero for unknown exercises).
fn repair_performance(
    program: &Program,
    current: &ExerciseState,
    performance: &ExercisePerformance,
) -> ExercisePerformance {
    let mut repaired = performance.clone();
    if repaired.target_reps == 0 {
        tracing::warn!(
            "Invalid target reps for {}, using {}",
            performance.id,
            current.target_reps
        );
        repaired.target_reps = current.target_reps;
    }
    if !repaired.increment_kg.is_finite() || repaired.increment_kg < 0.0 {
        repaired.increment_kg = program
            .exercise(&performance.id)
            .map_or(0.0, |definition| definition.increment_kg);
    }
    repaired
}

/// Rebuild exercise state by replaying the session log
///
/// Every exercise that appears in `sessions` is replayed from its catalog
/// default; `seed` only supplies states for exercises the log never touches.
pub fn rebuild_exercise_states(
    program: &Program,
    sessions: &[SessionRecord],
    seed: &BTreeMap<String, ExerciseState>,
) -> BTreeMap<String, ExerciseState> {
    let mut states = normalize_exercise_states(program, seed);

    let mut ordered: Vec<&SessionRecord> = sessions.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date));

    let mut replayed: HashSet<&str> = HashSet::new();
    for session in ordered {
        for performance in &session.exercises {
            let current = if replayed.insert(performance.id.as_str()) {
                program
                    .exercise(&performance.id)
                    .map(|definition| definition.default_state())
                    .unwrap_or_else(|| ExerciseState::from_performance(performance))
            } else {
                match states.get(&performance.id) {
                    Some(state) => state.clone(),
                    None => ExerciseState::from_performance(performance),
                }
            };
            let repaired = repair_performance(program, &current, performance);
            let next = update_exercise_state(&current, &repaired);
            states.insert(performance.id.clone(), next);
        }
    }

    tracing::debug!(
        "Rebuilt {} exercise states from {} sessions",
        replayed.len(),
        sessions.len()
    );
    states
}

/// Replay the log from catalog defaults alone
pub fn replay(program: &Program, sessions: &[SessionRecord]) -> BTreeMap<String, ExerciseState> {
    rebuild_exercise_states(program, sessions, &BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_catalog, SetRecord};
    use chrono::NaiveDate;

    fn performance(target: u32, weight: f64, reps: &[u32]) -> ExercisePerformance {
        ExercisePerformance {
            id: "squat".into(),
            name: "Back Squat".into(),
            description: None,
            equipment: None,
            target_reps: target,
            weight_kg: weight,
            increment_kg: 5.0,
            bodyweight_kg: Some(105.0),
            max_weight_kg: None,
            uses_bodyweight: false,
            sets: reps
                .iter()
                .map(|&reps| SetRecord {
                    reps,
                    duration_sec: 30,
                })
                .collect(),
            success: false,
        }
    }

    fn state(weight: f64, target: u32, failures: u32) -> ExerciseState {
        ExerciseState {
            weight_kg: weight,
            target_reps: target,
            failure_count: failures,
        }
    }

    fn session(date: &str, performances: Vec<ExercisePerformance>) -> SessionRecord {
        SessionRecord {
            id: format!("s-{}", date),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            day_key: "Push A".into(),
            week_number: 1,
            sets_per_exercise: 3,
            exercises: performances,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_ladder_climbs_then_increments_weight() {
        let mut current = state(94.0, 5, 0);

        current = update_exercise_state(&current, &performance(5, 94.0, &[5, 5, 5]));
        assert_eq!(current, state(94.0, 6, 0));

        current = update_exercise_state(&current, &performance(6, 94.0, &[6, 7, 6]));
        assert_eq!(current, state(94.0, 7, 0));

        current = update_exercise_state(&current, &performance(7, 94.0, &[7, 7, 7]));
        assert_eq!(current, state(99.0, 5, 0));
    }

    #[test]
    fn test_single_failure_only_counts() {
        let current = state(99.0, 7, 0);
        let next = update_exercise_state(&current, &performance(7, 99.0, &[7, 6, 7]));
        assert_eq!(next, state(99.0, 7, 1));
    }

    #[test]
    fn test_second_failure_deloads() {
        let current = state(99.0, 7, 1);
        let next = update_exercise_state(&current, &performance(7, 99.0, &[6, 5, 5]));
        // 99 * 0.95 = 94.05 rounds to 94.0
        assert_eq!(next, state(94.0, 5, 0));
    }

    #[test]
    fn test_success_resets_failures() {
        let current = state(60.0, 6, 1);
        let next = update_exercise_state(&current, &performance(6, 60.0, &[6, 6, 6]));
        assert_eq!(next.failure_count, 0);
        assert_eq!(next.target_reps, 7);
    }

    #[test]
    fn test_cap_holds_weight_and_reps() {
        let mut capped = performance(7, 90.0, &[7, 7, 7]);
        capped.max_weight_kg = Some(90.0);
        let next = update_exercise_state(&state(90.0, 7, 0), &capped);
        assert_eq!(next, state(90.0, 7, 0));

        let mut below_cap = performance(7, 87.5, &[7, 7, 7]);
        below_cap.max_weight_kg = Some(90.0);
        let next = update_exercise_state(&state(87.5, 7, 0), &below_cap);
        assert_eq!(next, state(87.5, 7, 0));
    }

    #[test]
    fn test_zero_increment_is_unchanged() {
        let mut mobility = performance(8, 0.0, &[8, 8, 8]);
        mobility.increment_kg = 0.0;
        let current = state(0.0, 8, 0);
        assert_eq!(update_exercise_state(&current, &mobility), current);
    }

    #[test]
    fn test_empty_sets_are_not_a_performance() {
        let current = state(94.0, 5, 1);
        let next = update_exercise_state(&current, &performance(5, 94.0, &[]));
        assert_eq!(next, current);
    }

    #[test]
    fn test_bodyweight_load_is_not_rounded() {
        let mut pullup = performance(7, 1.1, &[7, 7, 7]);
        pullup.uses_bodyweight = true;
        pullup.increment_kg = 1.25;
        let next = update_exercise_state(&state(1.1, 7, 0), &pullup);
        assert!((next.weight_kg - 2.35).abs() < 1e-9);
    }

    #[test]
    fn test_round_to_quarter() {
        assert_eq!(round_to(20.8, WEIGHT_STEP_KG), 20.75);
        assert_eq!(round_to(94.05, WEIGHT_STEP_KG), 94.0);
        assert_eq!(round_to(3.3, 0.0), 3.3);
    }

    #[test]
    fn test_normalize_replaces_invalid_fields() {
        crate::logging::init_test();
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let mut raw = BTreeMap::new();
        raw.insert("squat".to_string(), state(f64::NAN, 6, 1));
        raw.insert("bench".to_string(), state(70.0, 0, 0));

        let normalized = normalize_exercise_states(program, &raw);
        assert_eq!(normalized["squat"], state(94.0, 6, 1));
        assert_eq!(normalized["bench"], state(70.0, 5, 0));
        assert_eq!(normalized.len(), program.exercises.len());
    }

    #[test]
    fn test_replay_matches_incremental_updates() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let sessions = vec![
            session("2024-01-01", vec![performance(5, 94.0, &[5, 5, 5])]),
            session("2024-01-03", vec![performance(6, 94.0, &[6, 6, 6])]),
            session("2024-01-05", vec![performance(7, 94.0, &[7, 7, 7])]),
            session("2024-01-08", vec![performance(5, 99.0, &[5, 4, 4])]),
        ];

        let replayed = replay(program, &sessions);
        assert_eq!(replayed["squat"], state(99.0, 5, 1));
    }

    #[test]
    fn test_replay_repairs_corrupt_performance_numbers() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let mut missing_target = performance(0, 94.0, &[5, 5, 5]);
        missing_target.increment_kg = f64::NAN;
        let sessions = vec![session("2024-01-01", vec![missing_target])];

        // Target falls back to the default 5, so three sets of 5 climb to 6
        let replayed = replay(program, &sessions);
        assert_eq!(replayed["squat"], state(94.0, 6, 0));

        let mut later = sessions.clone();
        let mut broken_step = performance(6, 94.0, &[6, 6, 6]);
        broken_step.increment_kg = -1.0;
        later.push(session("2024-01-03", vec![broken_step]));
        later.push(session("2024-01-05", vec![performance(7, 94.0, &[7, 7, 7])]));
        assert_eq!(replay(program, &later)["squat"], state(99.0, 5, 0));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let sessions = vec![
            session("2024-01-01", vec![performance(5, 94.0, &[5, 5, 5])]),
            session("2024-01-03", vec![performance(6, 94.0, &[4, 4, 4])]),
        ];

        let once = replay(program, &sessions);
        let twice = rebuild_exercise_states(program, &sessions, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_replay_ignores_stale_seed_for_logged_exercises() {
        let catalog = build_default_catalog();
        let program = catalog.get("jacob").unwrap();

        let mut seed = BTreeMap::new();
        seed.insert("squat".to_string(), state(140.0, 7, 1));
        seed.insert("bench".to_string(), state(70.0, 6, 0));

        let sessions = vec![session(
            "2024-01-01",
            vec![performance(5, 94.0, &[5, 5, 5])],
        )];
        let rebuilt = rebuild_exercise_states(program, &sessions, &seed);

        assert_eq!(rebuilt["squat"], state(94.0, 6, 0));
        assert_eq!(rebuilt["bench"], state(70.0, 6, 0));
    }
}
