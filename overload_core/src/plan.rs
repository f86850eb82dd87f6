//! Day plan construction.
//!
//! This module selects today's exercises:
//! - The day template is cut to a week-dependent prefix (Mobility is never cut)
//! - Each exercise is resolved against the athlete's current state
//! - Lat pulldown history promotes pull-up negatives and then full pull-ups

use crate::progression::{resolve_weight, LADDER_CEILING};
use crate::{
    is_mobility_day, is_pull_day, ExerciseDefinition, ExerciseState, PlannedExercise, Program,
    ProgressSnapshot, SessionRecord,
};
use std::collections::BTreeMap;

/// Sets prescribed for every exercise
pub const SETS_PER_EXERCISE: u32 = 3;

/// Number of recent pulldown performances inspected for promotion
const PULLDOWN_WINDOW: usize = 4;

/// Number of template exercises performed in a given week
pub fn exercise_count(week_number: u32) -> usize {
    match week_number {
        0..=4 => 3,
        5..=8 => 4,
        9..=12 => 5,
        _ => 6,
    }
}

/// Day key that follows `last_completed` in the program's cycle
///
/// Starts the cycle when nothing was completed yet or the key is unknown.
pub fn next_training_day<'a>(
    program: &'a Program,
    last_completed: Option<&str>,
) -> Option<&'a str> {
    let days = &program.training_days;
    if days.is_empty() {
        return None;
    }
    let next = last_completed
        .and_then(|key| days.iter().position(|day| day == key))
        .map(|index| (index + 1) % days.len())
        .unwrap_or(0);
    Some(days[next].as_str())
}

/// Day key and week number to train next
pub fn next_session<'a>(
    program: &'a Program,
    progress: &ProgressSnapshot,
) -> Option<(&'a str, u32)> {
    next_training_day(program, progress.last_completed_day_key.as_deref())
        .map(|day| (day, progress.current_week_number))
}

/// Readiness for bodyweight pulling, from recent pulldown history
#[derive(Clone, Debug, PartialEq)]
pub struct PullupReadiness {
    pub qualifying_successes: usize,
    pub average_weight_kg: f64,
    pub ready_for_negatives: bool,
    pub ready_for_pullup: bool,
}

/// Evaluate the last pulldown performances against bodyweight
///
/// A performance qualifies when it succeeded at the ladder ceiling. `history`
/// must be in chronological order.
pub fn evaluate_pullup_transition(
    history: &[SessionRecord],
    pulldown_id: &str,
    bodyweight_kg: f64,
) -> PullupReadiness {
    let performances: Vec<_> = history
        .iter()
        .flat_map(|session| session.exercises.iter())
        .filter(|exercise| exercise.id == pulldown_id)
        .collect();

    let recent = &performances[performances.len().saturating_sub(PULLDOWN_WINDOW)..];
    let qualifying: Vec<f64> = recent
        .iter()
        .filter(|exercise| exercise.success && exercise.target_reps == LADDER_CEILING)
        .map(|exercise| exercise.weight_kg)
        .collect();

    let average_weight_kg = if qualifying.is_empty() {
        0.0
    } else {
        qualifying.iter().sum::<f64>() / qualifying.len() as f64
    };

    PullupReadiness {
        qualifying_successes: qualifying.len(),
        average_weight_kg,
        ready_for_negatives: qualifying.len() >= 2 && average_weight_kg >= bodyweight_kg * 0.8,
        ready_for_pullup: qualifying.len() >= 3 && average_weight_kg >= bodyweight_kg,
    }
}

/// Resolve one catalog exercise against the athlete's state
pub fn plan_exercise(
    definition: &ExerciseDefinition,
    states: &BTreeMap<String, ExerciseState>,
    bodyweight_kg: f64,
) -> PlannedExercise {
    let state = states
        .get(&definition.id)
        .filter(|state| state.is_valid())
        .cloned()
        .unwrap_or_else(|| definition.default_state());

    PlannedExercise {
        id: definition.id.clone(),
        name: definition.name.clone(),
        description: definition.description.clone(),
        equipment: definition.equipment,
        uses_bodyweight: definition.uses_bodyweight,
        increment_kg: definition.increment_kg,
        weight_kg: resolve_weight(
            state.weight_kg,
            definition.max_weight_kg,
            definition.uses_bodyweight,
        ),
        bodyweight_kg,
        target_reps: definition.fixed_target_reps.unwrap_or(state.target_reps),
        max_weight_kg: definition.max_weight_kg,
    }
}

/// Build the ordered list of exercises for a day
pub fn build_day_plan(
    program: &Program,
    day_key: &str,
    week_number: u32,
    states: &BTreeMap<String, ExerciseState>,
    history: &[SessionRecord],
    bodyweight_kg: f64,
) -> Vec<PlannedExercise> {
    let Some(template) = program.day_templates.get(day_key) else {
        tracing::debug!("No template for day '{}', nothing planned", day_key);
        return Vec::new();
    };

    let count = if is_mobility_day(day_key) {
        template.len()
    } else {
        exercise_count(week_number).min(template.len())
    };

    let mut plan: Vec<PlannedExercise> = template
        .iter()
        .take(count)
        .filter_map(|id| match program.exercise(id) {
            Some(definition) => Some(plan_exercise(definition, states, bodyweight_kg)),
            None => {
                tracing::warn!("Template for '{}' references unknown exercise {}", day_key, id);
                None
            }
        })
        .collect();

    let Some(progression) = &program.bodyweight_progression else {
        return plan;
    };

    let readiness = evaluate_pullup_transition(history, &progression.pulldown_id, bodyweight_kg);

    if readiness.ready_for_pullup {
        if let Some(pull) = program.exercise(&progression.pull_id) {
            for slot in plan.iter_mut().filter(|slot| slot.id == progression.pulldown_id) {
                *slot = plan_exercise(pull, states, bodyweight_kg);
            }
            tracing::info!(
                "Pulldown average {:.1} kg over {} sessions, substituting {}",
                readiness.average_weight_kg,
                readiness.qualifying_successes,
                pull.name
            );
        }
    } else if readiness.ready_for_negatives && is_pull_day(day_key) {
        let already_planned = plan.iter().any(|slot| slot.id == progression.negative_id);
        if !already_planned {
            if let Some(negative) = program.exercise(&progression.negative_id) {
                plan.push(plan_exercise(negative, states, bodyweight_kg));
            }
        }
    }

    plan
}
