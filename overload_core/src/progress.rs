//! Week and cycle progress derived from the session log.
//!
//! The week number advances each time every required training day (all
//! training days except Mobility) has been completed since the last rollover.

use crate::{is_mobility_day, ProgressSnapshot, SessionRecord};
use std::collections::BTreeSet;

/// Recompute progress from scratch
pub fn derive_progress(history: &[SessionRecord], training_days: &[String]) -> ProgressSnapshot {
    if history.is_empty() || training_days.is_empty() {
        return ProgressSnapshot::default();
    }

    let mut ordered: Vec<&SessionRecord> = history
        .iter()
        .filter(|session| training_days.contains(&session.day_key))
        .collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date));

    let required: BTreeSet<&str> = training_days
        .iter()
        .map(String::as_str)
        .filter(|day| !is_mobility_day(day))
        .collect();

    let mut snapshot = ProgressSnapshot::default();
    for session in ordered {
        snapshot.last_completed_date = Some(session.date);
        snapshot.last_completed_day_key = Some(session.day_key.clone());
        snapshot.last_completed_week_number = Some(session.week_number);

        if required.contains(session.day_key.as_str()) {
            snapshot.completed_days.insert(session.day_key.clone());
            if snapshot.completed_days.len() >= required.len() {
                snapshot.current_week_number += 1;
                snapshot.completed_days.clear();
                tracing::debug!(
                    "Cycle complete on {}, now week {}",
                    session.date,
                    snapshot.current_week_number
                );
            }
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn days() -> Vec<String> {
        ["Push A", "Pull A", "Mobility", "Push B", "Pull B"]
            .iter()
            .map(|day| day.to_string())
            .collect()
    }

    fn session(date: &str, day_key: &str) -> SessionRecord {
        SessionRecord {
            id: format!("{}-{}", date, day_key),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            day_key: day_key.into(),
            week_number: 1,
            sets_per_exercise: 3,
            exercises: vec![],
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_empty_history_is_week_one() {
        let snapshot = derive_progress(&[], &days());
        assert_eq!(snapshot, ProgressSnapshot::default());
        assert_eq!(snapshot.current_week_number, 1);

        let snapshot = derive_progress(&[session("2024-01-01", "Push A")], &[]);
        assert_eq!(snapshot.current_week_number, 1);
        assert!(snapshot.last_completed_date.is_none());
    }

    #[test]
    fn test_week_rolls_over_after_required_days() {
        let history = vec![
            session("2024-01-01", "Push A"),
            session("2024-01-02", "Pull A"),
            session("2024-01-04", "Push B"),
            session("2024-01-05", "Pull B"),
        ];

        let snapshot = derive_progress(&history, &days());
        assert_eq!(snapshot.current_week_number, 2);
        assert!(snapshot.completed_days.is_empty());
        assert_eq!(snapshot.last_completed_day_key.as_deref(), Some("Pull B"));
    }

    #[test]
    fn test_next_cycle_needs_all_required_days_again() {
        let history = vec![
            session("2024-01-01", "Push A"),
            session("2024-01-02", "Pull A"),
            session("2024-01-04", "Push B"),
            session("2024-01-05", "Pull B"),
            session("2024-01-08", "Push A"),
            session("2024-01-09", "Push A"),
        ];

        let snapshot = derive_progress(&history, &days());
        assert_eq!(snapshot.current_week_number, 2);
        assert_eq!(
            snapshot.completed_days.iter().collect::<Vec<_>>(),
            vec!["Push A"]
        );
    }

    #[test]
    fn test_mobility_updates_last_completed_only() {
        let history = vec![
            session("2024-01-01", "Push A"),
            session("2024-01-03", "Mobility"),
        ];

        let snapshot = derive_progress(&history, &days());
        assert_eq!(snapshot.current_week_number, 1);
        assert_eq!(snapshot.last_completed_day_key.as_deref(), Some("Mobility"));
        assert_eq!(snapshot.completed_days.len(), 1);
    }

    #[test]
    fn test_unknown_days_and_order() {
        let history = vec![
            session("2024-01-05", "Pull B"),
            session("2024-01-01", "Push A"),
            session("2024-01-06", "Rest"),
            session("2024-01-02", "Pull A"),
            session("2024-01-04", "Push B"),
        ];

        let snapshot = derive_progress(&history, &days());
        assert_eq!(snapshot.current_week_number, 2);
        assert_eq!(
            snapshot.last_completed_date,
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }
}
