//! Relay and sync tests for overload.
//!
//! These tests verify that several devices can safely:
//! - Converge on the same session log through one relay store
//! - Push to the relay simultaneously (file locking)
//! - Keep local state intact when the relay is unusable

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("overload"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn finish_day(data_dir: &Path, day: &str, date: &str) {
    cli()
        .arg("finish")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--auto-complete")
        .arg("--day")
        .arg(day)
        .arg("--date")
        .arg(date)
        .assert()
        .success();
}

fn session_dates(state: &Value, profile: &str) -> Vec<String> {
    let mut dates: Vec<String> = state["profiles"][profile]["sessions"]
        .as_array()
        .expect("sessions should be an array")
        .iter()
        .map(|session| session["date"].as_str().unwrap_or_default().to_string())
        .collect();
    dates.sort();
    dates
}

fn read_json(path: &Path) -> Value {
    let contents = fs::read_to_string(path).expect("Failed to read file");
    serde_json::from_str(&contents).expect("File should hold valid JSON")
}

#[test]
fn test_two_devices_converge_through_relay() {
    let phone = setup_test_dir();
    let tablet = setup_test_dir();
    let relay_dir = setup_test_dir();
    let relay = relay_dir.path().join("relay.json");

    finish_day(phone.path(), "Push A", "2024-01-01");
    finish_day(tablet.path(), "Pull A", "2024-01-02");

    cli()
        .arg("sync")
        .arg("--data-dir")
        .arg(phone.path())
        .arg("--relay")
        .arg(&relay)
        .assert()
        .success()
        .stdout(predicate::str::contains("pushed"));

    cli()
        .arg("sync")
        .arg("--data-dir")
        .arg(tablet.path())
        .arg("--relay")
        .arg(&relay)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 sessions"));

    cli()
        .arg("sync")
        .arg("--data-dir")
        .arg(phone.path())
        .arg("--relay")
        .arg(&relay)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 sessions"));

    let phone_state = read_json(&phone.path().join("state.json"));
    let tablet_state = read_json(&tablet.path().join("state.json"));
    let expected = vec!["2024-01-01".to_string(), "2024-01-02".to_string()];
    assert_eq!(session_dates(&phone_state, "jacob"), expected);
    assert_eq!(session_dates(&tablet_state, "jacob"), expected);

    // Each device keeps its own identity
    assert_ne!(phone_state["deviceId"], tablet_state["deviceId"]);

    // Replayed states agree on both devices
    assert_eq!(
        phone_state["profiles"]["jacob"]["exerciseStates"],
        tablet_state["profiles"]["jacob"]["exerciseStates"]
    );

    cli()
        .arg("progress")
        .arg("--data-dir")
        .arg(tablet.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Next: Mobility"));
}

#[test]
fn test_sync_uses_device_sync_url() {
    let device = setup_test_dir();
    let relay_dir = setup_test_dir();
    let relay = relay_dir.path().join("relay.json");

    finish_day(device.path(), "Push A", "2024-03-04");

    cli()
        .arg("settings")
        .arg("--data-dir")
        .arg(device.path())
        .arg("--sync-url")
        .arg(&relay)
        .assert()
        .success();

    cli()
        .arg("sync")
        .arg("--data-dir")
        .arg(device.path())
        .assert()
        .success();

    let stored = read_json(&relay);
    assert_eq!(session_dates(&stored, "jacob"), vec!["2024-03-04".to_string()]);
}

#[test]
fn test_concurrent_relay_pushes_keep_every_session() {
    let relay_dir = setup_test_dir();
    let relay = relay_dir.path().join("relay.json");

    // One device per day of March, each with a single session
    let devices: Vec<TempDir> = (1..=6)
        .map(|day| {
            let device = setup_test_dir();
            finish_day(device.path(), "Push A", &format!("2024-03-{:02}", day));
            device
        })
        .collect();

    let handles: Vec<_> = devices
        .iter()
        .enumerate()
        .map(|(i, device)| {
            let snapshot = device.path().join("state.json");
            let relay = relay.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(i as u64 * 5));
                cli()
                    .arg("relay")
                    .arg("push")
                    .arg("--store")
                    .arg(&relay)
                    .arg("--input")
                    .arg(&snapshot)
                    .timeout(Duration::from_secs(10))
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let stored = read_json(&relay);
    let dates = session_dates(&stored, "jacob");
    assert_eq!(dates.len(), 6, "Expected 6 sessions in relay, got {:?}", dates);
    assert_eq!(stored["schemaVersion"], 2);
}

#[test]
fn test_relay_push_reads_stdin() {
    let device = setup_test_dir();
    let relay_dir = setup_test_dir();
    let relay = relay_dir.path().join("relay.json");

    finish_day(device.path(), "Push A", "2024-04-01");
    let snapshot = fs::read_to_string(device.path().join("state.json")).unwrap();

    cli()
        .arg("relay")
        .arg("push")
        .arg("--store")
        .arg(&relay)
        .write_stdin(snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schemaVersion\": 2"));

    cli()
        .arg("relay")
        .arg("pull")
        .arg("--store")
        .arg(&relay)
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-04-01"));
}

#[test]
fn test_relay_pull_of_missing_store() {
    let relay_dir = setup_test_dir();

    cli()
        .arg("relay")
        .arg("pull")
        .arg("--store")
        .arg(relay_dir.path().join("nothing.json"))
        .assert()
        .success()
        .stdout(predicate::str::diff("null\n"));
}

#[test]
fn test_sync_without_relay_fails() {
    let device = setup_test_dir();

    cli()
        .arg("sync")
        .arg("--data-dir")
        .arg(device.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No relay configured"));
}

#[test]
fn test_corrupt_relay_leaves_local_state_untouched() {
    let device = setup_test_dir();
    let relay_dir = setup_test_dir();
    let relay = relay_dir.path().join("relay.json");

    finish_day(device.path(), "Push A", "2024-05-06");
    let state_path = device.path().join("state.json");
    let before = fs::read_to_string(&state_path).unwrap();

    fs::write(&relay, "{ not a relay").unwrap();

    cli()
        .arg("sync")
        .arg("--data-dir")
        .arg(device.path())
        .arg("--relay")
        .arg(&relay)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sync failed"));

    assert_eq!(fs::read_to_string(&state_path).unwrap(), before);
    assert_eq!(fs::read_to_string(&relay).unwrap(), "{ not a relay");
}
