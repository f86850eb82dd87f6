#![forbid(unsafe_code)]

//! Core domain model and business logic for the Overload strength tracker.
//!
//! This crate provides:
//! - Domain types (programs, exercise states, sessions, profiles)
//! - Program catalog
//! - Progression engine and day plan builder
//! - Week progress tracking and session recording
//! - State reconciliation between devices
//! - Persistence (versioned migration, locked state files, file relay)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod progression;
pub mod plan;
pub mod progress;
pub mod session;
pub mod reconcile;
pub mod migration;
pub mod state;
pub mod sync;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, ProgramCatalog, DEFAULT_PROFILE_ID};
pub use config::Config;
pub use plan::{build_day_plan, next_session, SETS_PER_EXERCISE};
pub use progress::derive_progress;
pub use progression::{rebuild_exercise_states, update_exercise_state};
pub use reconcile::{merge_state, normalize_state};
pub use session::{finish_session, start_session};
pub use sync::{synchronize, FileRelay, SyncOutcome, SyncTransport};
