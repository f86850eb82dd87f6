use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use overload_core::config::DataConfig;
use overload_core::plan::{build_day_plan, next_session, SETS_PER_EXERCISE};
use overload_core::reconcile::default_profile;
use overload_core::session::ActiveSession;
use overload_core::state::parse_state;
use overload_core::*;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "overload")]
#[command(about = "Progressive-overload strength training tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's plan and open a session draft (default)
    Today {
        /// Train a specific day instead of the next one in the cycle
        #[arg(long)]
        day: Option<String>,

        /// Override the week number
        #[arg(long)]
        week: Option<u32>,

        /// Show the plan without opening a draft
        #[arg(long)]
        dry_run: bool,
    },

    /// Record one set in the open draft
    Record {
        /// Exercise id (e.g. squat)
        exercise: String,

        /// Repetitions performed
        reps: u32,

        /// Set duration in seconds
        #[arg(long, default_value_t = 0)]
        duration: u32,
    },

    /// Close the open draft into the session log
    Finish {
        /// Read the draft from a file instead of the data directory
        #[arg(long)]
        draft: Option<PathBuf>,

        /// Fill every remaining set without prompting
        #[arg(long)]
        auto_complete: bool,

        /// Reps used for auto-completed sets (defaults to each target)
        #[arg(long, requires = "auto_complete")]
        reps: Option<u32>,

        /// Session date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Day key when no draft is open
        #[arg(long)]
        day: Option<String>,
    },

    /// Show week progress and exercise states
    Progress,

    /// List recorded sessions
    History {
        /// Number of sessions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List profiles or switch the active one
    Profile {
        /// Profile to activate
        id: Option<String>,

        /// Clear the session log and settings of the active profile
        #[arg(long)]
        reset: bool,
    },

    /// Show or change settings
    Settings {
        /// Bodyweight of the active profile in kg
        #[arg(long)]
        bodyweight: Option<f64>,

        /// Rest between sets in seconds
        #[arg(long)]
        rest: Option<u32>,

        /// Relay store used by `sync` on this device
        #[arg(long)]
        sync_url: Option<String>,

        /// Program start date of the active profile (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,
    },

    /// Synchronize with a relay store
    Sync {
        /// Relay store path (defaults to the configured one)
        #[arg(long)]
        relay: Option<PathBuf>,
    },

    /// Operate on a relay store directly
    Relay {
        #[command(subcommand)]
        command: RelayCommands,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the current configuration to a file
    Init {
        /// Destination (defaults to the standard config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RelayCommands {
    /// Print the stored snapshot
    Pull {
        #[arg(long)]
        store: PathBuf,
    },

    /// Merge a snapshot into the store and print the result
    Push {
        #[arg(long)]
        store: PathBuf,

        /// Snapshot to push (reads stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

/// Paths and catalog shared by every command
struct Context {
    state_path: PathBuf,
    draft_path: PathBuf,
    relay_path: Option<PathBuf>,
    catalog: &'static ProgramCatalog,
}

fn main() -> Result<()> {
    let config = Config::load()?;
    overload_core::logging::init_with_level(&config.log.level);

    let cli = Cli::parse();

    let catalog = get_default_catalog();
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    let mut data = config.data.clone();
    if let Some(dir) = cli.data_dir {
        data.data_dir = dir;
    }
    let ctx = Context {
        state_path: data.state_path(),
        draft_path: data.draft_path(),
        relay_path: config.sync.relay_path.clone(),
        catalog,
    };

    match cli.command {
        Some(Commands::Today { day, week, dry_run }) => cmd_today(&ctx, day, week, dry_run),
        Some(Commands::Record {
            exercise,
            reps,
            duration,
        }) => cmd_record(&ctx, &exercise, reps, duration),
        Some(Commands::Finish {
            draft,
            auto_complete,
            reps,
            date,
            day,
        }) => cmd_finish(&ctx, draft, auto_complete, reps, date, day),
        Some(Commands::Progress) => cmd_progress(&ctx),
        Some(Commands::History { limit }) => cmd_history(&ctx, limit),
        Some(Commands::Profile { id, reset }) => cmd_profile(&ctx, id, reset),
        Some(Commands::Settings {
            bodyweight,
            rest,
            sync_url,
            start_date,
        }) => cmd_settings(&ctx, bodyweight, rest, sync_url, start_date),
        Some(Commands::Sync { relay }) => cmd_sync(&ctx, relay),
        Some(Commands::Relay { command }) => cmd_relay(&ctx, command),
        Some(Commands::Config { command }) => cmd_config(&config, data, command),
        None => cmd_today(&ctx, None, None, false),
    }
}

fn active_profile<'a>(state: &'a GlobalState) -> Result<&'a Profile> {
    state
        .active_profile()
        .ok_or_else(|| Error::State("No active profile".into()))
}

fn program_for<'a>(catalog: &'a ProgramCatalog, profile: &Profile) -> Result<&'a Program> {
    catalog.get(profile.program_key()).ok_or_else(|| {
        Error::Plan(format!(
            "Profile {} follows unknown program {}",
            profile.id,
            profile.program_key()
        ))
    })
}

/// Start a draft for the active profile
fn open_draft(
    state: &GlobalState,
    catalog: &ProgramCatalog,
    day: Option<String>,
    week: Option<u32>,
    date: NaiveDate,
) -> Result<ActiveSession> {
    let profile = active_profile(state)?;
    let program = program_for(catalog, profile)?;

    let (next_day, current_week) = next_session(program, &profile.progress)
        .ok_or_else(|| Error::Plan(format!("Program {} has no training days", program.id)))?;
    let day_key = day.unwrap_or_else(|| next_day.to_string());
    let week_number = week.unwrap_or(current_week);

    let plan = build_day_plan(
        program,
        &day_key,
        week_number,
        &profile.exercise_states,
        &profile.sessions,
        profile.settings.bodyweight_kg,
    );

    Ok(ActiveSession {
        profile_id: profile.id.clone(),
        draft: start_session(
            plan,
            &day_key,
            week_number,
            SETS_PER_EXERCISE,
            date,
            Utc::now().timestamp_millis(),
        ),
    })
}

fn cmd_today(ctx: &Context, day: Option<String>, week: Option<u32>, dry_run: bool) -> Result<()> {
    let state = GlobalState::load(&ctx.state_path, ctx.catalog)?;
    let profile = active_profile(&state)?;

    if day.is_none() && week.is_none() {
        let saved = ActiveSession::load(&ctx.draft_path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable draft {:?}: {}", ctx.draft_path, e);
            None
        });
        if let Some(active) = saved {
            let in_progress = active.draft.exercises.iter().any(|e| !e.sets.is_empty());
            if active.profile_id == profile.id && in_progress {
                println!("Session in progress:");
                display_draft(&active.draft);
                return Ok(());
            }
        }
    }

    let active = open_draft(&state, ctx.catalog, day, week, Local::now().date_naive())?;
    display_draft(&active.draft);

    if active.draft.exercises.is_empty() {
        println!("  Rest day - nothing planned for {}", active.draft.day_key);
        return Ok(());
    }

    if dry_run {
        println!("\n[Dry run - no draft opened]");
        return Ok(());
    }

    active.save(&ctx.draft_path)?;
    println!("Record sets with `overload record <exercise> <reps>`, then `overload finish`.");
    Ok(())
}

fn cmd_record(ctx: &Context, exercise: &str, reps: u32, duration: u32) -> Result<()> {
    let mut active = ActiveSession::load(&ctx.draft_path)?.ok_or_else(|| {
        Error::State("No session in progress - run `overload today` first".into())
    })?;

    active.draft.record_set(exercise, reps, duration)?;
    active.save(&ctx.draft_path)?;

    match active.draft.current_exercise() {
        Some(next) => println!(
            "✓ Set recorded. Next: {} ({}/{} sets)",
            next.planned.name,
            next.sets.len() + 1,
            active.draft.sets_per_exercise
        ),
        None => println!("✓ Set recorded. All sets done - run `overload finish`."),
    }
    Ok(())
}

fn cmd_finish(
    ctx: &Context,
    draft_path: Option<PathBuf>,
    auto_complete: bool,
    reps: Option<u32>,
    date: Option<NaiveDate>,
    day: Option<String>,
) -> Result<()> {
    let state = GlobalState::load(&ctx.state_path, ctx.catalog)?;
    let source = draft_path.clone().unwrap_or_else(|| ctx.draft_path.clone());

    let mut active = match ActiveSession::load(&source)? {
        Some(active) => active,
        None if draft_path.is_some() => {
            return Err(Error::State(format!("Draft file {:?} not found", source)));
        }
        None => open_draft(
            &state,
            ctx.catalog,
            day,
            None,
            date.unwrap_or_else(|| Local::now().date_naive()),
        )?,
    };
    if active.profile_id.is_empty() {
        active.profile_id = active_profile(&state)?.id.clone();
    }
    if let Some(date) = date {
        active.draft.date = date;
    }

    if auto_complete {
        active.draft.complete_all(reps);
    } else {
        prompt_remaining_sets(&mut active.draft)?;
    }

    let profile_id = active.profile_id.clone();
    let catalog = ctx.catalog;
    let updated = GlobalState::update(&ctx.state_path, catalog, |state| {
        let profile = state
            .profiles
            .get(&profile_id)
            .ok_or_else(|| Error::State(format!("Unknown profile {}", profile_id)))?;
        let program = program_for(catalog, profile)?;
        let finished = finish_session(
            profile,
            program,
            &active.draft,
            Utc::now().timestamp_millis(),
        )?;
        state.profiles.insert(profile_id.clone(), finished);
        Ok(())
    })?;

    if draft_path.is_none() {
        ActiveSession::discard(&ctx.draft_path)?;
    }

    println!("\n✓ Session logged!");
    if let Some(profile) = updated.profiles.get(&profile_id) {
        if let Some(record) = profile.sessions.iter().find(|s| s.id == active.draft.id) {
            for exercise in &record.exercises {
                let mark = if exercise.success { "✓" } else { "✗" };
                let next = profile
                    .exercise_states
                    .get(&exercise.id)
                    .map(|state| format!("next {} kg x {}", state.weight_kg, state.target_reps))
                    .unwrap_or_default();
                println!("  {} {:<28} {}", mark, exercise.name, next);
            }
        }
        println!("  Week {}", profile.progress.current_week_number);
    }
    Ok(())
}

fn cmd_progress(ctx: &Context) -> Result<()> {
    let state = GlobalState::load(&ctx.state_path, ctx.catalog)?;
    let profile = active_profile(&state)?;
    let program = program_for(ctx.catalog, profile)?;
    let progress = &profile.progress;

    println!("{} - {}", profile.name, program.title);
    println!("  Week: {}", progress.current_week_number);
    if let (Some(date), Some(day)) =
        (progress.last_completed_date, &progress.last_completed_day_key)
    {
        println!("  Last session: {} ({})", day, date);
    }
    let remaining: Vec<&str> = program
        .required_days()
        .into_iter()
        .filter(|day| !progress.completed_days.contains(*day))
        .collect();
    println!("  Remaining this week: {}", remaining.join(", "));
    if let Some((day, _)) = next_session(program, progress) {
        println!("  Next: {}", day);
    }

    println!();
    let mut ids: Vec<&String> = program.exercises.keys().collect();
    ids.sort();
    for id in ids {
        if let Some(state) = profile.exercise_states.get(id) {
            let failures = if state.failure_count > 0 {
                format!("  ({} failed)", state.failure_count)
            } else {
                String::new()
            };
            println!(
                "  {:<32} {:>7.2} kg x {}{}",
                id, state.weight_kg, state.target_reps, failures
            );
        }
    }
    Ok(())
}

fn cmd_history(ctx: &Context, limit: usize) -> Result<()> {
    let state = GlobalState::load(&ctx.state_path, ctx.catalog)?;
    let profile = active_profile(&state)?;

    if profile.sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    for session in profile.sessions.iter().rev().take(limit) {
        let on_target = session.exercises.iter().filter(|e| e.success).count();
        println!(
            "{}  {:<9} week {:<3} {} exercises, {} sets, {}/{} on target",
            session.date,
            session.day_key,
            session.week_number,
            session.exercises.len(),
            session.total_sets(),
            on_target,
            session.exercises.len()
        );
    }
    Ok(())
}

fn cmd_profile(ctx: &Context, id: Option<String>, reset: bool) -> Result<()> {
    let catalog = ctx.catalog;
    let state = if id.is_some() || reset {
        GlobalState::update(&ctx.state_path, catalog, |state| {
            if let Some(id) = &id {
                if !state.profiles.contains_key(id) {
                    return Err(Error::State(format!("Unknown profile {}", id)));
                }
                state.active_profile_id = Some(id.clone());
            }
            if reset {
                let profile = active_profile(state)?;
                let program = program_for(catalog, profile)?;
                let mut fresh = default_profile(program);
                fresh.id = profile.id.clone();
                fresh.program_start_date = Some(Local::now().date_naive());
                tracing::info!("Resetting profile {}", fresh.id);
                state.profiles.insert(fresh.id.clone(), fresh);
            }
            Ok(())
        })?
    } else {
        GlobalState::load(&ctx.state_path, catalog)?
    };

    if reset {
        let profile = active_profile(&state)?;
        let stale_draft = ActiveSession::load(&ctx.draft_path)
            .unwrap_or(None)
            .map_or(false, |active| active.profile_id == profile.id);
        if stale_draft {
            ActiveSession::discard(&ctx.draft_path)?;
        }
        println!("✓ Reset {} to program defaults", profile.name);
    }

    for (id, profile) in &state.profiles {
        let marker = if state.active_profile_id.as_deref() == Some(id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<10} {:<12} {} sessions",
            marker,
            id,
            profile.name,
            profile.sessions.len()
        );
    }
    Ok(())
}

fn cmd_settings(
    ctx: &Context,
    bodyweight: Option<f64>,
    rest: Option<u32>,
    sync_url: Option<String>,
    start_date: Option<NaiveDate>,
) -> Result<()> {
    let changed =
        bodyweight.is_some() || rest.is_some() || sync_url.is_some() || start_date.is_some();
    let state = if changed {
        GlobalState::update(&ctx.state_path, ctx.catalog, |state| {
            if let Some(url) = sync_url {
                state.settings.sync_url = url;
            }
            let id = state
                .active_profile_id
                .clone()
                .ok_or_else(|| Error::State("No active profile".into()))?;
            let profile = state
                .profiles
                .get_mut(&id)
                .ok_or_else(|| Error::State(format!("Unknown profile {}", id)))?;
            if let Some(kg) = bodyweight {
                if !kg.is_finite() || kg <= 0.0 {
                    return Err(Error::State(format!("Invalid bodyweight {}", kg)));
                }
                profile.settings.bodyweight_kg = kg;
            }
            if let Some(seconds) = rest {
                profile.settings.rest_seconds = seconds;
            }
            if let Some(date) = start_date {
                profile.program_start_date = Some(date);
            }
            Ok(())
        })?
    } else {
        GlobalState::load(&ctx.state_path, ctx.catalog)?
    };

    let profile = active_profile(&state)?;
    println!("Profile:    {}", profile.name);
    println!("Bodyweight: {} kg", profile.settings.bodyweight_kg);
    println!("Rest:       {} s", profile.settings.rest_seconds);
    match profile.program_start_date {
        Some(date) => println!("Started:    {}", date),
        None => println!("Started:    (not set)"),
    }
    println!("Device:     {}", state.device_id);
    if state.settings.sync_url.is_empty() {
        println!("Sync:       (not configured)");
    } else {
        println!("Sync:       {}", state.settings.sync_url);
    }
    Ok(())
}

fn cmd_sync(ctx: &Context, relay: Option<PathBuf>) -> Result<()> {
    let state = GlobalState::load(&ctx.state_path, ctx.catalog)?;

    let device_url = (!state.settings.sync_url.is_empty())
        .then(|| PathBuf::from(&state.settings.sync_url));
    let relay_path = relay
        .or(device_url)
        .or_else(|| ctx.relay_path.clone())
        .ok_or_else(|| {
            Error::Sync(
                "No relay configured - pass --relay or run `overload settings --sync-url`".into(),
            )
        })?;
    tracing::info!("Syncing {} with relay {:?}", state.device_id, relay_path);

    let transport = FileRelay::new(&relay_path, ctx.catalog);
    match synchronize(&state, &transport, ctx.catalog, Utc::now().timestamp_millis()) {
        SyncOutcome::Synced { state, pushed } => {
            state.save(&ctx.state_path)?;
            let sessions: usize = state.profiles.values().map(|p| p.sessions.len()).sum();
            let how = if pushed { "pushed" } else { "up to date" };
            println!(
                "✓ Synced with {} ({}, {} sessions)",
                relay_path.display(),
                how,
                sessions
            );
            Ok(())
        }
        SyncOutcome::Failed { reason } => {
            eprintln!("Sync failed: {}", reason);
            Err(Error::Sync(reason))
        }
    }
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut contents = String::new();
            io::stdin().read_to_string(&mut contents)?;
            Ok(contents)
        }
    }
}

fn cmd_relay(ctx: &Context, command: RelayCommands) -> Result<()> {
    match command {
        RelayCommands::Pull { store } => {
            let relay = FileRelay::new(store, ctx.catalog);
            match relay.pull()? {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("null"),
            }
        }
        RelayCommands::Push { store, input } => {
            let contents = read_input(input.as_deref())?;
            let candidate = parse_state(&contents, ctx.catalog)?;
            let relay = FileRelay::new(store, ctx.catalog);
            let merged = relay.push(&candidate)?;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
    }
    Ok(())
}

fn cmd_config(config: &Config, data: DataConfig, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Init { path, force } => {
            let path = path.unwrap_or_else(Config::default_config_path);
            if path.exists() && !force {
                return Err(Error::Config(format!(
                    "{:?} already exists - pass --force to overwrite",
                    path
                )));
            }
            let mut config = config.clone();
            config.data = data;
            config.save_to(&path)?;
            println!("✓ Wrote {}", path.display());
        }
    }
    Ok(())
}

fn display_weight(exercise: &PlannedExercise) -> String {
    if exercise.uses_bodyweight {
        if exercise.weight_kg > 0.0 {
            format!("bodyweight + {} kg", exercise.weight_kg)
        } else {
            "bodyweight".to_string()
        }
    } else if exercise.weight_kg > 0.0 {
        format!("{} kg", exercise.weight_kg)
    } else {
        "-".to_string()
    }
}

fn display_draft(draft: &SessionDraft) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {} - WEEK {}", draft.day_key.to_uppercase(), draft.week_number);
    println!("╰─────────────────────────────────────────╯");
    println!();

    for exercise in &draft.exercises {
        let planned = &exercise.planned;
        println!("  {} [{}]", planned.name, planned.id);
        println!(
            "  → {} x {} reps x {} sets  ({}/{} done)",
            display_weight(planned),
            planned.target_reps,
            draft.sets_per_exercise,
            exercise.sets.len(),
            draft.sets_per_exercise
        );
        println!();
    }
}

fn prompt_remaining_sets(draft: &mut SessionDraft) -> Result<()> {
    while let Some(exercise) = draft.current_exercise() {
        let id = exercise.planned.id.clone();
        let target = exercise.planned.target_reps;
        print!(
            "{} set {}/{} - reps [{}]: ",
            exercise.planned.name,
            exercise.sets.len() + 1,
            draft.sets_per_exercise,
            target
        );
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // stdin closed; keep what was recorded
            break;
        }
        let reps = match input.trim() {
            "" => target,
            text => text
                .parse()
                .map_err(|_| Error::Other(format!("Not a rep count: {}", text)))?,
        };
        draft.record_set(&id, reps, 0)?;
    }
    Ok(())
}
