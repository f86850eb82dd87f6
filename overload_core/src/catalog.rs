//! Built-in program catalog.
//!
//! Each athlete profile follows one program. The `jacob` program is derived
//! from a shared base program; `mari` is a separate machine-focused program.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Profile selected when nothing else is known
pub const DEFAULT_PROFILE_ID: &str = "jacob";

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<ProgramCatalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static ProgramCatalog {
    &DEFAULT_CATALOG
}

/// All programs known to this build, in profile display order
#[derive(Clone, Debug)]
pub struct ProgramCatalog {
    programs: Vec<Program>,
}

impl ProgramCatalog {
    pub fn new(programs: Vec<Program>) -> Self {
        Self { programs }
    }

    /// Look up a program by id
    pub fn get(&self, program_id: &str) -> Option<&Program> {
        self.programs.iter().find(|program| program.id == program_id)
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// Validate the catalog for internal consistency
    ///
    /// Returns a list of validation errors (empty if valid)
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for program in &self.programs {
            for day in &program.training_days {
                if !program.day_templates.contains_key(day) {
                    errors.push(format!("{}: training day '{}' has no template", program.id, day));
                }
            }

            for (day, template) in &program.day_templates {
                for exercise_id in template {
                    if program.exercise(exercise_id).is_none() {
                        errors.push(format!(
                            "{}: day '{}' references unknown exercise '{}'",
                            program.id, day, exercise_id
                        ));
                    }
                }
            }

            for definition in program.exercises.values() {
                if definition.increment_kg < 0.0 || definition.start_weight_kg < 0.0 {
                    errors.push(format!(
                        "{}: exercise '{}' has a negative weight setting",
                        program.id, definition.id
                    ));
                }
                if let Some(max) = definition.max_weight_kg {
                    if definition.start_weight_kg > max {
                        errors.push(format!(
                            "{}: exercise '{}' starts above its cap",
                            program.id, definition.id
                        ));
                    }
                }
            }

            if let Some(progression) = &program.bodyweight_progression {
                for id in [
                    &progression.pulldown_id,
                    &progression.pull_id,
                    &progression.negative_id,
                ] {
                    if program.exercise(id).is_none() {
                        errors.push(format!(
                            "{}: bodyweight progression references unknown exercise '{}'",
                            program.id, id
                        ));
                    }
                }
            }
        }

        errors
    }
}

/// Builds the catalog with the built-in programs
pub fn build_default_catalog() -> ProgramCatalog {
    ProgramCatalog::new(vec![jacob_program(), mari_program()])
}

// ============================================================================
// Definition helpers
// ============================================================================

fn lift(
    id: &str,
    name: &str,
    equipment: Equipment,
    increment_kg: f64,
    start_weight_kg: f64,
    description: &str,
) -> ExerciseDefinition {
    ExerciseDefinition {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        equipment,
        increment_kg,
        start_weight_kg,
        max_weight_kg: None,
        uses_bodyweight: false,
        fixed_target_reps: None,
    }
}

fn capped(mut definition: ExerciseDefinition, max_weight_kg: f64) -> ExerciseDefinition {
    definition.max_weight_kg = Some(max_weight_kg);
    definition
}

fn fixed_reps(mut definition: ExerciseDefinition, reps: u32) -> ExerciseDefinition {
    definition.fixed_target_reps = Some(reps);
    definition
}

fn bodyweight(mut definition: ExerciseDefinition) -> ExerciseDefinition {
    definition.uses_bodyweight = true;
    definition
}

fn library(definitions: Vec<ExerciseDefinition>) -> HashMap<String, ExerciseDefinition> {
    definitions
        .into_iter()
        .map(|definition| (definition.id.clone(), definition))
        .collect()
}

fn templates(days: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    days.iter()
        .map(|(day, ids)| {
            (
                day.to_string(),
                ids.iter().map(|id| id.to_string()).collect(),
            )
        })
        .collect()
}

fn cycle(days: &[&str]) -> Vec<String> {
    days.iter().map(|day| day.to_string()).collect()
}

fn mobility_drills() -> Vec<ExerciseDefinition> {
    vec![
        fixed_reps(
            lift(
                "mobility_hips",
                "Hip Mobility Flow",
                Equipment::Mobility,
                0.0,
                0.0,
                "Slow, controlled hip circles and openers. Breathe and stay smooth.",
            ),
            8,
        ),
        fixed_reps(
            lift(
                "mobility_shoulders",
                "Shoulder CARs",
                Equipment::Mobility,
                0.0,
                0.0,
                "Largest possible shoulder circles, very slow, torso still.",
            ),
            6,
        ),
        fixed_reps(
            lift(
                "mobility_core",
                "Dead Bug",
                Equipment::Mobility,
                0.0,
                0.0,
                "Low back pressed down, extend opposite arm and leg under control.",
            ),
            10,
        ),
    ]
}

// ============================================================================
// Base program
// ============================================================================

fn base_exercises() -> Vec<ExerciseDefinition> {
    #[rustfmt::skip]
    let mut exercises = vec![
        lift("squat", "Back Squat", Equipment::Barbell, 5.0, 94.0,
            "Bar on upper back, brace, sit down between the heels, drive up through mid-foot."),
        lift("bench", "Bench Press", Equipment::Barbell, 2.5, 62.0,
            "Shoulder blades pinned, lower to mid-chest with elbows near 45 degrees, press up and back."),
        lift("overhead_press", "Overhead Press", Equipment::Barbell, 2.5, 32.0,
            "Wrists stacked, glutes tight, press straight up and push the head through at the top."),
        lift("floor_press", "Floor Press (DB)", Equipment::Dumbbell, 2.0, 24.0,
            "Upper arms touch the floor each rep, press with control, no bouncing."),
        lift("incline_db_press", "Incline DB Press", Equipment::Dumbbell, 2.0, 24.0,
            "Bench at 20-30 degrees, lower to the upper chest, press up and slightly back."),
        lift("smith_incline_press", "Smith Incline Press", Equipment::Smith, 2.5, 50.0,
            "Bench at 20-30 degrees, wrists stacked, bar path to the upper chest."),
        lift("close_grip_bench", "Close-Grip Bench Press", Equipment::Barbell, 2.5, 60.0,
            "Hands just inside shoulder width, elbows tucked, lower to the lower chest."),
        lift("skullcrusher", "Skullcrusher", Equipment::Barbell, 1.25, 20.8,
            "Elbows still, lower toward the forehead, extend hard without flaring."),
        lift("tricep_pushdown", "Tricep Pushdown", Equipment::Cable, 1.25, 12.0,
            "Elbows pinned to the ribs, press down fully, slow return."),
        lift("cable_lateral_raise", "Cable Lateral Raise", Equipment::Cable, 1.25, 6.0,
            "Soft elbow, raise to shoulder height, lower slowly to keep tension."),
        capped(
            lift("leg_press", "Leg Press", Equipment::Machine, 5.0, 70.0,
                "Feet shoulder-width, lower to about 90 degrees at the knee, never lock out hard."),
            90.0,
        ),
        lift("bulgarian_split_squat", "Bulgarian Split Squat", Equipment::Dumbbell, 2.5, 20.0,
            "Rear foot elevated, front shin near vertical, lower until the thigh is near parallel."),
        lift("deadlift", "Deadlift", Equipment::Barbell, 5.0, 80.0,
            "Bar over mid-foot, brace, push the floor away, keep the bar close on the way down."),
        lift("romanian_deadlift", "Romanian Deadlift", Equipment::Barbell, 5.0, 70.0,
            "Soft knees, hinge the hips back, bar close to the legs, stand tall at the top."),
        lift("lat_pulldown", "Lat Pulldown", Equipment::Machine, 2.5, 28.0,
            "Chest up, pull to the upper chest with elbows down and back, control the return."),
        lift("seated_row", "Seated Row", Equipment::Machine, 2.5, 50.0,
            "Neutral spine, pull to mid-torso, squeeze the shoulder blades."),
        lift("dumbbell_row", "Dumbbell Row", Equipment::Dumbbell, 2.0, 26.0,
            "Back flat on the bench, pull the elbow toward the hip without twisting."),
        lift("cable_row", "Cable Row (Single Arm)", Equipment::Cable, 2.5, 30.0,
            "Cable at mid-torso, pull the elbow toward the hip, control the return."),
        lift("face_pull", "Face Pull (Rope)", Equipment::Cable, 2.5, 20.0,
            "Pull the rope to the eyes with elbows high and out, slow return."),
        lift("preacher_curl", "Preacher Curl", Equipment::Machine, 1.25, 20.0,
            "Upper arms fixed on the pad, curl without shoulder swing, full extension."),
        lift("hammer_curl", "Hammer Curl (DB)", Equipment::Dumbbell, 1.25, 18.0,
            "Neutral grip, elbows at the sides, pause at the top, lower slowly."),
        lift("overhead_cable_extension", "Overhead Cable Extension", Equipment::Cable, 1.25, 14.0,
            "Elbows in, extend fully, ribcage down, slow return."),
        bodyweight(lift("pullup", "Pull-up", Equipment::Bodyweight, 1.25, 0.0,
            "Dead hang, brace, pull the chest to the bar, lower slowly to a full hang.")),
        fixed_reps(
            bodyweight(lift("pullup_negative", "Pull-up Negative", Equipment::Bodyweight, 0.0, 0.0,
                "Start at the top, lower slowly for 3-5 seconds, stay tight.")),
            3,
        ),
    ];
    exercises.extend(mobility_drills());
    exercises
}

fn base_templates() -> HashMap<String, Vec<String>> {
    templates(&[
        ("Push A", &[
            "squat", "bench", "overhead_press", "incline_db_press",
            "cable_lateral_raise", "tricep_pushdown",
        ]),
        ("Push B", &[
            "bulgarian_split_squat", "close_grip_bench", "smith_incline_press",
            "overhead_press", "cable_lateral_raise", "skullcrusher", "tricep_pushdown",
        ]),
        ("Pull A", &[
            "deadlift", "lat_pulldown", "cable_row", "seated_row", "face_pull", "preacher_curl",
        ]),
        ("Pull B", &[
            "deadlift", "lat_pulldown", "seated_row", "cable_row", "face_pull", "hammer_curl",
        ]),
        (MOBILITY_DAY, &["mobility_hips", "mobility_shoulders", "mobility_core"]),
    ])
}

/// Upper-body strength cycle: the base program with a barbell row and
/// hypertrophy rep targets on the accessories
fn jacob_program() -> Program {
    let mut exercises = library(base_exercises());
    exercises.insert(
        "barbell_row".into(),
        lift("barbell_row", "Barbell Row", Equipment::Barbell, 2.5, 50.0,
            "Hips back to about 45 degrees, neutral spine, pull to the lower chest."),
    );

    let mut day_templates = base_templates();
    for day in ["Pull A", "Pull B"] {
        if let Some(template) = day_templates.get_mut(day) {
            for slot in template.iter_mut().filter(|id| id.as_str() == "seated_row") {
                *slot = "barbell_row".into();
            }
        }
    }

    let hypertrophy: [(&str, u32, Option<f64>); 10] = [
        ("incline_db_press", 10, None),
        ("smith_incline_press", 10, Some(35.0)),
        ("cable_lateral_raise", 15, Some(4.0)),
        ("tricep_pushdown", 12, Some(10.0)),
        ("skullcrusher", 12, Some(15.0)),
        ("face_pull", 15, Some(15.0)),
        ("preacher_curl", 12, Some(15.0)),
        ("hammer_curl", 12, Some(12.0)),
        ("cable_row", 12, Some(20.0)),
        ("bulgarian_split_squat", 10, Some(16.0)),
    ];
    for (id, reps, start_weight_kg) in hypertrophy {
        if let Some(definition) = exercises.get_mut(id) {
            definition.fixed_target_reps = Some(reps);
            if let Some(start) = start_weight_kg {
                definition.start_weight_kg = start;
            }
        }
    }

    Program {
        id: "jacob".into(),
        name: "Jacob".into(),
        title: "Upper-Body Strength Cycle".into(),
        training_days: cycle(&["Push A", "Pull A", MOBILITY_DAY, "Push B", "Pull B"]),
        exercises,
        day_templates,
        default_settings: ProfileSettings {
            bodyweight_kg: 105.0,
            rest_seconds: 90,
        },
        bodyweight_progression: Some(BodyweightProgression {
            pulldown_id: "lat_pulldown".into(),
            pull_id: "pullup".into(),
            negative_id: "pullup_negative".into(),
        }),
    }
}

// ============================================================================
// Mari
// ============================================================================

/// Full-body toning on machines, cables and dumbbells
fn mari_program() -> Program {
    #[rustfmt::skip]
    let mut exercises = vec![
        capped(
            lift("leg_press", "Leg Press", Equipment::Machine, 5.0, 65.0,
                "Back flat on the pad, lower until the knees are near the chest, push through the heels."),
            90.0,
        ),
        lift("chest_press_machine", "Chest Press Machine", Equipment::Machine, 2.5, 25.0,
            "Handles at mid-chest height, press out, return slowly without letting the stack touch."),
        lift("ohp_machine", "Overhead Press (Machine)", Equipment::Machine, 2.5, 20.0,
            "Handles at chin height, press overhead, keep the shoulders down."),
        lift("smith_bench_press", "Smith Bench Press", Equipment::Smith, 2.5, 30.0,
            "Bar over the nipple line, lower gently to the chest and press back up."),
        lift("seated_db_shoulder_press", "Seated DB Shoulder Press", Equipment::Dumbbell, 2.0, 10.0,
            "Back supported, press from ear level until the dumbbells almost touch."),
        lift("dumbbell_lateral_raise", "Dumbbell Lateral Raise", Equipment::Dumbbell, 1.0, 6.0,
            "Slight elbow bend, lead with the elbows to shoulder height, no swinging."),
        lift("cable_triceps_pressdown", "Cable Triceps Pressdown", Equipment::Cable, 1.25, 12.0,
            "Elbows glued to the sides, straighten the arms fully, slow return."),
        lift("cable_overhead_triceps_extension", "Cable Overhead Triceps Extension", Equipment::Cable, 1.25, 10.0,
            "Face away from the stack, extend forward and up, elbows close to the head."),
        lift("lat_pulldown", "Lat Pulldown Machine", Equipment::Machine, 2.5, 25.0,
            "Thighs locked under the pads, pull to the collarbone driving the elbows down."),
        lift("seated_cable_row", "Seated Cable Row", Equipment::Cable, 2.5, 30.0,
            "Tall neutral spine, pull to the belly button, squeeze the shoulder blades."),
        lift("dumbbell_rdl", "Dumbbell RDL (Romanian Deadlift)", Equipment::Dumbbell, 2.5, 20.0,
            "Hinge at the hips, slide the dumbbells down the legs, back flat, stand with the glutes."),
        lift("cable_face_pull", "Cable Face Pull", Equipment::Cable, 1.25, 12.0,
            "Rope to the eyes, elbows back and out, finish in a double-biceps position."),
        lift("straight_arm_pulldown", "Straight-Arm Cable Pulldown", Equipment::Cable, 1.25, 12.0,
            "Arms locked nearly straight, sweep the bar down to the thighs, return to eye level."),
        lift("one_arm_cable_row", "One-Arm Cable Row", Equipment::Cable, 2.5, 20.0,
            "Pull the elbow past the body, let the torso rotate slightly on the stretch."),
        lift("smith_rdl", "Smith Machine RDL", Equipment::Smith, 5.0, 40.0,
            "Hips back while the bar slides down the thighs, back flat, drive the hips forward."),
        lift("dumbbell_biceps_curl", "Dumbbell Biceps Curl", Equipment::Dumbbell, 1.0, 8.0,
            "Elbows by the ribs, curl up, three seconds down, no swinging."),
        lift("smith_squat_box", "Smith Squat to Box", Equipment::Smith, 5.0, 30.0,
            "Feet slightly forward, sit back until touching the box, stand back up."),
        lift("cable_chest_fly", "Cable Chest Fly", Equipment::Cable, 1.25, 10.0,
            "Pulleys at chest height, hug a big tree, open slowly to a chest stretch."),
        lift("cable_rear_delt_fly", "Cable Rear-Delt Fly", Equipment::Cable, 1.25, 8.0,
            "Criss-cross the cables, pull the hands apart and back with nearly straight arms."),
        capped(
            lift("leg_press_calf", "Leg Press Calf Press", Equipment::Machine, 5.0, 65.0,
                "Balls of the feet on the platform edge, deep stretch, press up to the toes."),
            90.0,
        ),
        lift("dumbbell_shrug", "Dumbbell Shrug", Equipment::Dumbbell, 2.5, 16.0,
            "Shrug straight up, hold a second, lower slowly without rolling."),
        lift("hammer_curl", "Hammer Curl", Equipment::Dumbbell, 1.0, 10.0,
            "Palms facing each other, elbows fixed, curl and lower with control."),
    ];
    exercises.extend(mobility_drills());

    Program {
        id: "mari".into(),
        name: "Mari".into(),
        title: "Full-Body Toning".into(),
        training_days: cycle(&["Push A", "Pull A", MOBILITY_DAY, "Push B", "Pull B"]),
        exercises: library(exercises),
        day_templates: templates(&[
            ("Push A", &[
                "leg_press", "chest_press_machine", "ohp_machine",
                "cable_triceps_pressdown", "smith_squat_box", "leg_press_calf",
            ]),
            ("Pull A", &[
                "lat_pulldown", "seated_cable_row", "dumbbell_rdl",
                "cable_face_pull", "straight_arm_pulldown", "dumbbell_shrug",
            ]),
            ("Push B", &[
                "leg_press", "smith_bench_press", "seated_db_shoulder_press",
                "dumbbell_lateral_raise", "cable_chest_fly", "cable_overhead_triceps_extension",
            ]),
            ("Pull B", &[
                "lat_pulldown", "one_arm_cable_row", "smith_rdl",
                "dumbbell_biceps_curl", "cable_rear_delt_fly", "hammer_curl",
            ]),
            (MOBILITY_DAY, &["mobility_hips", "mobility_shoulders", "mobility_core"]),
        ]),
        default_settings: ProfileSettings {
            bodyweight_kg: 65.0,
            rest_seconds: 90,
        },
        // No pull-up variants in this program
        bodyweight_progression: None,
    }
}
