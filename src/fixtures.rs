//! Seed data shared by the in-memory store tests.

use crate::model::{
    AssessmentDescriptor, Attempt, AttemptId, AttemptState, CourseRecord, GradingBehaviour,
    GradingState, GradingStep, QuestionAttempt, StepAnnotation, StepId, UserId, UserRecord,
};
use crate::store::SqliteStore;

pub const GRADER_ROLE: i64 = 11;
pub const LEARNER: UserId = 3;
pub const GRADER: UserId = 7;
pub const ADMIN: UserId = 2;
pub const COURSE: i64 = 9;
pub const ASSESSMENT: i64 = 5;
pub const NOW: i64 = 1_700_100_000;

/// Store with a learner, a grader (holding the grader role), an admin and one course.
pub fn store() -> SqliteStore {
    let store = SqliteStore::in_memory(GRADER_ROLE).unwrap();
    for (id, name) in [(LEARNER, "learner"), (GRADER, "grader"), (ADMIN, "admin")] {
        store
            .insert_user(&UserRecord {
                id,
                idnumber: format!("EXT-{id}"),
                username: name.into(),
                firstname: name.into(),
                lastname: "Example".into(),
                email: format!("{name}@example.org"),
                suspended: false,
            })
            .unwrap();
    }
    store.assign_role(GRADER, GRADER_ROLE).unwrap();
    store
        .insert_course(&CourseRecord {
            id: COURSE,
            idnumber: "CRS-9".into(),
            shortname: "FA101".into(),
            fullname: "First Aid Fundamentals".into(),
        })
        .unwrap();
    store
}

pub fn assessment(store: &SqliteStore, name: &str, behaviour: GradingBehaviour) -> AssessmentDescriptor {
    let assessment = AssessmentDescriptor {
        id: ASSESSMENT,
        course_id: COURSE,
        name: name.into(),
        max_score: 10.0,
        behaviour,
    };
    store.insert_assessment(&assessment).unwrap();
    assessment
}

pub fn attempt(
    store: &SqliteStore,
    id: AttemptId,
    number: u32,
    state: AttemptState,
    score: Option<f64>,
) -> Attempt {
    let attempt = Attempt {
        id,
        assessment_id: ASSESSMENT,
        learner_id: LEARNER,
        number,
        usage_id: id * 10,
        state,
        score,
        preview: false,
        time_start: 1_700_000_000 + id,
        time_finish: 1_700_000_500 + id,
        time_modified: 1_700_000_600 + id,
    };
    store.insert_attempt(&attempt).unwrap();
    attempt
}

pub fn question(
    store: &SqliteStore,
    attempt: &Attempt,
    id: i64,
    question_id: i64,
    slot: u32,
) -> QuestionAttempt {
    let question = QuestionAttempt {
        id,
        usage_id: attempt.usage_id,
        question_id,
        slot,
        behaviour: "manualgraded".into(),
    };
    store.insert_question_attempt(&question).unwrap();
    question
}

pub fn step(
    store: &SqliteStore,
    id: StepId,
    question_attempt_id: i64,
    sequence: u32,
    state: GradingState,
    time_created: i64,
) -> GradingStep {
    let fraction = match state {
        GradingState::ManuallyGradedCorrect => Some(1.0),
        GradingState::ManuallyGradedIncorrect => Some(0.0),
        _ => None,
    };
    let step = GradingStep {
        id,
        question_attempt_id,
        sequence,
        state,
        fraction,
        time_created,
        user_id: GRADER,
    };
    store.insert_step(&step).unwrap();
    step
}

pub fn annotate(store: &SqliteStore, step_id: StepId, name: &str, value: &str) {
    store
        .annotate_step(step_id, &StepAnnotation::new(name, value))
        .unwrap();
}
