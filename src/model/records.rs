use std::fmt;

use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type CourseId = i64;
pub type AssessmentId = i64;
pub type AttemptId = i64;
pub type QuestionAttemptId = i64;
pub type StepId = i64;
pub type CompletionId = i64;

/// Tolerance used when comparing stored decimal grades.
const SCORE_EPSILON: f64 = 1e-7;

pub fn scores_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < SCORE_EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptState {
    InProgress,
    Finished,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::InProgress => "inprogress",
            AttemptState::Finished => "finished",
        }
    }

    /// Anything other than `finished` is treated as still being answered.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "finished" => AttemptState::Finished,
            _ => AttemptState::InProgress,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One learner's sitting of an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub assessment_id: AssessmentId,
    pub learner_id: UserId,
    /// 1-based, sequential per (assessment, learner).
    pub number: u32,
    /// Groups the question attempts that belong to this attempt.
    pub usage_id: i64,
    pub state: AttemptState,
    pub score: Option<f64>,
    pub preview: bool,
    pub time_start: i64,
    pub time_finish: i64,
    pub time_modified: i64,
}

impl Attempt {
    pub fn is_resit(&self) -> bool {
        self.number > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingBehaviour {
    DeferredFeedback,
    Other,
}

impl GradingBehaviour {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "deferredfeedback" => GradingBehaviour::DeferredFeedback,
            _ => GradingBehaviour::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GradingBehaviour::DeferredFeedback => "deferredfeedback",
            GradingBehaviour::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDescriptor {
    pub id: AssessmentId,
    pub course_id: CourseId,
    pub name: String,
    pub max_score: f64,
    pub behaviour: GradingBehaviour,
}

impl AssessmentDescriptor {
    pub fn is_deferred_feedback(&self) -> bool {
        self.behaviour == GradingBehaviour::DeferredFeedback
    }

    pub fn is_full_score(&self, score: f64) -> bool {
        scores_equal(score, self.max_score)
    }
}

/// A learner's completion row for one assessment, as the platform records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCompletion {
    pub id: CompletionId,
    pub assessment_id: AssessmentId,
    pub learner_id: UserId,
    pub state: i64,
    pub time_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    /// External identifier known to the records service.
    pub idnumber: String,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: CourseId,
    pub idnumber: String,
    pub shortname: String,
    pub fullname: String,
}

/// Grading state of a single step. Unrecognised tags are kept as `Unknown`
/// and never match any of the known states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingState {
    NeedsGrading,
    ManuallyGradedCorrect,
    ManuallyGradedIncorrect,
    Unknown(String),
}

impl GradingState {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "needsgrading" => GradingState::NeedsGrading,
            "mangrright" => GradingState::ManuallyGradedCorrect,
            "mangrwrong" => GradingState::ManuallyGradedIncorrect,
            other => GradingState::Unknown(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            GradingState::NeedsGrading => "needsgrading",
            GradingState::ManuallyGradedCorrect => "mangrright",
            GradingState::ManuallyGradedIncorrect => "mangrwrong",
            GradingState::Unknown(tag) => tag,
        }
    }

    /// A human grader has decided this step.
    pub fn is_manual_decision(&self) -> bool {
        matches!(
            self,
            GradingState::ManuallyGradedCorrect | GradingState::ManuallyGradedIncorrect
        )
    }
}

/// A question as attempted inside one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAttempt {
    pub id: QuestionAttemptId,
    pub usage_id: i64,
    pub question_id: i64,
    pub slot: u32,
    /// Grading behaviour of the question, e.g. `manualgraded`.
    pub behaviour: String,
}

impl QuestionAttempt {
    pub fn is_manually_graded(&self) -> bool {
        self.behaviour == "manualgraded"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingStep {
    pub id: StepId,
    pub question_attempt_id: QuestionAttemptId,
    pub sequence: u32,
    pub state: GradingState,
    pub fraction: Option<f64>,
    pub time_created: i64,
    pub user_id: UserId,
}

pub const COMMENT: &str = "-comment";
pub const COMMENT_FORMAT: &str = "-commentformat";
pub const MARK: &str = "-mark";
pub const MAX_MARK: &str = "-maxmark";

/// Name/value data attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAnnotation {
    pub name: String,
    pub value: String,
}

impl StepAnnotation {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}
