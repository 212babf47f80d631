use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Why an event stopped short of delivery.
///
/// None of these are faults: each is detected and absorbed by the component
/// that sees it, logged, and reported back so the event source is never blocked.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum SkipReason {
    /// One or more required event keys were absent.
    IncompleteEvent { missing: Vec<String> },
    /// The event name is not one this bridge handles.
    UnsupportedEvent(String),
    /// A referenced learner/course/assessment/attempt does not exist.
    EntityNotFound { entity: &'static str, id: i64 },
    /// Preview attempts never leave the platform.
    PreviewAttempt,
    /// The attempt is still being answered.
    AttemptInProgress,
    /// Finished, but no aggregate score has been recorded yet.
    NotYetGraded,
    /// Suspended learners are excluded by policy.
    SuspendedLearner,
    /// The event's subject is not the learner who owns the referenced record.
    SubjectMismatch { subject: i64, owner: i64 },
    /// The learner or course has no external id to address the record with.
    MissingExternalId { entity: &'static str, id: i64 },
    /// The learner was already credited outside the platform.
    PriorLearningCredit,
    /// Completion of a deferred-feedback activity travels with its grading instead.
    DeferredFeedbackActivity,
    /// A completion names no finished attempt to report against.
    NoFinishedAttempt,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::IncompleteEvent { missing } => {
                write!(f, "incomplete event (missing: {})", missing.join(", "))
            }
            SkipReason::UnsupportedEvent(name) => write!(f, "unsupported event: {name}"),
            SkipReason::EntityNotFound { entity, id } => write!(f, "{entity} {id} not found"),
            SkipReason::PreviewAttempt => write!(f, "preview attempt"),
            SkipReason::AttemptInProgress => write!(f, "attempt in progress"),
            SkipReason::NotYetGraded => write!(f, "attempt not yet graded"),
            SkipReason::SuspendedLearner => write!(f, "learner suspended"),
            SkipReason::SubjectMismatch { subject, owner } => {
                write!(f, "event is about user {subject} but the record belongs to {owner}")
            }
            SkipReason::MissingExternalId { entity, id } => {
                write!(f, "{entity} {id} has no external id")
            }
            SkipReason::PriorLearningCredit => write!(f, "already credited through prior learning"),
            SkipReason::DeferredFeedbackActivity => write!(f, "deferred-feedback activity"),
            SkipReason::NoFinishedAttempt => write!(f, "no finished attempt"),
        }
    }
}
