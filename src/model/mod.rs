mod allowance;
mod grading;
mod outbox;
mod queue;
mod records;

pub use allowance::{AllowanceChange, OverrideAllowance};
pub use grading::{AnnotatedStep, AttemptGrading, QuestionGrading, SynthesizedStep};
pub use outbox::{DedupKey, DeliveryType, OutboxRecord, OutboxStatus};
pub use queue::{AssessorQueueEntry, QueueObservation, QueueState, QueueStateMachine, QueueTransition};
pub use records::{
    ActivityCompletion, AssessmentDescriptor, AssessmentId, Attempt, AttemptId, AttemptState,
    COMMENT, COMMENT_FORMAT, CompletionId, CourseId, CourseRecord, GradingBehaviour, GradingState,
    GradingStep, MARK, MAX_MARK, QuestionAttempt, QuestionAttemptId, StepAnnotation, StepId,
    UserId, UserRecord, scores_equal,
};
