use std::fmt;

use serde::{Deserialize, Serialize};

use super::records::{AttemptId, UserId};

/// Lifecycle of an assessor-queue entry. Only `Pending -> Finished` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    Pending,
    Finished,
}

impl QueueState {
    pub fn code(&self) -> i64 {
        match self {
            QueueState::Pending => 0,
            QueueState::Finished => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(QueueState::Pending),
            1 => Some(QueueState::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueState::Pending => write!(f, "PENDING"),
            QueueState::Finished => write!(f, "FINISHED"),
        }
    }
}

/// Tracks which grader is working an attempt. At most one per attempt id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessorQueueEntry {
    pub attempt_id: AttemptId,
    pub prior_attempt_id: Option<AttemptId>,
    pub assignee: Option<UserId>,
    /// Attempt number at the time the entry was opened.
    pub attempt_number: u32,
    pub state: QueueState,
    pub time_start: i64,
    pub time_finish: Option<i64>,
}

/// What the queue manager learned about an attempt while handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueObservation {
    pub actor: UserId,
    pub actor_is_grader: bool,
    /// At least one question carries a manual grading decision.
    pub has_manual_decision: bool,
    /// The attempt has an aggregate score.
    pub graded: bool,
    pub resolved_prior: Option<AttemptId>,
}

/// The result of evaluating the queue state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QueueTransition {
    /// Untracked -> PENDING.
    Open {
        assignee: Option<UserId>,
        prior_attempt_id: Option<AttemptId>,
    },
    /// PENDING -> FINISHED, reassigned to whoever completed the grading.
    Finish { assignee: UserId },
    /// Still PENDING; the stored prior attempt is stale.
    ReconcilePrior { prior_attempt_id: AttemptId },
    Unchanged,
}

/// Decides queue transitions. Pure: persistence is applied by the caller.
pub struct QueueStateMachine;

impl QueueStateMachine {
    /// - No entry: open one once a manual decision exists. The actor is only
    ///   assigned when they hold the grader role.
    /// - PENDING with a score: finish it.
    /// - PENDING without a score: refresh a stale prior attempt id.
    /// - FINISHED is terminal.
    pub fn next(entry: Option<&AssessorQueueEntry>, obs: &QueueObservation) -> QueueTransition {
        let Some(entry) = entry else {
            if !obs.has_manual_decision {
                return QueueTransition::Unchanged;
            }
            return QueueTransition::Open {
                assignee: obs.actor_is_grader.then_some(obs.actor),
                prior_attempt_id: obs.resolved_prior,
            };
        };

        match entry.state {
            QueueState::Finished => QueueTransition::Unchanged,
            QueueState::Pending if obs.graded => QueueTransition::Finish {
                assignee: obs.actor,
            },
            QueueState::Pending => match obs.resolved_prior {
                Some(prior) if entry.prior_attempt_id != Some(prior) => {
                    QueueTransition::ReconcilePrior {
                        prior_attempt_id: prior,
                    }
                }
                _ => QueueTransition::Unchanged,
            },
        }
    }
}
