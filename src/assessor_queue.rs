//! Assessor assignment.
//!
//! Loads what the state machine needs to know about an attempt, asks
//! [`QueueStateMachine`] for the transition and applies it through the store's
//! conditional writes. A write that loses a race reports `Unchanged`.

use tracing::{debug, info};

use crate::context::SyncContext;
use crate::model::{
    AssessorQueueEntry, Attempt, AttemptId, QueueObservation, QueueState, QueueStateMachine,
    QueueTransition,
};
use crate::store::StoreResult;

pub struct AssessorQueueManager;

impl AssessorQueueManager {
    /// Most recent finished attempt numbered one below `attempt`.
    pub fn resolve_prior(ctx: &SyncContext<'_>, attempt: &Attempt) -> StoreResult<Option<AttemptId>> {
        if !attempt.is_resit() {
            return Ok(None);
        }
        let prior = ctx.store.attempt_by_number(
            attempt.assessment_id,
            attempt.learner_id,
            attempt.number - 1,
            true,
        )?;
        Ok(prior.map(|a| a.id))
    }

    pub fn observe(ctx: &SyncContext<'_>, attempt: &Attempt) -> StoreResult<QueueObservation> {
        let grading = ctx.store.attempt_grading(attempt)?;
        Ok(QueueObservation {
            actor: ctx.actor,
            actor_is_grader: ctx.store.is_grader(ctx.actor)?,
            has_manual_decision: grading.first_manually_decided().is_some(),
            graded: attempt.score.is_some(),
            resolved_prior: Self::resolve_prior(ctx, attempt)?,
        })
    }

    /// Evaluates and applies the queue transition for `attempt`.
    pub fn process(ctx: &SyncContext<'_>, attempt: &Attempt) -> StoreResult<QueueTransition> {
        let entry = ctx.store.queue_entry(attempt.id)?;
        let obs = Self::observe(ctx, attempt)?;
        let transition = QueueStateMachine::next(entry.as_ref(), &obs);

        let applied = match &transition {
            QueueTransition::Open {
                assignee,
                prior_attempt_id,
            } => {
                let entry = AssessorQueueEntry {
                    attempt_id: attempt.id,
                    prior_attempt_id: *prior_attempt_id,
                    assignee: *assignee,
                    attempt_number: attempt.number,
                    state: QueueState::Pending,
                    time_start: ctx.now,
                    time_finish: None,
                };
                ctx.store.insert_queue_entry(&entry)?
            }
            QueueTransition::Finish { assignee } => {
                ctx.store.finish_queue_entry(attempt.id, *assignee, ctx.now)?
            }
            QueueTransition::ReconcilePrior { prior_attempt_id } => {
                ctx.store.reconcile_queue_prior(attempt.id, *prior_attempt_id)?
            }
            QueueTransition::Unchanged => false,
        };

        if !applied {
            if transition != QueueTransition::Unchanged {
                debug!(attempt = attempt.id, ?transition, "queue write lost to a concurrent update");
            }
            return Ok(QueueTransition::Unchanged);
        }

        match &transition {
            QueueTransition::Open { assignee, .. } => {
                info!(attempt = attempt.id, assignee = ?assignee, "assessor queue entry opened")
            }
            QueueTransition::Finish { assignee } => {
                info!(attempt = attempt.id, assignee, "assessor queue entry finished")
            }
            QueueTransition::ReconcilePrior { prior_attempt_id } => {
                info!(attempt = attempt.id, prior = prior_attempt_id, "assessor queue prior attempt updated")
            }
            QueueTransition::Unchanged => {}
        }
        Ok(transition)
    }
}
