//! Resit grade carry-forward.
//!
//! When a learner resits a deferred-feedback assessment, answers a grader
//! already accepted on the previous attempt are marked correct again on the
//! new one. Planning is pure ([`plan_carry_forward`]); [`ResitGradeCarryForward`]
//! loads both attempts and writes the plan.

use tracing::{debug, info};

use crate::context::SyncContext;
use crate::model::{
    AssessmentDescriptor, Attempt, AttemptGrading, COMMENT, COMMENT_FORMAT, GradingState, MARK,
    MAX_MARK, StepAnnotation, SynthesizedStep,
};
use crate::store::StoreResult;

/// Value written for a companion annotation the accepted step did not carry.
const DEFAULT_ANNOTATION_VALUE: &str = "1";

/// Steps to synthesize on `successor` from the manual decisions on `predecessor`.
///
/// A question is skipped, not failed, when any link is missing: no accepted
/// step on the predecessor, no matching question on the successor, or a
/// successor question whose latest step is not awaiting grading.
pub fn plan_carry_forward(
    predecessor: &AttemptGrading,
    successor: &AttemptGrading,
    now: i64,
) -> Vec<SynthesizedStep> {
    let mut planned = Vec::new();
    for prior in &predecessor.questions {
        if !prior.question.is_manually_graded() {
            continue;
        }
        let Some(accepted) = prior.latest_in_state(&GradingState::ManuallyGradedCorrect) else {
            continue;
        };
        let Some(current) = successor.question(prior.question.question_id) else {
            continue;
        };
        if current.has_state(&GradingState::ManuallyGradedCorrect) {
            continue;
        }
        let Some(awaiting) = current
            .latest_step()
            .filter(|s| s.step.state == GradingState::NeedsGrading)
        else {
            continue;
        };

        let mut annotations = Vec::new();
        if let Some(comment) = accepted.annotation(COMMENT) {
            annotations.push(comment.clone());
            for name in [COMMENT_FORMAT, MARK, MAX_MARK] {
                let value = accepted
                    .annotation(name)
                    .map(|a| a.value.as_str())
                    .unwrap_or(DEFAULT_ANNOTATION_VALUE);
                annotations.push(StepAnnotation::new(name, value));
            }
        }

        planned.push(SynthesizedStep {
            question_attempt_id: current.question.id,
            question_id: current.question.question_id,
            sequence: awaiting.step.sequence + 1,
            state: GradingState::ManuallyGradedCorrect,
            fraction: 1.0,
            time_created: now,
            user_id: successor.attempt.learner_id,
            annotations,
        });
    }
    planned
}

pub struct ResitGradeCarryForward;

impl ResitGradeCarryForward {
    /// Carries accepted answers from the immediately preceding attempt onto
    /// `attempt`. Returns the number of steps written.
    pub fn apply(
        ctx: &SyncContext<'_>,
        assessment: &AssessmentDescriptor,
        attempt: &Attempt,
    ) -> StoreResult<usize> {
        if !attempt.is_resit() || !assessment.is_deferred_feedback() {
            return Ok(0);
        }
        let Some(predecessor) = ctx.store.attempt_by_number(
            attempt.assessment_id,
            attempt.learner_id,
            attempt.number - 1,
            false,
        )?
        else {
            debug!(attempt = attempt.id, "no predecessor to carry grades from");
            return Ok(0);
        };

        let before = ctx.store.attempt_grading(&predecessor)?;
        let after = ctx.store.attempt_grading(attempt)?;
        let plan = plan_carry_forward(&before, &after, ctx.now);
        if plan.is_empty() {
            return Ok(0);
        }

        let written = ctx.store.insert_synthesized_steps(&plan)?;
        info!(
            attempt = attempt.id,
            predecessor = predecessor.id,
            written,
            "carried manual grades onto resit"
        );
        Ok(written)
    }
}
