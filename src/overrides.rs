use tracing::{debug, info};

use crate::context::SyncContext;
use crate::model::{AllowanceChange, AssessmentDescriptor, Attempt};
use crate::store::StoreResult;

/// Grants one more sitting after a failed deferred-feedback attempt.
pub struct OverrideAllowanceManager;

impl OverrideAllowanceManager {
    /// Whether a failure on `attempt` earns the learner a resit. The
    /// full-completion lookup only runs once the cheaper checks pass.
    pub fn qualifies(
        ctx: &SyncContext<'_>,
        assessment: &AssessmentDescriptor,
        attempt: &Attempt,
    ) -> StoreResult<bool> {
        if !assessment.is_deferred_feedback() {
            return Ok(false);
        }
        let Some(score) = attempt.score else {
            return Ok(false);
        };
        if assessment.is_full_score(score) || score >= assessment.max_score {
            return Ok(false);
        }
        let credited = ctx
            .store
            .has_full_completion(assessment.id, attempt.learner_id)?;
        Ok(!credited)
    }

    /// Raises the learner's permitted attempts to at least `attempt.number + 1`.
    /// Returns `None` when the attempt does not qualify.
    pub fn apply(
        ctx: &SyncContext<'_>,
        assessment: &AssessmentDescriptor,
        attempt: &Attempt,
    ) -> StoreResult<Option<AllowanceChange>> {
        if !Self::qualifies(ctx, assessment, attempt)? {
            debug!(attempt = attempt.id, "no override allowance change");
            return Ok(None);
        }
        let change = ctx
            .store
            .raise_override(assessment.id, attempt.learner_id, attempt.number + 1)?;
        match change {
            AllowanceChange::Created { permitted } => info!(
                assessment = assessment.id,
                learner = attempt.learner_id,
                permitted,
                "override allowance created"
            ),
            AllowanceChange::Raised { from, to } => info!(
                assessment = assessment.id,
                learner = attempt.learner_id,
                from,
                to,
                "override allowance raised"
            ),
            AllowanceChange::Unchanged { .. } => {}
        }
        Ok(Some(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, ASSESSMENT, GRADER, LEARNER, NOW};
    use crate::model::{AttemptState, GradingBehaviour};
    use crate::store::GradingStore;

    #[test]
    fn failed_deferred_attempt_grants_resit() {
        let store = fixtures::store();
        let assessment = fixtures::assessment(&store, "Quiz", GradingBehaviour::DeferredFeedback);
        let attempt = fixtures::attempt(&store, 42, 1, AttemptState::Finished, Some(6.0));
        let ctx = SyncContext::new(&store, GRADER).at(NOW);

        assert_eq!(
            OverrideAllowanceManager::apply(&ctx, &assessment, &attempt).unwrap(),
            Some(AllowanceChange::Created { permitted: 2 })
        );
        assert_eq!(
            store
                .override_allowance(ASSESSMENT, LEARNER)
                .unwrap()
                .unwrap()
                .permitted_attempts,
            2
        );
    }

    #[test]
    fn existing_allowance_is_raised_but_never_lowered() {
        let store = fixtures::store();
        let assessment = fixtures::assessment(&store, "Quiz", GradingBehaviour::DeferredFeedback);
        let ctx = SyncContext::new(&store, GRADER).at(NOW);
        store.raise_override(ASSESSMENT, LEARNER, 2).unwrap();

        let third = fixtures::attempt(&store, 43, 3, AttemptState::Finished, Some(2.0));
        assert_eq!(
            OverrideAllowanceManager::apply(&ctx, &assessment, &third).unwrap(),
            Some(AllowanceChange::Raised { from: 2, to: 4 })
        );

        // Re-processing an older failure cannot take attempts away.
        let first = fixtures::attempt(&store, 41, 1, AttemptState::Finished, Some(1.0));
        assert_eq!(
            OverrideAllowanceManager::apply(&ctx, &assessment, &first).unwrap(),
            Some(AllowanceChange::Unchanged { permitted: 4 })
        );
    }

    #[test]
    fn non_qualifying_attempts_are_ignored() {
        let store = fixtures::store();
        let deferred = fixtures::assessment(&store, "Quiz", GradingBehaviour::DeferredFeedback);
        let ctx = SyncContext::new(&store, GRADER).at(NOW);

        let passed = fixtures::attempt(&store, 41, 1, AttemptState::Finished, Some(10.0));
        assert_eq!(OverrideAllowanceManager::apply(&ctx, &deferred, &passed).unwrap(), None);

        let ungraded = fixtures::attempt(&store, 42, 2, AttemptState::Finished, None);
        assert_eq!(OverrideAllowanceManager::apply(&ctx, &deferred, &ungraded).unwrap(), None);

        let immediate = AssessmentDescriptor {
            behaviour: GradingBehaviour::Other,
            ..deferred.clone()
        };
        let failed = fixtures::attempt(&store, 43, 3, AttemptState::Finished, Some(3.0));
        assert_eq!(OverrideAllowanceManager::apply(&ctx, &immediate, &failed).unwrap(), None);

        store.record_completion(ASSESSMENT, LEARNER, 1, NOW).unwrap();
        assert_eq!(OverrideAllowanceManager::apply(&ctx, &deferred, &failed).unwrap(), None);
        assert!(store.override_allowance(ASSESSMENT, LEARNER).unwrap().is_none());
    }
}
