use serde::Serialize;
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::delivery::DeliveryError;
use crate::model::{DeliveryType, OutboxRecord, OutboxStatus};
use crate::payload::PayloadBuilder;
use crate::store::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutboxOutcome {
    Recorded,
    /// A pending record with the same dedup key already exists.
    DuplicateSuppressed,
}

/// Persists retry candidates for failed deliveries. Draining them is left to
/// an external consumer.
pub struct OutboxRecorder;

impl OutboxRecorder {
    pub fn build_record(
        ctx: &SyncContext<'_>,
        source: &PayloadBuilder<'_>,
        delivery_type: DeliveryType,
    ) -> OutboxRecord {
        OutboxRecord {
            id: None,
            learner_id: source.learner.id,
            learner_idnumber: source.learner.idnumber.clone(),
            course_id: source.course.id,
            course_idnumber: source.course.idnumber.clone(),
            assessment_name: source.canonical_name(),
            time_complete: source.attempt.time_modified,
            attempt_id: source.attempt.id,
            status: OutboxStatus::Pending,
            time_added: ctx.now,
            delivery_type,
        }
    }

    /// Records the failed delivery of `delivery_type` for `source` unless an
    /// equivalent pending record exists.
    pub fn record_failure(
        ctx: &SyncContext<'_>,
        source: &PayloadBuilder<'_>,
        delivery_type: DeliveryType,
        failure: &DeliveryError,
    ) -> StoreResult<OutboxOutcome> {
        let record = Self::build_record(ctx, source, delivery_type);
        let key = record.dedup_key();
        if ctx.store.insert_outbox_record(&record)? {
            warn!(%key, error = %failure, "delivery failed, retry candidate recorded");
            Ok(OutboxOutcome::Recorded)
        } else {
            info!(%key, error = %failure, "delivery failed, retry candidate already pending");
            Ok(OutboxOutcome::DuplicateSuppressed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, COURSE, GRADER, LEARNER, NOW};
    use crate::model::{AttemptState, GradingBehaviour};
    use crate::store::GradingStore;

    #[test]
    fn repeated_failure_records_once() {
        let store = fixtures::store();
        let assessment =
            fixtures::assessment(&store, "Written Assessment v2", GradingBehaviour::DeferredFeedback);
        let attempt = fixtures::attempt(&store, 42, 1, AttemptState::Finished, Some(6.0));
        let learner = store.user(LEARNER).unwrap().unwrap();
        let course = store.course(COURSE).unwrap().unwrap();
        let source = PayloadBuilder::new(&learner, &course, &assessment, &attempt).unwrap();

        let ctx = SyncContext::new(&store, GRADER).at(NOW);
        let outcome = OutboxRecorder::record_failure(
            &ctx,
            &source,
            DeliveryType::CompleteActivities,
            &DeliveryError::Timeout,
        )
        .unwrap();
        assert_eq!(outcome, OutboxOutcome::Recorded);

        let later = SyncContext::new(&store, GRADER).at(NOW + 300);
        let outcome = OutboxRecorder::record_failure(
            &later,
            &source,
            DeliveryType::CompleteActivities,
            &DeliveryError::Timeout,
        )
        .unwrap();
        assert_eq!(outcome, OutboxOutcome::DuplicateSuppressed);

        let pending = store.pending_outbox().unwrap();
        assert_eq!(pending.len(), 1);
        let record = &pending[0];
        assert_eq!(record.assessment_name, "Written Assessment");
        assert_eq!(record.learner_idnumber, "EXT-3");
        assert_eq!(record.course_idnumber, "CRS-9");
        assert_eq!(record.time_complete, attempt.time_modified);
        assert_eq!(record.time_added, NOW);
        assert_eq!(
            record.dedup_key().to_string(),
            "(3, 9, \"Written Assessment\", 42, completeactivities)"
        );
    }

    #[test]
    fn delivery_types_are_keyed_separately() {
        let store = fixtures::store();
        let assessment = fixtures::assessment(&store, "Quiz", GradingBehaviour::Other);
        let attempt = fixtures::attempt(&store, 42, 1, AttemptState::Finished, Some(10.0));
        let learner = store.user(LEARNER).unwrap().unwrap();
        let course = store.course(COURSE).unwrap().unwrap();
        let source = PayloadBuilder::new(&learner, &course, &assessment, &attempt).unwrap();
        let ctx = SyncContext::new(&store, GRADER).at(NOW);

        for delivery_type in [DeliveryType::QuizAttempts, DeliveryType::CompleteActivities] {
            let outcome = OutboxRecorder::record_failure(
                &ctx,
                &source,
                delivery_type,
                &DeliveryError::Status {
                    status: 502,
                    message: "bad gateway".into(),
                },
            )
            .unwrap();
            assert_eq!(outcome, OutboxOutcome::Recorded);
        }
        assert_eq!(store.pending_outbox().unwrap().len(), 2);
    }

    #[test]
    fn concurrent_failures_leave_one_pending_record() {
        let store = fixtures::store();
        let assessment = fixtures::assessment(&store, "Quiz", GradingBehaviour::Other);
        let attempt = fixtures::attempt(&store, 42, 1, AttemptState::Finished, Some(4.0));
        let learner = store.user(LEARNER).unwrap().unwrap();
        let course = store.course(COURSE).unwrap().unwrap();

        let recorded = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = store.clone();
                    let (learner, course, assessment, attempt) = (&learner, &course, &assessment, &attempt);
                    scope.spawn(move || {
                        let source = PayloadBuilder::new(learner, course, assessment, attempt).unwrap();
                        let ctx = SyncContext::new(&store, GRADER).at(NOW + i);
                        OutboxRecorder::record_failure(
                            &ctx,
                            &source,
                            DeliveryType::QuizAttempts,
                            &DeliveryError::Timeout,
                        )
                        .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|o| *o == OutboxOutcome::Recorded)
                .count()
        });

        assert_eq!(recorded, 1);
        assert_eq!(store.pending_outbox().unwrap().len(), 1);
    }
}
