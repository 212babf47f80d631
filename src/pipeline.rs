//! Per-event orchestration.
//!
//! One call to [`SyncPipeline::process`] takes a raw event through validation,
//! the assessor queue, override and carry-forward bookkeeping, payload
//! building and delivery. Skips and delivery failures are reported in the
//! returned [`SyncReport`]; only store faults surface as errors.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assessor_queue::AssessorQueueManager;
use crate::carry_forward::ResitGradeCarryForward;
use crate::context::SyncContext;
use crate::delivery::Deliver;
use crate::error::{SkipReason, SyncError};
use crate::ingest::{EventKind, EventTarget, GradingEvent, GradingEventIngestor};
use crate::model::{
    AllowanceChange, AssessmentDescriptor, Attempt, AttemptId, AttemptState, CourseRecord,
    DeliveryType, QueueTransition, UserId, UserRecord,
};
use crate::outbox::{OutboxOutcome, OutboxRecorder};
use crate::overrides::OverrideAllowanceManager;
use crate::payload::{CanonicalPayload, PayloadBuilder};
use crate::store::{GradingStore, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { error: String, outbox: OutboxOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub delivery_type: DeliveryType,
    pub outcome: DeliveryOutcome,
}

/// What happened to one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub kind: Option<EventKind>,
    pub attempt_id: Option<AttemptId>,
    pub skipped: Option<SkipReason>,
    pub queue: Option<QueueTransition>,
    pub allowance: Option<AllowanceChange>,
    /// Grading steps synthesized on a resit.
    pub carried: usize,
    pub deliveries: Vec<DeliveryReport>,
}

impl SyncReport {
    fn skip(mut self, reason: SkipReason) -> Self {
        self.skipped = Some(reason);
        self
    }
}

/// Source rows every handler needs, loaded before anything is written.
struct Entities {
    attempt: Attempt,
    assessment: AssessmentDescriptor,
    learner: UserRecord,
    course: CourseRecord,
}

pub struct SyncPipeline<S, D> {
    pub store: S,
    pub deliverer: D,
}

impl<S: GradingStore, D: Deliver> SyncPipeline<S, D> {
    pub fn new(store: S, deliverer: D) -> Self {
        Self { store, deliverer }
    }

    /// Processes one event at the current time. `actor` overrides the
    /// event's own `userid`.
    pub async fn process(&self, raw: &Value, actor: Option<UserId>) -> Result<SyncReport, SyncError> {
        let now = chrono::Utc::now().timestamp();
        self.process_at(raw, actor, now).await
    }

    pub async fn process_at(
        &self,
        raw: &Value,
        actor: Option<UserId>,
        now: i64,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let event = match GradingEventIngestor::ingest(raw, now) {
            Ok(event) => event,
            Err(reason) => return Ok(report.skip(reason)),
        };
        report.kind = Some(event.kind);
        report.attempt_id = event.attempt_id();

        // Falls back to the subject when neither the caller nor the event names an actor.
        let actor = actor.or(event.actor).unwrap_or(event.subject);
        let ctx = SyncContext::new(&self.store, actor).at(now);

        let entities = match self.load(&event)? {
            Ok(entities) => entities,
            Err(reason) => return Ok(report.skip(reason)),
        };
        report.attempt_id = Some(entities.attempt.id);
        if let Err(reason) = precondition(event.kind, &entities.attempt) {
            debug!(attempt = entities.attempt.id, %reason, "event skipped");
            return Ok(report.skip(reason));
        }
        if event.kind == EventKind::CompletionUpdated {
            if let Err(reason) = self.completion_guard(&entities)? {
                info!(attempt = entities.attempt.id, %reason, "completion not forwarded");
                return Ok(report.skip(reason));
            }
        }

        let Entities {
            attempt,
            assessment,
            learner,
            course,
        } = &entities;

        match event.kind {
            EventKind::QuestionManuallyGraded => {
                report.allowance = OverrideAllowanceManager::apply(&ctx, assessment, attempt)?;
                report.queue = Some(AssessorQueueManager::process(&ctx, attempt)?);
            }
            EventKind::AttemptUpdated => {
                report.queue = Some(AssessorQueueManager::process(&ctx, attempt)?);
                report.carried = ResitGradeCarryForward::apply(&ctx, assessment, attempt)?;
            }
            EventKind::CompletionUpdated => {}
        }

        let builder = match PayloadBuilder::new(learner, course, assessment, attempt) {
            Ok(builder) => builder,
            Err(reason) => return Ok(report.skip(reason)),
        };

        let mut payloads = Vec::new();
        match event.kind {
            EventKind::QuestionManuallyGraded => {
                let assessor = assessor_idnumber(&ctx, attempt.id)?;
                payloads.push(builder.complete_activity(now, assessor));
            }
            EventKind::AttemptUpdated => {
                payloads.push(builder.quiz_attempt());
                if !assessment.is_deferred_feedback() && builder.is_complete() {
                    let assessor = assessor_idnumber(&ctx, attempt.id)?;
                    payloads.push(builder.complete_activity(now, assessor));
                }
            }
            EventKind::CompletionUpdated => {
                payloads.push(builder.complete_activity(event.occurred_at, None));
            }
        }

        for payload in &payloads {
            report.deliveries.push(self.deliver(&ctx, &builder, payload).await?);
        }
        info!(
            attempt = attempt.id,
            deliveries = report.deliveries.len(),
            "event processed"
        );
        Ok(report)
    }

    /// Loads the attempt and its related rows. A missing row is a skip, not an error.
    fn load(&self, event: &GradingEvent) -> StoreResult<Result<Entities, SkipReason>> {
        let attempt = match event.target {
            EventTarget::Attempt(id) => match self.store.attempt(id)? {
                Some(attempt) => attempt,
                None => return Ok(Err(not_found("attempt", id))),
            },
            EventTarget::Completion(id) => {
                let Some(completion) = self.store.completion(id)? else {
                    return Ok(Err(not_found("completion", id)));
                };
                if let Err(reason) = owned_by(event, completion.learner_id) {
                    return Ok(Err(reason));
                }
                let latest = self
                    .store
                    .latest_finished_attempt(completion.assessment_id, completion.learner_id)?;
                match latest {
                    Some(attempt) => attempt,
                    None => {
                        debug!(completion = id, "completion has no finished attempt");
                        return Ok(Err(SkipReason::NoFinishedAttempt));
                    }
                }
            }
        };
        if let Err(reason) = owned_by(event, attempt.learner_id) {
            return Ok(Err(reason));
        }
        let Some(assessment) = self.store.assessment(attempt.assessment_id)? else {
            return Ok(Err(not_found("assessment", attempt.assessment_id)));
        };
        let Some(learner) = self.store.user(attempt.learner_id)? else {
            return Ok(Err(not_found("user", attempt.learner_id)));
        };
        // Attempt events take the course from the assessment; the others name it.
        let course_id = match event.kind {
            EventKind::AttemptUpdated => assessment.course_id,
            _ => event.course_id,
        };
        let Some(course) = self.store.course(course_id)? else {
            return Ok(Err(not_found("course", course_id)));
        };
        Ok(Ok(Entities {
            attempt,
            assessment,
            learner,
            course,
        }))
    }

    /// Completion events are only forwarded for addressable records that were
    /// not already credited and do not wait on manual grading.
    fn completion_guard(&self, entities: &Entities) -> StoreResult<Result<(), SkipReason>> {
        let Entities {
            assessment,
            learner,
            course,
            ..
        } = entities;
        if learner.idnumber.trim().is_empty() {
            return Ok(Err(SkipReason::MissingExternalId {
                entity: "user",
                id: learner.id,
            }));
        }
        if course.idnumber.trim().is_empty() {
            return Ok(Err(SkipReason::MissingExternalId {
                entity: "course",
                id: course.id,
            }));
        }
        if self.store.has_rpl_credit(course.id, assessment.id, learner.id)? {
            return Ok(Err(SkipReason::PriorLearningCredit));
        }
        if assessment.is_deferred_feedback() {
            return Ok(Err(SkipReason::DeferredFeedbackActivity));
        }
        Ok(Ok(()))
    }

    async fn deliver(
        &self,
        ctx: &SyncContext<'_>,
        builder: &PayloadBuilder<'_>,
        payload: &CanonicalPayload,
    ) -> StoreResult<DeliveryReport> {
        let delivery_type = payload.delivery_type();
        let outcome = match self.deliverer.deliver(payload).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(failure) => {
                let outbox = OutboxRecorder::record_failure(ctx, builder, delivery_type, &failure)?;
                DeliveryOutcome::Failed {
                    error: failure.to_string(),
                    outbox,
                }
            }
        };
        Ok(DeliveryReport {
            delivery_type,
            outcome,
        })
    }
}

fn not_found(entity: &'static str, id: i64) -> SkipReason {
    warn!(entity, id, "referenced record not found, event dropped");
    SkipReason::EntityNotFound { entity, id }
}

fn owned_by(event: &GradingEvent, owner: UserId) -> Result<(), SkipReason> {
    if event.subject == owner {
        return Ok(());
    }
    warn!(subject = event.subject, owner, "event subject does not own the record, event dropped");
    Err(SkipReason::SubjectMismatch {
        subject: event.subject,
        owner,
    })
}

fn precondition(kind: EventKind, attempt: &Attempt) -> Result<(), SkipReason> {
    match kind {
        EventKind::QuestionManuallyGraded
            if attempt.state == AttemptState::Finished && attempt.score.is_none() =>
        {
            return Err(SkipReason::NotYetGraded);
        }
        EventKind::AttemptUpdated if attempt.state == AttemptState::InProgress => {
            return Err(SkipReason::AttemptInProgress);
        }
        _ => {}
    }
    if attempt.preview {
        return Err(SkipReason::PreviewAttempt);
    }
    Ok(())
}

/// External id of the grader the attempt is assigned to, if any.
fn assessor_idnumber(ctx: &SyncContext<'_>, attempt_id: AttemptId) -> StoreResult<Option<String>> {
    let Some(assignee) = ctx.store.queue_entry(attempt_id)?.and_then(|e| e.assignee) else {
        return Ok(None);
    };
    Ok(ctx.store.user(assignee)?.map(|u| u.idnumber))
}
