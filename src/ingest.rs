//! Inbound event validation.
//!
//! Events arrive as flat JSON objects from the platform's event dispatcher.
//! [`GradingEventIngestor`] pulls out the keys every handler needs and rejects
//! anything incomplete before a single record is read or written.

use std::io::Read;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{SkipReason, SyncError};
use crate::model::{AttemptId, CompletionId, CourseId, UserId};

/// Keys that must be present on every event.
const REQUIRED_KEYS: &[&str] = &["relateduserid", "courseid", "objectid", "contextid", "timecreated"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// A grader marked one question; the attempt id travels in `other.attemptid`.
    QuestionManuallyGraded,
    /// An attempt was submitted, updated or regraded.
    AttemptUpdated,
    /// Activity completion changed; `objectid` is the completion row.
    CompletionUpdated,
}

impl EventKind {
    /// Matches on the last path segment, so both `\mod_quiz\event\attempt_submitted`
    /// and `attempt_submitted` are accepted.
    pub fn from_event_name(name: &str) -> Option<Self> {
        let short = name.rsplit(['\\', '/']).next().unwrap_or(name);
        match short {
            "question_manually_graded" => Some(EventKind::QuestionManuallyGraded),
            "attempt_submitted" | "attempt_updated" | "attempt_regraded" => {
                Some(EventKind::AttemptUpdated)
            }
            "course_module_completion_updated" => Some(EventKind::CompletionUpdated),
            _ => None,
        }
    }
}

/// The record an event points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventTarget {
    Attempt(AttemptId),
    /// A row of the platform's activity completion table, not an attempt.
    Completion(CompletionId),
}

/// A validated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradingEvent {
    pub kind: EventKind,
    /// The user whose action raised the event, when the dispatcher supplied one.
    pub actor: Option<UserId>,
    /// The learner the event is about.
    pub subject: UserId,
    pub course_id: CourseId,
    pub target: EventTarget,
    /// Unix seconds. Used as the completion time of completion events.
    pub occurred_at: i64,
}

impl GradingEvent {
    pub fn attempt_id(&self) -> Option<AttemptId> {
        match self.target {
            EventTarget::Attempt(id) => Some(id),
            EventTarget::Completion(_) => None,
        }
    }
}

pub struct GradingEventIngestor;

impl GradingEventIngestor {
    /// Validates `raw`. An empty or zero `timecreated` is replaced by `now`.
    /// Never fails loudly: anything unusable comes back as a [`SkipReason`].
    pub fn ingest(raw: &Value, now: i64) -> Result<GradingEvent, SkipReason> {
        let name = raw.get("eventname").and_then(Value::as_str).unwrap_or_default();
        let Some(kind) = EventKind::from_event_name(name) else {
            warn!(event = name, "ignoring unsupported event");
            return Err(SkipReason::UnsupportedEvent(name.to_string()));
        };

        let mut missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| !is_present(raw.get(**key)))
            .map(|key| key.to_string())
            .collect();

        let subject = raw.get("relateduserid").and_then(as_id);
        let course_id = raw.get("courseid").and_then(as_id);
        let object_id = raw.get("objectid").and_then(as_id);
        let context_id = raw.get("contextid").and_then(as_id);

        // Present but unparseable ids count as missing.
        for (key, value) in [
            ("relateduserid", subject),
            ("courseid", course_id),
            ("objectid", object_id),
            ("contextid", context_id),
        ] {
            if value.is_none() && !missing.iter().any(|m| m == key) {
                missing.push(key.to_string());
            }
        }

        // `objectid` names the graded question for manual grading, so the
        // attempt travels in `other.attemptid` instead.
        let target = match kind {
            EventKind::QuestionManuallyGraded => {
                let id = raw.get("other").and_then(|o| o.get("attemptid")).and_then(as_id);
                if id.is_none() {
                    missing.push("other.attemptid".to_string());
                }
                id.map(EventTarget::Attempt)
            }
            EventKind::AttemptUpdated => object_id.map(EventTarget::Attempt),
            EventKind::CompletionUpdated => object_id.map(EventTarget::Completion),
        };

        let (Some(subject), Some(course_id), Some(_), Some(target)) =
            (subject, course_id, context_id, target)
        else {
            warn!(event = name, missing = ?missing, "dropping incomplete event");
            return Err(SkipReason::IncompleteEvent { missing });
        };
        if !missing.is_empty() {
            warn!(event = name, missing = ?missing, "dropping incomplete event");
            return Err(SkipReason::IncompleteEvent { missing });
        }

        let occurred_at = raw
            .get("timecreated")
            .and_then(as_id)
            .filter(|t| *t > 0)
            .unwrap_or(now);

        Ok(GradingEvent {
            kind,
            actor: raw.get("userid").and_then(as_id),
            subject,
            course_id,
            target,
            occurred_at,
        })
    }
}

/// Reads one raw event from a file, or from stdin when `source` is `-`.
pub fn read_event(source: &str) -> Result<Value, SyncError> {
    let contents = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source)?
    };
    Ok(serde_json::from_str(&contents)?)
}

fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Ids arrive either as JSON numbers or as numeric strings.
fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
