use std::fmt;

use serde::{Deserialize, Serialize};

use super::records::{AttemptId, CourseId, UserId};

/// The two resources a payload can be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    QuizAttempts,
    CompleteActivities,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::QuizAttempts => "quizattempts",
            DeliveryType::CompleteActivities => "completeactivities",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "quizattempts" => Some(DeliveryType::QuizAttempts),
            "completeactivities" => Some(DeliveryType::CompleteActivities),
            _ => None,
        }
    }

    /// Resource path relative to the service base URL.
    pub fn resource_path(&self) -> &'static str {
        match self {
            DeliveryType::QuizAttempts => "quizattempts/",
            DeliveryType::CompleteActivities => "completeactivities/",
        }
    }
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    /// Set by the external retry consumer once replayed.
    Sent,
}

impl OutboxStatus {
    pub fn code(&self) -> i64 {
        match self {
            OutboxStatus::Pending => 0,
            OutboxStatus::Sent => 1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            OutboxStatus::Pending
        } else {
            OutboxStatus::Sent
        }
    }
}

/// Identity of one logical delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub learner_id: UserId,
    pub course_id: CourseId,
    pub assessment_name: String,
    pub attempt_id: AttemptId,
    pub delivery_type: DeliveryType,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {:?}, {}, {})",
            self.learner_id, self.course_id, self.assessment_name, self.attempt_id, self.delivery_type
        )
    }
}

/// A retry candidate for one failed delivery, denormalized so it can be
/// replayed without reading the source records again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Option<i64>,
    pub learner_id: UserId,
    pub learner_idnumber: String,
    pub course_id: CourseId,
    pub course_idnumber: String,
    pub assessment_name: String,
    pub time_complete: i64,
    pub attempt_id: AttemptId,
    pub status: OutboxStatus,
    pub time_added: i64,
    pub delivery_type: DeliveryType,
}

impl OutboxRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            learner_id: self.learner_id,
            course_id: self.course_id,
            assessment_name: self.assessment_name.clone(),
            attempt_id: self.attempt_id,
            delivery_type: self.delivery_type,
        }
    }
}
