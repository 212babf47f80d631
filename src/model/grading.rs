use serde::{Deserialize, Serialize};

use super::records::{
    Attempt, GradingState, GradingStep, QuestionAttempt, QuestionAttemptId, StepAnnotation, UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedStep {
    pub step: GradingStep,
    pub annotations: Vec<StepAnnotation>,
}

impl AnnotatedStep {
    pub fn annotation(&self, name: &str) -> Option<&StepAnnotation> {
        self.annotations.iter().rev().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGrading {
    pub question: QuestionAttempt,
    /// Ordered by sequence number.
    pub steps: Vec<AnnotatedStep>,
}

impl QuestionGrading {
    pub fn has_state(&self, state: &GradingState) -> bool {
        self.steps.iter().any(|s| &s.step.state == state)
    }

    pub fn has_manual_decision(&self) -> bool {
        self.steps.iter().any(|s| s.step.state.is_manual_decision())
    }

    /// The step with the highest sequence number.
    pub fn latest_step(&self) -> Option<&AnnotatedStep> {
        self.steps.iter().max_by_key(|s| s.step.sequence)
    }

    /// Most recent step in `state`, by creation time then sequence.
    pub fn latest_in_state(&self, state: &GradingState) -> Option<&AnnotatedStep> {
        self.steps
            .iter()
            .filter(|s| &s.step.state == state)
            .max_by_key(|s| (s.step.time_created, s.step.sequence))
    }
}

/// An attempt together with every question attempt and step under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptGrading {
    pub attempt: Attempt,
    /// Ordered by slot.
    pub questions: Vec<QuestionGrading>,
}

impl AttemptGrading {
    /// First question, in slot order, that carries a manual decision.
    pub fn first_manually_decided(&self) -> Option<&QuestionGrading> {
        self.questions.iter().find(|q| q.has_manual_decision())
    }

    pub fn question(&self, question_id: i64) -> Option<&QuestionGrading> {
        self.questions
            .iter()
            .find(|q| q.question.question_id == question_id)
    }
}

/// A manually-graded-correct step to be written onto a resit attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedStep {
    pub question_attempt_id: QuestionAttemptId,
    pub question_id: i64,
    pub sequence: u32,
    pub state: GradingState,
    pub fraction: f64,
    pub time_created: i64,
    pub user_id: UserId,
    pub annotations: Vec<StepAnnotation>,
}
