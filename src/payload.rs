//! Registros canônicos para o serviço externo de registros.
//!
//! O [`PayloadBuilder`] converte as linhas de aluno, curso, avaliação e
//! tentativa da plataforma em um dos dois formatos planos aceitos pelo serviço.
//! A construção para um aluno suspenso é recusada logo de início.

use serde::{Serialize, Serializer};
use tracing::info;

use crate::error::SkipReason;
use crate::model::{
    AssessmentDescriptor, Attempt, CourseId, CourseRecord, DeliveryType, UserRecord,
};

pub const WRITTEN_ASSESSMENT_LOWER: &str = "Written assessment";
pub const WRITTEN_ASSESSMENT: &str = "Written Assessment";

const ACTIVE: &str = "Active";
const ACTIVITY_TYPE: &str = "prefix_quiz";

/// Reduz cópias versionadas da avaliação escrita a um único nome.
/// A variante minúscula é verificada primeiro; ambas diferenciam maiúsculas.
pub fn canonical_name(name: &str) -> String {
    if name.contains(WRITTEN_ASSESSMENT_LOWER) {
        WRITTEN_ASSESSMENT_LOWER.to_string()
    } else if name.contains(WRITTEN_ASSESSMENT) {
        WRITTEN_ASSESSMENT.to_string()
    } else {
        name.to_string()
    }
}

/// Resultado informado no campo do supervisor. Serializado como código numérico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStatus {
    Passed,
    Failed,
}

impl SupervisorStatus {
    pub fn code(&self) -> i64 {
        match self {
            SupervisorStatus::Passed => 876_750_004,
            SupervisorStatus::Failed => 876_750_007,
        }
    }
}

impl Serialize for SupervisorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonFields {
    pub idnumber: String,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseFields {
    pub id: CourseId,
    pub idnumber: String,
    pub shortname: String,
    pub fullname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizFields {
    pub id: i64,
    pub name: String,
    pub sumgrades: f64,
    pub course: CourseId,
}

/// Corpo de uma entrega `quizattempts/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizAttemptRecord {
    pub id: i64,
    pub user: PersonFields,
    pub course: CourseFields,
    pub quiz: QuizFields,
    pub attempt: u32,
    pub state: String,
    pub timestart: i64,
    pub timefinish: i64,
    pub timemodified: i64,
    pub sumgrades: Option<f64>,
}

/// Corpo de uma entrega `completeactivities/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteActivityRecord {
    pub status: String,
    #[serde(rename = "person.id")]
    pub person_id: String,
    #[serde(rename = "person.username")]
    pub person_username: String,
    #[serde(rename = "person.email")]
    pub person_email: String,
    #[serde(rename = "course.id")]
    pub course_id: String,
    #[serde(rename = "course.code")]
    pub course_code: String,
    #[serde(rename = "activity.name")]
    pub activity_name: String,
    #[serde(rename = "activity.type")]
    pub activity_type: String,
    pub modified: i64,
    /// `"True"` ou `"False"`.
    pub lmscomplete: String,
    pub lmscompletedate: Option<i64>,
    pub supervisorstatus: SupervisorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessor: Option<String>,
}

impl CompleteActivityRecord {
    pub fn is_complete(&self) -> bool {
        self.lmscomplete == "True"
    }
}

/// Registro pronto para entrega. Serializa como o registro puro.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalPayload {
    QuizAttempt(QuizAttemptRecord),
    CompleteActivity(CompleteActivityRecord),
}

impl CanonicalPayload {
    pub fn delivery_type(&self) -> DeliveryType {
        match self {
            CanonicalPayload::QuizAttempt(_) => DeliveryType::QuizAttempts,
            CanonicalPayload::CompleteActivity(_) => DeliveryType::CompleteActivities,
        }
    }
}

/// As linhas de origem a partir das quais um payload é construído.
#[derive(Debug, Clone, Copy)]
pub struct PayloadBuilder<'a> {
    pub learner: &'a UserRecord,
    pub course: &'a CourseRecord,
    pub assessment: &'a AssessmentDescriptor,
    pub attempt: &'a Attempt,
}

impl<'a> PayloadBuilder<'a> {
    /// Falha com [`SkipReason::SuspendedLearner`] para contas suspensas.
    pub fn new(
        learner: &'a UserRecord,
        course: &'a CourseRecord,
        assessment: &'a AssessmentDescriptor,
        attempt: &'a Attempt,
    ) -> Result<Self, SkipReason> {
        if learner.suspended {
            info!(learner = learner.id, attempt = attempt.id, "learner suspended, nothing delivered");
            return Err(SkipReason::SuspendedLearner);
        }
        Ok(Self {
            learner,
            course,
            assessment,
            attempt,
        })
    }

    pub fn canonical_name(&self) -> String {
        canonical_name(&self.assessment.name)
    }

    /// Aprovado sse a nota da tentativa é igual ao máximo da avaliação.
    pub fn is_complete(&self) -> bool {
        self.attempt
            .score
            .is_some_and(|score| self.assessment.is_full_score(score))
    }

    pub fn quiz_attempt(&self) -> CanonicalPayload {
        let learner = self.learner;
        let course = self.course;
        CanonicalPayload::QuizAttempt(QuizAttemptRecord {
            id: self.attempt.id,
            user: PersonFields {
                idnumber: learner.idnumber.clone(),
                username: learner.username.clone(),
                firstname: learner.firstname.clone(),
                lastname: learner.lastname.clone(),
                email: learner.email.clone(),
            },
            course: CourseFields {
                id: course.id,
                idnumber: course.idnumber.clone(),
                shortname: course.shortname.clone(),
                fullname: course.fullname.clone(),
            },
            quiz: QuizFields {
                id: self.assessment.id,
                name: self.canonical_name(),
                sumgrades: self.assessment.max_score,
                course: self.assessment.course_id,
            },
            attempt: self.attempt.number,
            state: self.attempt.state.as_str().to_string(),
            timestart: self.attempt.time_start,
            timefinish: self.attempt.time_finish,
            timemodified: self.attempt.time_modified,
            sumgrades: self.attempt.score,
        })
    }

    /// `assessor` é o id externo de quem está designado para a tentativa.
    /// `completed_at` vira `modified` e, se completa, `lmscompletedate`.
    pub fn complete_activity(
        &self,
        completed_at: i64,
        assessor: Option<String>,
    ) -> CanonicalPayload {
        let complete = self.is_complete();
        let (lmscomplete, status) = if complete {
            ("True", SupervisorStatus::Passed)
        } else {
            ("False", SupervisorStatus::Failed)
        };
        CanonicalPayload::CompleteActivity(CompleteActivityRecord {
            status: ACTIVE.to_string(),
            person_id: self.learner.idnumber.clone(),
            person_username: self.learner.username.clone(),
            person_email: self.learner.email.clone(),
            course_id: self.course.idnumber.clone(),
            course_code: self.course.shortname.clone(),
            activity_name: self.canonical_name(),
            activity_type: ACTIVITY_TYPE.to_string(),
            modified: completed_at,
            lmscomplete: lmscomplete.to_string(),
            lmscompletedate: complete.then_some(completed_at),
            supervisorstatus: status,
            assessor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptState, GradingBehaviour};
    use serde_json::json;

    fn learner() -> UserRecord {
        UserRecord {
            id: 3,
            idnumber: "EXT-3".into(),
            username: "learner".into(),
            firstname: "Lee".into(),
            lastname: "Example".into(),
            email: "learner@example.org".into(),
            suspended: false,
        }
    }

    fn course() -> CourseRecord {
        CourseRecord {
            id: 9,
            idnumber: "CRS-9".into(),
            shortname: "FA101".into(),
            fullname: "First Aid Fundamentals".into(),
        }
    }

    fn assessment(name: &str, behaviour: GradingBehaviour) -> AssessmentDescriptor {
        AssessmentDescriptor {
            id: 5,
            course_id: 9,
            name: name.into(),
            max_score: 10.0,
            behaviour,
        }
    }

    fn attempt(score: Option<f64>) -> Attempt {
        Attempt {
            id: 42,
            assessment_id: 5,
            learner_id: 3,
            number: 1,
            usage_id: 420,
            state: AttemptState::Finished,
            score,
            preview: false,
            time_start: 1_700_000_000,
            time_finish: 1_700_000_500,
            time_modified: 1_700_000_600,
        }
    }

    #[test]
    fn canonical_name_collapses_versions() {
        assert_eq!(canonical_name("Written Assessment v2"), "Written Assessment");
        assert_eq!(canonical_name("Final Written assessment (2024)"), "Written assessment");
        assert_eq!(canonical_name("WRITTEN ASSESSMENT"), "WRITTEN ASSESSMENT");
        assert_eq!(canonical_name("Practical observation"), "Practical observation");
    }

    #[test]
    fn canonical_name_is_idempotent() {
        for name in [
            "Written Assessment v2",
            "Written assessment - old",
            "Written Assessment",
            "Module 3 quiz",
            "",
        ] {
            let once = canonical_name(name);
            assert_eq!(canonical_name(&once), once);
        }
    }

    #[test]
    fn suspended_learner_gets_no_payload() {
        let suspended = UserRecord {
            suspended: true,
            ..learner()
        };
        let course = course();
        let assessment = assessment("Quiz", GradingBehaviour::Other);
        let attempt = attempt(Some(10.0));
        let err = PayloadBuilder::new(&suspended, &course, &assessment, &attempt).unwrap_err();
        assert_eq!(err, SkipReason::SuspendedLearner);
    }

    #[test]
    fn full_score_is_passed_with_completion_date() {
        let (learner, course) = (learner(), course());
        let assessment = assessment("Quiz", GradingBehaviour::Other);
        let attempt = attempt(Some(10.0));
        let builder = PayloadBuilder::new(&learner, &course, &assessment, &attempt).unwrap();

        let CanonicalPayload::CompleteActivity(record) = builder.complete_activity(1_700_001_000, None)
        else {
            panic!("expected a completion record");
        };
        assert_eq!(record.supervisorstatus, SupervisorStatus::Passed);
        assert_eq!(record.lmscomplete, "True");
        assert_eq!(record.lmscompletedate, Some(1_700_001_000));
    }

    #[test]
    fn partial_score_is_failed_without_date() {
        let (learner, course) = (learner(), course());
        let assessment = assessment("Written Assessment v2", GradingBehaviour::DeferredFeedback);
        let attempt = attempt(Some(6.0));
        let builder = PayloadBuilder::new(&learner, &course, &assessment, &attempt).unwrap();

        let payload = builder.complete_activity(1_700_001_000, Some("EXT-7".into()));
        assert_eq!(payload.delivery_type(), DeliveryType::CompleteActivities);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "Active",
                "person.id": "EXT-3",
                "person.username": "learner",
                "person.email": "learner@example.org",
                "course.id": "CRS-9",
                "course.code": "FA101",
                "activity.name": "Written Assessment",
                "activity.type": "prefix_quiz",
                "modified": 1_700_001_000,
                "lmscomplete": "False",
                "lmscompletedate": null,
                "supervisorstatus": 876_750_007,
                "assessor": "EXT-7",
            })
        );
    }

    #[test]
    fn assessor_is_omitted_when_unknown() {
        let (learner, course) = (learner(), course());
        let assessment = assessment("Quiz", GradingBehaviour::Other);
        let attempt = attempt(None);
        let builder = PayloadBuilder::new(&learner, &course, &assessment, &attempt).unwrap();
        let value = serde_json::to_value(builder.complete_activity(1, None)).unwrap();
        assert!(value.get("assessor").is_none());
        assert_eq!(value["lmscomplete"], "False");
    }

    #[test]
    fn quiz_attempt_shape() {
        let (learner, course) = (learner(), course());
        let assessment = assessment("Written assessment (v3)", GradingBehaviour::DeferredFeedback);
        let attempt = attempt(Some(7.5));
        let builder = PayloadBuilder::new(&learner, &course, &assessment, &attempt).unwrap();

        let payload = builder.quiz_attempt();
        assert_eq!(payload.delivery_type(), DeliveryType::QuizAttempts);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["user"]["idnumber"], "EXT-3");
        assert_eq!(value["course"]["shortname"], "FA101");
        assert_eq!(value["quiz"]["name"], "Written assessment");
        assert_eq!(value["quiz"]["sumgrades"], 10.0);
        assert_eq!(value["quiz"]["course"], 9);
        assert_eq!(value["attempt"], 1);
        assert_eq!(value["state"], "finished");
        assert_eq!(value["timemodified"], 1_700_000_600);
        assert_eq!(value["sumgrades"], 7.5);
    }
}
