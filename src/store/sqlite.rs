//! [`GradingStore`] sobre SQLite.
//!
//! Uma conexão atrás de `Arc<Mutex<_>>`; toda sequência ler-verificar-gravar
//! roda numa transação `IMMEDIATE`, e as tabelas da ponte têm restrições UNIQUE
//! para que um segundo processo usando o mesmo arquivo também não consiga
//! inserir uma duplicata entre a verificação e a inserção.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::{GradingStore, StoreResult};
use crate::error::SyncError;
use crate::model::{
    ActivityCompletion, AllowanceChange, AnnotatedStep, AssessmentDescriptor, AssessmentId,
    AssessorQueueEntry, Attempt, AttemptGrading, AttemptId, AttemptState, CompletionId, CourseId,
    CourseRecord, DeliveryType, GradingBehaviour, GradingState, GradingStep, OutboxRecord,
    OutboxStatus, OverrideAllowance, QuestionAttempt, QuestionGrading, QueueState, StepAnnotation,
    StepId, SynthesizedStep, UserId, UserRecord,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    idnumber    TEXT NOT NULL DEFAULT '',
    username    TEXT NOT NULL,
    firstname   TEXT NOT NULL DEFAULT '',
    lastname    TEXT NOT NULL DEFAULT '',
    email       TEXT NOT NULL DEFAULT '',
    suspended   INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS courses (
    id          INTEGER PRIMARY KEY,
    idnumber    TEXT NOT NULL DEFAULT '',
    shortname   TEXT NOT NULL,
    fullname    TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS assessments (
    id          INTEGER PRIMARY KEY,
    course_id   INTEGER NOT NULL,
    name        TEXT NOT NULL,
    max_score   REAL NOT NULL,
    behaviour   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attempts (
    id              INTEGER PRIMARY KEY,
    assessment_id   INTEGER NOT NULL,
    learner_id      INTEGER NOT NULL,
    attempt         INTEGER NOT NULL,
    usage_id        INTEGER NOT NULL,
    state           TEXT NOT NULL,
    score           REAL,
    preview         INTEGER NOT NULL DEFAULT 0,
    time_start      INTEGER NOT NULL DEFAULT 0,
    time_finish     INTEGER NOT NULL DEFAULT 0,
    time_modified   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS attempts_by_learner ON attempts (assessment_id, learner_id, attempt);
CREATE TABLE IF NOT EXISTS question_attempts (
    id          INTEGER PRIMARY KEY,
    usage_id    INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    slot        INTEGER NOT NULL,
    behaviour   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS grading_steps (
    id                  INTEGER PRIMARY KEY,
    question_attempt_id INTEGER NOT NULL,
    sequence            INTEGER NOT NULL,
    state               TEXT NOT NULL,
    fraction            REAL,
    time_created        INTEGER NOT NULL,
    user_id             INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS step_annotations (
    id      INTEGER PRIMARY KEY,
    step_id INTEGER NOT NULL,
    name    TEXT NOT NULL,
    value   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS role_assignments (
    user_id INTEGER NOT NULL,
    role_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, role_id)
);
CREATE TABLE IF NOT EXISTS activity_completions (
    id              INTEGER PRIMARY KEY,
    assessment_id   INTEGER NOT NULL,
    learner_id      INTEGER NOT NULL,
    state           INTEGER NOT NULL,
    time_modified   INTEGER NOT NULL DEFAULT 0,
    UNIQUE (assessment_id, learner_id)
);
CREATE TABLE IF NOT EXISTS criteria_completions (
    course_id       INTEGER NOT NULL,
    assessment_id   INTEGER NOT NULL,
    learner_id      INTEGER NOT NULL,
    rpl             TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (course_id, assessment_id, learner_id)
);
CREATE TABLE IF NOT EXISTS assessor_queue (
    id                  INTEGER PRIMARY KEY,
    attempt_id          INTEGER NOT NULL UNIQUE,
    prior_attempt_id    INTEGER,
    assignee            INTEGER,
    attempt_number      INTEGER NOT NULL,
    state               INTEGER NOT NULL DEFAULT 0,
    time_start          INTEGER NOT NULL,
    time_finish         INTEGER
);
CREATE TABLE IF NOT EXISTS override_allowances (
    assessment_id       INTEGER NOT NULL,
    learner_id          INTEGER NOT NULL,
    permitted_attempts  INTEGER NOT NULL,
    PRIMARY KEY (assessment_id, learner_id)
);
CREATE TABLE IF NOT EXISTS outbox (
    id                  INTEGER PRIMARY KEY,
    learner_id          INTEGER NOT NULL,
    learner_idnumber    TEXT NOT NULL,
    course_id           INTEGER NOT NULL,
    course_idnumber     TEXT NOT NULL,
    assessment_name     TEXT NOT NULL,
    time_complete       INTEGER NOT NULL,
    attempt_id          INTEGER NOT NULL,
    status              INTEGER NOT NULL DEFAULT 0,
    time_added          INTEGER NOT NULL,
    delivery_type       TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS outbox_pending_key
    ON outbox (learner_id, course_id, assessment_name, attempt_id, delivery_type)
    WHERE status = 0;
";

/// Estado de conclusão que conta como crédito total.
const COMPLETION_COMPLETE: i64 = 1;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    grader_role_id: i64,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, grader_role_id: i64) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::bootstrap(conn, grader_role_id)
    }

    pub fn in_memory(grader_role_id: i64) -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn, grader_role_id)
    }

    fn bootstrap(conn: Connection, grader_role_id: i64) -> Result<Self, SyncError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            grader_role_id,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn.lock().map_err(|_| SyncError::LockPoisoned)
    }

    // Escritores dos registros de origem. Em produção essas tabelas são da
    // plataforma; ficam expostos para fixtures e replay local.

    pub fn insert_user(&self, user: &UserRecord) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO users (id, idnumber, username, firstname, lastname, email, suspended)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.idnumber,
                user.username,
                user.firstname,
                user.lastname,
                user.email,
                user.suspended
            ],
        )?;
        Ok(())
    }

    pub fn insert_course(&self, course: &CourseRecord) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO courses (id, idnumber, shortname, fullname) VALUES (?1, ?2, ?3, ?4)",
            params![course.id, course.idnumber, course.shortname, course.fullname],
        )?;
        Ok(())
    }

    pub fn insert_assessment(&self, assessment: &AssessmentDescriptor) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO assessments (id, course_id, name, max_score, behaviour)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                assessment.id,
                assessment.course_id,
                assessment.name,
                assessment.max_score,
                assessment.behaviour.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn insert_attempt(&self, attempt: &Attempt) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO attempts (id, assessment_id, learner_id, attempt, usage_id, state, score,
                                   preview, time_start, time_finish, time_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                attempt.id,
                attempt.assessment_id,
                attempt.learner_id,
                attempt.number,
                attempt.usage_id,
                attempt.state.as_str(),
                attempt.score,
                attempt.preview,
                attempt.time_start,
                attempt.time_finish,
                attempt.time_modified
            ],
        )?;
        Ok(())
    }

    pub fn set_attempt_score(&self, attempt_id: AttemptId, score: Option<f64>) -> Result<(), SyncError> {
        self.lock()?.execute(
            "UPDATE attempts SET score = ?1 WHERE id = ?2",
            params![score, attempt_id],
        )?;
        Ok(())
    }

    pub fn insert_question_attempt(&self, question: &QuestionAttempt) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO question_attempts (id, usage_id, question_id, slot, behaviour)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                question.id,
                question.usage_id,
                question.question_id,
                question.slot,
                question.behaviour
            ],
        )?;
        Ok(())
    }

    pub fn insert_step(&self, step: &GradingStep) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO grading_steps (id, question_attempt_id, sequence, state, fraction, time_created, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                step.id,
                step.question_attempt_id,
                step.sequence,
                step.state.as_tag(),
                step.fraction,
                step.time_created,
                step.user_id
            ],
        )?;
        Ok(())
    }

    pub fn annotate_step(&self, step_id: StepId, annotation: &StepAnnotation) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO step_annotations (step_id, name, value) VALUES (?1, ?2, ?3)",
            params![step_id, annotation.name, annotation.value],
        )?;
        Ok(())
    }

    pub fn assign_role(&self, user_id: UserId, role_id: i64) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT OR IGNORE INTO role_assignments (user_id, role_id) VALUES (?1, ?2)",
            params![user_id, role_id],
        )?;
        Ok(())
    }

    /// Insere ou atualiza a conclusão de (avaliação, aluno) e retorna seu id.
    pub fn record_completion(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
        state: i64,
        time_modified: i64,
    ) -> Result<CompletionId, SyncError> {
        let id = self.lock()?.query_row(
            "INSERT INTO activity_completions (assessment_id, learner_id, state, time_modified)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(assessment_id, learner_id)
             DO UPDATE SET state = excluded.state, time_modified = excluded.time_modified
             RETURNING id",
            params![assessment_id, learner_id, state, time_modified],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Registra crédito de curso para uma avaliação. Um `rpl` não vazio indica
    /// crédito concedido fora da plataforma.
    pub fn record_criteria_completion(
        &self,
        course_id: CourseId,
        assessment_id: AssessmentId,
        learner_id: UserId,
        rpl: &str,
    ) -> Result<(), SyncError> {
        self.lock()?.execute(
            "INSERT INTO criteria_completions (course_id, assessment_id, learner_id, rpl)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(course_id, assessment_id, learner_id) DO UPDATE SET rpl = excluded.rpl",
            params![course_id, assessment_id, learner_id, rpl],
        )?;
        Ok(())
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        idnumber: row.get(1)?,
        username: row.get(2)?,
        firstname: row.get(3)?,
        lastname: row.get(4)?,
        email: row.get(5)?,
        suspended: row.get(6)?,
    })
}

fn map_attempt(row: &Row<'_>) -> rusqlite::Result<Attempt> {
    let state: String = row.get(5)?;
    Ok(Attempt {
        id: row.get(0)?,
        assessment_id: row.get(1)?,
        learner_id: row.get(2)?,
        number: row.get(3)?,
        usage_id: row.get(4)?,
        state: AttemptState::from_tag(&state),
        score: row.get(6)?,
        preview: row.get(7)?,
        time_start: row.get(8)?,
        time_finish: row.get(9)?,
        time_modified: row.get(10)?,
    })
}

const ATTEMPT_COLUMNS: &str = "id, assessment_id, learner_id, attempt, usage_id, state, score, \
                               preview, time_start, time_finish, time_modified";

fn map_question_attempt(row: &Row<'_>) -> rusqlite::Result<QuestionAttempt> {
    Ok(QuestionAttempt {
        id: row.get(0)?,
        usage_id: row.get(1)?,
        question_id: row.get(2)?,
        slot: row.get(3)?,
        behaviour: row.get(4)?,
    })
}

fn map_step(row: &Row<'_>) -> rusqlite::Result<GradingStep> {
    let state: String = row.get(3)?;
    Ok(GradingStep {
        id: row.get(0)?,
        question_attempt_id: row.get(1)?,
        sequence: row.get(2)?,
        state: GradingState::from_tag(&state),
        fraction: row.get(4)?,
        time_created: row.get(5)?,
        user_id: row.get(6)?,
    })
}

fn map_queue_entry(row: &Row<'_>) -> rusqlite::Result<AssessorQueueEntry> {
    let code: i64 = row.get(4)?;
    let state = QueueState::from_code(code).ok_or(rusqlite::Error::IntegralValueOutOfRange(4, code))?;
    Ok(AssessorQueueEntry {
        attempt_id: row.get(0)?,
        prior_attempt_id: row.get(1)?,
        assignee: row.get(2)?,
        attempt_number: row.get(3)?,
        state,
        time_start: row.get(5)?,
        time_finish: row.get(6)?,
    })
}

const QUEUE_COLUMNS: &str =
    "attempt_id, prior_attempt_id, assignee, attempt_number, state, time_start, time_finish";

fn map_outbox(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    let tag: String = row.get(10)?;
    let delivery_type = DeliveryType::from_tag(&tag).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown delivery type {tag:?}").into(),
        )
    })?;
    Ok(OutboxRecord {
        id: row.get(0)?,
        learner_id: row.get(1)?,
        learner_idnumber: row.get(2)?,
        course_id: row.get(3)?,
        course_idnumber: row.get(4)?,
        assessment_name: row.get(5)?,
        time_complete: row.get(6)?,
        attempt_id: row.get(7)?,
        status: OutboxStatus::from_code(row.get(8)?),
        time_added: row.get(9)?,
        delivery_type,
    })
}

impl GradingStore for SqliteStore {
    fn user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, idnumber, username, firstname, lastname, email, suspended
                 FROM users WHERE id = ?1",
                params![id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    fn course(&self, id: CourseId) -> StoreResult<Option<CourseRecord>> {
        let conn = self.lock()?;
        let course = conn
            .query_row(
                "SELECT id, idnumber, shortname, fullname FROM courses WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CourseRecord {
                        id: row.get(0)?,
                        idnumber: row.get(1)?,
                        shortname: row.get(2)?,
                        fullname: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(course)
    }

    fn assessment(&self, id: AssessmentId) -> StoreResult<Option<AssessmentDescriptor>> {
        let conn = self.lock()?;
        let assessment = conn
            .query_row(
                "SELECT id, course_id, name, max_score, behaviour FROM assessments WHERE id = ?1",
                params![id],
                |row| {
                    let behaviour: String = row.get(4)?;
                    Ok(AssessmentDescriptor {
                        id: row.get(0)?,
                        course_id: row.get(1)?,
                        name: row.get(2)?,
                        max_score: row.get(3)?,
                        behaviour: GradingBehaviour::from_tag(&behaviour),
                    })
                },
            )
            .optional()?;
        Ok(assessment)
    }

    fn attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>> {
        let conn = self.lock()?;
        let attempt = conn
            .query_row(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"),
                params![id],
                map_attempt,
            )
            .optional()?;
        Ok(attempt)
    }

    fn attempt_by_number(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
        number: u32,
        finished_only: bool,
    ) -> StoreResult<Option<Attempt>> {
        let conn = self.lock()?;
        let attempt = conn
            .query_row(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts
                     WHERE assessment_id = ?1 AND learner_id = ?2 AND attempt = ?3
                       AND (?4 = 0 OR state = 'finished')
                     ORDER BY time_finish DESC, id DESC
                     LIMIT 1"
                ),
                params![assessment_id, learner_id, number, finished_only],
                map_attempt,
            )
            .optional()?;
        Ok(attempt)
    }

    fn latest_finished_attempt(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<Option<Attempt>> {
        let conn = self.lock()?;
        let attempt = conn
            .query_row(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts
                     WHERE assessment_id = ?1 AND learner_id = ?2
                       AND state = 'finished' AND preview = 0
                     ORDER BY attempt DESC, time_finish DESC, id DESC
                     LIMIT 1"
                ),
                params![assessment_id, learner_id],
                map_attempt,
            )
            .optional()?;
        Ok(attempt)
    }

    fn completion(&self, id: CompletionId) -> StoreResult<Option<ActivityCompletion>> {
        let conn = self.lock()?;
        let completion = conn
            .query_row(
                "SELECT id, assessment_id, learner_id, state, time_modified
                 FROM activity_completions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ActivityCompletion {
                        id: row.get(0)?,
                        assessment_id: row.get(1)?,
                        learner_id: row.get(2)?,
                        state: row.get(3)?,
                        time_modified: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(completion)
    }

    fn attempt_grading(&self, attempt: &Attempt) -> StoreResult<AttemptGrading> {
        let conn = self.lock()?;
        let questions = {
            let mut stmt = conn.prepare(
                "SELECT id, usage_id, question_id, slot, behaviour FROM question_attempts
                 WHERE usage_id = ?1 ORDER BY slot, id",
            )?;
            let rows = stmt.query_map(params![attempt.usage_id], map_question_attempt)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut step_stmt = conn.prepare(
            "SELECT id, question_attempt_id, sequence, state, fraction, time_created, user_id
             FROM grading_steps WHERE question_attempt_id = ?1 ORDER BY sequence, id",
        )?;
        let mut annotation_stmt =
            conn.prepare("SELECT name, value FROM step_annotations WHERE step_id = ?1 ORDER BY id")?;

        let mut graded = Vec::with_capacity(questions.len());
        for question in questions {
            let steps = step_stmt
                .query_map(params![question.id], map_step)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut annotated = Vec::with_capacity(steps.len());
            for step in steps {
                let annotations = annotation_stmt
                    .query_map(params![step.id], |row| {
                        Ok(StepAnnotation {
                            name: row.get(0)?,
                            value: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                annotated.push(AnnotatedStep { step, annotations });
            }
            graded.push(QuestionGrading {
                question,
                steps: annotated,
            });
        }

        Ok(AttemptGrading {
            attempt: attempt.clone(),
            questions: graded,
        })
    }

    fn is_grader(&self, user: UserId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM role_assignments WHERE user_id = ?1 AND role_id = ?2)",
            params![user, self.grader_role_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn has_full_completion(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM activity_completions
                           WHERE assessment_id = ?1 AND learner_id = ?2 AND state = ?3)",
            params![assessment_id, learner_id, COMPLETION_COMPLETE],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn has_rpl_credit(
        &self,
        course_id: CourseId,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM criteria_completions
                           WHERE course_id = ?1 AND assessment_id = ?2 AND learner_id = ?3
                             AND length(trim(rpl)) > 0)",
            params![course_id, assessment_id, learner_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn queue_entry(&self, attempt_id: AttemptId) -> StoreResult<Option<AssessorQueueEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM assessor_queue WHERE attempt_id = ?1"),
                params![attempt_id],
                map_queue_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn queue_entries(&self) -> StoreResult<Vec<AssessorQueueEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM assessor_queue ORDER BY id"
        ))?;
        let entries = stmt
            .query_map([], map_queue_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn insert_queue_entry(&self, entry: &AssessorQueueEntry) -> StoreResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO assessor_queue
                (attempt_id, prior_attempt_id, assignee, attempt_number, state, time_start, time_finish)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.attempt_id,
                entry.prior_attempt_id,
                entry.assignee,
                entry.attempt_number,
                entry.state.code(),
                entry.time_start,
                entry.time_finish
            ],
        )?;
        Ok(inserted == 1)
    }

    fn finish_queue_entry(
        &self,
        attempt_id: AttemptId,
        assignee: UserId,
        time_finish: i64,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE assessor_queue SET assignee = ?1, state = ?2, time_finish = ?3
             WHERE attempt_id = ?4 AND state = ?5",
            params![
                assignee,
                QueueState::Finished.code(),
                time_finish,
                attempt_id,
                QueueState::Pending.code()
            ],
        )?;
        Ok(updated == 1)
    }

    fn reconcile_queue_prior(
        &self,
        attempt_id: AttemptId,
        prior_attempt_id: AttemptId,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE assessor_queue SET prior_attempt_id = ?1
             WHERE attempt_id = ?2 AND state = ?3
               AND (prior_attempt_id IS NULL OR prior_attempt_id <> ?1)",
            params![prior_attempt_id, attempt_id, QueueState::Pending.code()],
        )?;
        Ok(updated == 1)
    }

    fn override_allowance(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<Option<OverrideAllowance>> {
        let conn = self.lock()?;
        let allowance = conn
            .query_row(
                "SELECT assessment_id, learner_id, permitted_attempts FROM override_allowances
                 WHERE assessment_id = ?1 AND learner_id = ?2",
                params![assessment_id, learner_id],
                |row| {
                    Ok(OverrideAllowance {
                        assessment_id: row.get(0)?,
                        learner_id: row.get(1)?,
                        permitted_attempts: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(allowance)
    }

    fn raise_override(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
        at_least: u32,
    ) -> StoreResult<AllowanceChange> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: Option<u32> = tx
            .query_row(
                "SELECT permitted_attempts FROM override_allowances
                 WHERE assessment_id = ?1 AND learner_id = ?2",
                params![assessment_id, learner_id],
                |row| row.get(0),
            )
            .optional()?;

        let change = match current {
            None => {
                tx.execute(
                    "INSERT INTO override_allowances (assessment_id, learner_id, permitted_attempts)
                     VALUES (?1, ?2, ?3)",
                    params![assessment_id, learner_id, at_least],
                )?;
                AllowanceChange::Created {
                    permitted: at_least,
                }
            }
            Some(permitted) if permitted < at_least => {
                tx.execute(
                    "UPDATE override_allowances SET permitted_attempts = ?1
                     WHERE assessment_id = ?2 AND learner_id = ?3",
                    params![at_least, assessment_id, learner_id],
                )?;
                AllowanceChange::Raised {
                    from: permitted,
                    to: at_least,
                }
            }
            Some(permitted) => AllowanceChange::Unchanged { permitted },
        };
        tx.commit()?;
        Ok(change)
    }

    fn insert_synthesized_steps(&self, steps: &[SynthesizedStep]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut written = 0;
        for step in steps {
            let already_graded: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM grading_steps
                               WHERE question_attempt_id = ?1 AND state = ?2)",
                params![step.question_attempt_id, step.state.as_tag()],
                |row| row.get(0),
            )?;
            if already_graded {
                continue;
            }
            tx.execute(
                "INSERT INTO grading_steps (question_attempt_id, sequence, state, fraction, time_created, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    step.question_attempt_id,
                    step.sequence,
                    step.state.as_tag(),
                    step.fraction,
                    step.time_created,
                    step.user_id
                ],
            )?;
            let step_id = tx.last_insert_rowid();
            for annotation in &step.annotations {
                tx.execute(
                    "INSERT INTO step_annotations (step_id, name, value) VALUES (?1, ?2, ?3)",
                    params![step_id, annotation.name, annotation.value],
                )?;
            }
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }

    fn insert_outbox_record(&self, record: &OutboxRecord) -> StoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pending: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM outbox
                           WHERE learner_id = ?1 AND course_id = ?2 AND assessment_name = ?3
                             AND attempt_id = ?4 AND delivery_type = ?5 AND status = ?6)",
            params![
                record.learner_id,
                record.course_id,
                record.assessment_name,
                record.attempt_id,
                record.delivery_type.as_str(),
                OutboxStatus::Pending.code()
            ],
            |row| row.get(0),
        )?;
        if pending {
            return Ok(false);
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO outbox
                (learner_id, learner_idnumber, course_id, course_idnumber, assessment_name,
                 time_complete, attempt_id, status, time_added, delivery_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.learner_id,
                record.learner_idnumber,
                record.course_id,
                record.course_idnumber,
                record.assessment_name,
                record.time_complete,
                record.attempt_id,
                record.status.code(),
                record.time_added,
                record.delivery_type.as_str()
            ],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    fn pending_outbox(&self) -> StoreResult<Vec<OutboxRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, learner_id, learner_idnumber, course_id, course_idnumber, assessment_name,
                    time_complete, attempt_id, status, time_added, delivery_type
             FROM outbox WHERE status = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map(params![OutboxStatus::Pending.code()], map_outbox)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::in_memory(11).unwrap()
    }

    fn attempt(id: AttemptId, number: u32, state: AttemptState) -> Attempt {
        Attempt {
            id,
            assessment_id: 5,
            learner_id: 3,
            number,
            usage_id: id * 10,
            state,
            score: None,
            preview: false,
            time_start: 1_700_000_000,
            time_finish: 1_700_000_000 + id,
            time_modified: 1_700_000_000 + id,
        }
    }

    fn outbox(time_added: i64) -> OutboxRecord {
        OutboxRecord {
            id: None,
            learner_id: 3,
            learner_idnumber: "L-3".into(),
            course_id: 9,
            course_idnumber: "C-9".into(),
            assessment_name: "Written Assessment".into(),
            time_complete: 1_700_000_000,
            attempt_id: 42,
            status: OutboxStatus::Pending,
            time_added,
            delivery_type: DeliveryType::CompleteActivities,
        }
    }

    #[test]
    fn missing_records_are_none() {
        let store = store();
        assert!(store.user(1).unwrap().is_none());
        assert!(store.course(1).unwrap().is_none());
        assert!(store.assessment(1).unwrap().is_none());
        assert!(store.attempt(1).unwrap().is_none());
        assert!(store.queue_entry(1).unwrap().is_none());
    }

    #[test]
    fn attempt_by_number_respects_finished_filter() {
        let store = store();
        store.insert_attempt(&attempt(1, 1, AttemptState::InProgress)).unwrap();
        assert!(store.attempt_by_number(5, 3, 1, true).unwrap().is_none());
        assert_eq!(store.attempt_by_number(5, 3, 1, false).unwrap().unwrap().id, 1);

        store.insert_attempt(&attempt(2, 1, AttemptState::Finished)).unwrap();
        assert_eq!(store.attempt_by_number(5, 3, 1, true).unwrap().unwrap().id, 2);
    }

    #[test]
    fn latest_finished_attempt_skips_previews_and_open_sittings() {
        let store = store();
        assert!(store.latest_finished_attempt(5, 3).unwrap().is_none());

        store.insert_attempt(&attempt(1, 1, AttemptState::Finished)).unwrap();
        store.insert_attempt(&attempt(2, 2, AttemptState::Finished)).unwrap();
        store.insert_attempt(&attempt(3, 3, AttemptState::InProgress)).unwrap();
        store
            .insert_attempt(&Attempt {
                preview: true,
                ..attempt(4, 4, AttemptState::Finished)
            })
            .unwrap();

        assert_eq!(store.latest_finished_attempt(5, 3).unwrap().unwrap().id, 2);
        assert!(store.latest_finished_attempt(5, 4).unwrap().is_none());
    }

    #[test]
    fn queue_entry_is_unique_per_attempt() {
        let store = store();
        let entry = AssessorQueueEntry {
            attempt_id: 100,
            prior_attempt_id: None,
            assignee: Some(7),
            attempt_number: 1,
            state: QueueState::Pending,
            time_start: 10,
            time_finish: None,
        };
        assert!(store.insert_queue_entry(&entry).unwrap());
        let second = AssessorQueueEntry {
            assignee: Some(8),
            ..entry.clone()
        };
        assert!(!store.insert_queue_entry(&second).unwrap());
        assert_eq!(store.queue_entry(100).unwrap().unwrap().assignee, Some(7));
    }

    #[test]
    fn finished_queue_entry_cannot_be_finished_again() {
        let store = store();
        let entry = AssessorQueueEntry {
            attempt_id: 100,
            prior_attempt_id: Some(99),
            assignee: None,
            attempt_number: 2,
            state: QueueState::Pending,
            time_start: 10,
            time_finish: None,
        };
        store.insert_queue_entry(&entry).unwrap();

        assert!(store.reconcile_queue_prior(100, 98).unwrap());
        assert!(!store.reconcile_queue_prior(100, 98).unwrap());
        assert!(store.finish_queue_entry(100, 7, 20).unwrap());
        assert!(!store.finish_queue_entry(100, 8, 30).unwrap());
        assert!(!store.reconcile_queue_prior(100, 97).unwrap());

        let stored = store.queue_entry(100).unwrap().unwrap();
        assert_eq!(stored.state, QueueState::Finished);
        assert_eq!(stored.assignee, Some(7));
        assert_eq!(stored.time_finish, Some(20));
        assert_eq!(stored.prior_attempt_id, Some(98));
    }

    #[test]
    fn override_is_never_lowered() {
        let store = store();
        assert_eq!(
            store.raise_override(5, 3, 2).unwrap(),
            AllowanceChange::Created { permitted: 2 }
        );
        assert_eq!(
            store.raise_override(5, 3, 4).unwrap(),
            AllowanceChange::Raised { from: 2, to: 4 }
        );
        assert_eq!(
            store.raise_override(5, 3, 3).unwrap(),
            AllowanceChange::Unchanged { permitted: 4 }
        );
        assert_eq!(
            store.override_allowance(5, 3).unwrap().unwrap().permitted_attempts,
            4
        );
    }

    #[test]
    fn pending_outbox_key_is_unique() {
        let store = store();
        assert!(store.insert_outbox_record(&outbox(100)).unwrap());
        assert!(!store.insert_outbox_record(&outbox(200)).unwrap());

        let pending = store.pending_outbox().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].time_added, 100);
        assert_eq!(pending[0].delivery_type, DeliveryType::CompleteActivities);

        let other_type = OutboxRecord {
            delivery_type: DeliveryType::QuizAttempts,
            ..outbox(300)
        };
        assert!(store.insert_outbox_record(&other_type).unwrap());
    }

    #[test]
    fn grading_snapshot_orders_questions_and_steps() {
        let store = store();
        let a = attempt(1, 1, AttemptState::Finished);
        store.insert_attempt(&a).unwrap();
        for (id, slot) in [(2, 2), (1, 1)] {
            store
                .insert_question_attempt(&QuestionAttempt {
                    id,
                    usage_id: a.usage_id,
                    question_id: 70 + id,
                    slot,
                    behaviour: "manualgraded".into(),
                })
                .unwrap();
        }
        for (id, sequence, tag) in [(11, 1, "needsgrading"), (10, 0, "todo")] {
            store
                .insert_step(&GradingStep {
                    id,
                    question_attempt_id: 1,
                    sequence,
                    state: GradingState::from_tag(tag),
                    fraction: None,
                    time_created: 100 + id,
                    user_id: 3,
                })
                .unwrap();
        }
        store
            .annotate_step(11, &StepAnnotation::new("-comment", "see me"))
            .unwrap();

        let grading = store.attempt_grading(&a).unwrap();
        assert_eq!(grading.questions.len(), 2);
        assert_eq!(grading.questions[0].question.slot, 1);
        let steps = &grading.questions[0].steps;
        assert_eq!(steps[0].step.state, GradingState::Unknown("todo".into()));
        assert_eq!(steps[1].step.state, GradingState::NeedsGrading);
        assert_eq!(steps[1].annotations[0].value, "see me");
    }

    #[test]
    fn grader_role_and_completion_lookups() {
        let store = store();
        store.assign_role(7, 11).unwrap();
        store.assign_role(8, 5).unwrap();
        assert!(store.is_grader(7).unwrap());
        assert!(!store.is_grader(8).unwrap());

        let id = store.record_completion(5, 3, 0, 100).unwrap();
        assert!(!store.has_full_completion(5, 3).unwrap());
        assert_eq!(store.record_completion(5, 3, 1, 200).unwrap(), id);
        assert!(store.has_full_completion(5, 3).unwrap());

        let completion = store.completion(id).unwrap().unwrap();
        assert_eq!((completion.assessment_id, completion.learner_id), (5, 3));
        assert_eq!((completion.state, completion.time_modified), (1, 200));
        assert!(store.completion(id + 1).unwrap().is_none());
    }

    #[test]
    fn rpl_credit_needs_a_non_empty_note() {
        let store = store();
        assert!(!store.has_rpl_credit(9, 5, 3).unwrap());
        store.record_criteria_completion(9, 5, 3, "  ").unwrap();
        assert!(!store.has_rpl_credit(9, 5, 3).unwrap());
        store.record_criteria_completion(9, 5, 3, "Recognised prior learning").unwrap();
        assert!(store.has_rpl_credit(9, 5, 3).unwrap());
        assert!(!store.has_rpl_credit(9, 5, 4).unwrap());
    }
}
