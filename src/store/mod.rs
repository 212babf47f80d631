//! Fronteira de persistência.
//!
//! Os registros de origem (usuários, cursos, avaliações, tentativas, passos de
//! avaliação) pertencem à plataforma e aqui são apenas lidos, com uma exceção:
//! os passos sintetizados ao levar notas para uma reavaliação. As tabelas da
//! própria ponte (fila de avaliadores, permissões extras, outbox) são escritas
//! por primitivas de comparar-e-inserir, para que workers concorrentes não
//! quebrem seus invariantes.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::SyncError;
use crate::model::{
    ActivityCompletion, AllowanceChange, AssessmentDescriptor, AssessmentId, AssessorQueueEntry,
    Attempt, AttemptGrading, AttemptId, CompletionId, CourseId, CourseRecord, OutboxRecord,
    OverrideAllowance, SynthesizedStep, UserId, UserRecord,
};

pub type StoreResult<T> = Result<T, SyncError>;

pub trait GradingStore: Send + Sync {
    fn user(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    fn course(&self, id: CourseId) -> StoreResult<Option<CourseRecord>>;

    fn assessment(&self, id: AssessmentId) -> StoreResult<Option<AssessmentDescriptor>>;

    fn attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>>;

    /// Tentativa mais recente com o número dado para (avaliação, aluno).
    fn attempt_by_number(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
        number: u32,
        finished_only: bool,
    ) -> StoreResult<Option<Attempt>>;

    /// Tentativa finalizada, sem preview, de maior número para (avaliação, aluno).
    fn latest_finished_attempt(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<Option<Attempt>>;

    fn completion(&self, id: CompletionId) -> StoreResult<Option<ActivityCompletion>>;

    /// Todas as questões de `attempt` (ordem de slot) com seus passos e anotações.
    fn attempt_grading(&self, attempt: &Attempt) -> StoreResult<AttemptGrading>;

    /// Se `user` possui o papel de avaliador.
    fn is_grader(&self, user: UserId) -> StoreResult<bool>;

    /// Se o aluno já tem uma conclusão com crédito total para a avaliação.
    fn has_full_completion(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<bool>;

    /// Se o aluno recebeu crédito pela avaliação fora da plataforma (uma conclusão
    /// de critério do curso com nota de reconhecimento de aprendizagem prévia).
    fn has_rpl_credit(
        &self,
        course_id: CourseId,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<bool>;

    fn queue_entry(&self, attempt_id: AttemptId) -> StoreResult<Option<AssessorQueueEntry>>;

    fn queue_entries(&self) -> StoreResult<Vec<AssessorQueueEntry>>;

    /// Insere `entry` a menos que já exista uma para a tentativa.
    /// Retorna `false` quando outro escritor chegou antes.
    fn insert_queue_entry(&self, entry: &AssessorQueueEntry) -> StoreResult<bool>;

    /// PENDING -> FINISHED. Retorna `false` se a entrada não existe ou já terminou.
    fn finish_queue_entry(
        &self,
        attempt_id: AttemptId,
        assignee: UserId,
        time_finish: i64,
    ) -> StoreResult<bool>;

    /// Substitui o id da tentativa anterior de uma entrada PENDING quando difere.
    fn reconcile_queue_prior(
        &self,
        attempt_id: AttemptId,
        prior_attempt_id: AttemptId,
    ) -> StoreResult<bool>;

    fn override_allowance(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
    ) -> StoreResult<Option<OverrideAllowance>>;

    /// Eleva o número de tentativas permitidas a pelo menos `at_least`; nunca reduz.
    fn raise_override(
        &self,
        assessment_id: AssessmentId,
        learner_id: UserId,
        at_least: u32,
    ) -> StoreResult<AllowanceChange>;

    /// Grava os passos cuja questão ainda não tem um passo corrigido manualmente
    /// como certo. Retorna quantos foram gravados.
    fn insert_synthesized_steps(&self, steps: &[SynthesizedStep]) -> StoreResult<usize>;

    /// Insere `record` a menos que exista um registro pendente com a mesma chave de dedup.
    fn insert_outbox_record(&self, record: &OutboxRecord) -> StoreResult<bool>;

    fn pending_outbox(&self) -> StoreResult<Vec<OutboxRecord>>;
}
