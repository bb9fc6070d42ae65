use crate::core::domain::{
    ClassId, Exercise, ExerciseId, Participant, Problem, ProblemId, Role, Submission,
    SubmissionId, UserId,
};
use crate::core::errors::StoreError;

/// Persistence collaborator for submissions.
#[mockall::automock]
#[async_trait::async_trait]
pub trait SubmissionStore: std::fmt::Debug + Send + Sync {
    /// Persists a new submission and returns it with its assigned id.
    async fn create(&self, submission: Submission) -> Result<Submission, StoreError>;

    async fn update(&self, submission: &Submission) -> Result<(), StoreError>;

    async fn get(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;

    async fn list_for(
        &self,
        problem_id: ProblemId,
        exercise_id: ExerciseId,
    ) -> Result<Vec<Submission>, StoreError>;
}

/// Read-only view of the problem and exercise catalog.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProblemCatalog: std::fmt::Debug + Send + Sync {
    async fn problem(&self, id: ProblemId) -> Result<Option<Problem>, StoreError>;

    async fn exercise(&self, id: ExerciseId) -> Result<Option<Exercise>, StoreError>;
}

/// Membership and roles, used to build rankings.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Roster: std::fmt::Debug + Send + Sync {
    /// Students of `cohort`, or every student when `cohort` is `None`.
    async fn students(&self, cohort: Option<ClassId>) -> Result<Vec<Participant>, StoreError>;

    async fn role_of(&self, user_id: UserId) -> Result<Option<Role>, StoreError>;
}
