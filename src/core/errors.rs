use crate::core::domain::{ExerciseId, ProblemId, SubmissionId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Submission {0} does not exist")]
    MissingSubmission(SubmissionId),
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Rejections that happen before any evaluation work starts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntakeError {
    #[error("Problem {0} does not exist")]
    UnknownProblem(ProblemId),
    #[error("Exercise {0} does not exist")]
    UnknownExercise(ExerciseId),
    #[error("Exercise {0} has not started yet")]
    ExerciseNotStarted(ExerciseId),
    #[error("Exercise {0} is closed for submissions")]
    ExerciseClosed(ExerciseId),
    #[error("Could not record submission: {0}")]
    Storage(#[from] StoreError),
    #[error("Evaluation queue is closed")]
    QueueClosed,
}

/// Faults raised while evaluating. They never reach the caller: the evaluator
/// turns every one of them into a `SystemError` submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluationError {
    #[error("Toolchain failure: {0}")]
    Toolchain(String),
    #[error("Fixture access failed: {0}")]
    Fixtures(String),
    #[error("Judging panicked: {0}")]
    Panic(String),
    #[error("Evaluation was interrupted: {0}")]
    Interrupted(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}
