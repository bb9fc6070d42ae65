use crate::core::domain::{Artifact, JudgeSource, Language, Problem, TestVerdict};
use crate::core::errors::EvaluationError;

/// What a judging strategy gets to work with.
#[derive(Clone, Debug)]
pub struct JudgeInput {
    pub code: String,
    pub language: Language,
    /// `None` when nothing was built locally, e.g. a language without a
    /// local toolchain that was admitted by policy.
    pub artifact: Option<Artifact>,
}

/// Strategy that turns a submission into per-test verdicts.
///
/// Local execution, the remote judge service and their composition all sit
/// behind this trait, so the scorer never knows which one ran.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Judge: std::fmt::Debug + Send + Sync {
    async fn judge(&self, problem: &Problem, input: &JudgeInput)
    -> Result<JudgeOutcome, EvaluationError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JudgeOutcome {
    /// Every fixture was judged; the list holds one verdict per fixture.
    Verdicts {
        source: JudgeSource,
        tests: Vec<TestVerdict>,
    },
    /// No fixtures exist for the problem. Scored as full runtime credit.
    FixturesAbsent { source: JudgeSource, message: String },
    /// This strategy cannot judge the input (nothing to execute).
    NotApplicable { message: String },
    /// The judging service could not produce a result. Scored as zero.
    ServiceFailure { source: JudgeSource, message: String },
}
