use std::sync::Arc;

use crate::core::domain::{JudgeSource, Problem};
use crate::core::errors::EvaluationError;
use crate::core::fixtures::FixtureLoader;
use crate::core::sandbox::LocalSandbox;
use crate::core::traits::judge::{Judge, JudgeInput, JudgeOutcome};

/// Judges against fixtures on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalJudge {
    fixtures: FixtureLoader,
    sandbox: LocalSandbox,
    stdout_size_bytes: Option<u64>,
}

impl LocalJudge {
    pub fn new(fixtures: FixtureLoader, sandbox: LocalSandbox, stdout_size_bytes: Option<u64>) -> Self {
        Self {
            fixtures,
            sandbox,
            stdout_size_bytes,
        }
    }
}

#[async_trait::async_trait]
impl Judge for LocalJudge {
    #[tracing::instrument(skip(self, problem, input), fields(problem = problem.id))]
    async fn judge(&self, problem: &Problem, input: &JudgeInput) -> Result<JudgeOutcome, EvaluationError> {
        let test_cases = self.fixtures.load(problem.data_path.as_deref()).await?;
        if test_cases.is_empty() {
            return Ok(JudgeOutcome::FixturesAbsent {
                source: JudgeSource::Local,
                message: "No test cases, full runtime credit given".to_string(),
            });
        }

        let Some(artifact) = &input.artifact else {
            return Ok(JudgeOutcome::NotApplicable {
                message: format!("No local executable for language {}", input.language),
            });
        };

        let limits = problem.execution_limits(self.stdout_size_bytes);
        let tests = self.sandbox.run(artifact, &test_cases, &limits).await;
        Ok(JudgeOutcome::Verdicts {
            source: JudgeSource::Local,
            tests,
        })
    }
}

/// Local-first composition: the fallback judges only when the primary has no
/// fixtures or nothing it can execute.
#[derive(Clone, Debug)]
pub struct FallbackJudge {
    primary: Arc<dyn Judge>,
    fallback: Arc<dyn Judge>,
}

impl FallbackJudge {
    pub fn new(primary: Arc<dyn Judge>, fallback: Arc<dyn Judge>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait::async_trait]
impl Judge for FallbackJudge {
    async fn judge(&self, problem: &Problem, input: &JudgeInput) -> Result<JudgeOutcome, EvaluationError> {
        match self.primary.judge(problem, input).await? {
            JudgeOutcome::FixturesAbsent { message, .. } | JudgeOutcome::NotApplicable { message } => {
                tracing::debug!("Primary judge declined ({}), using fallback", message);
                self.fallback.judge(problem, input).await
            }
            outcome => Ok(outcome),
        }
    }
}
