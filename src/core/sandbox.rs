use std::sync::Arc;

use futures::StreamExt;
use futures::stream;

use crate::constants::DIAGNOSTIC_PREVIEW_CHARS;
use crate::core::compare;
use crate::core::domain::{Artifact, ExecutionLimits, TestCase, TestVerdict, Verdict};
use crate::core::normalize::{decode, preview};
use crate::core::traits::executor::{Executor, RunError, RunResult};

/// Runs a compiled artifact once per fixture and classifies each run.
///
/// The time limit applies to every run separately. A failing run never stops
/// the remaining ones: the result always holds one verdict per test case, in
/// fixture order.
#[derive(Clone, Debug)]
pub struct LocalSandbox {
    executor: Arc<dyn Executor>,
    parallelism: usize,
}

impl LocalSandbox {
    pub fn new(executor: Arc<dyn Executor>, parallelism: usize) -> Self {
        Self {
            executor,
            parallelism: parallelism.max(1),
        }
    }

    #[tracing::instrument(skip(self, test_cases), fields(tests = test_cases.len()))]
    pub async fn run(
        &self,
        artifact: &Artifact,
        test_cases: &[TestCase],
        limits: &ExecutionLimits,
    ) -> Vec<TestVerdict> {
        let runs: Vec<_> = test_cases
            .iter()
            .map(|case| self.run_case(artifact, case, limits))
            .collect();
        stream::iter(runs)
            .buffered(self.parallelism)
            .collect()
            .await
    }

    async fn run_case(
        &self,
        artifact: &Artifact,
        case: &TestCase,
        limits: &ExecutionLimits,
    ) -> TestVerdict {
        let result = self.executor.run(artifact, &case.input, limits).await;
        let verdict = classify(case, result);
        tracing::debug!("Test {} finished: {:?}", case.index, verdict.verdict);
        verdict
    }
}

fn classify(case: &TestCase, result: Result<RunResult, RunError>) -> TestVerdict {
    match result {
        Ok(run) if run.succeeded() => match compare::compare(&case.expected, &run.stdout) {
            Some(rule) => TestVerdict {
                elapsed_ms: Some(run.execution_time_ms),
                matched_by: Some(rule),
                ..TestVerdict::new(case.index, Verdict::Passed)
            },
            None => TestVerdict {
                elapsed_ms: Some(run.execution_time_ms),
                input: Some(snippet(&case.input)),
                expected: Some(snippet(&case.expected)),
                actual: Some(snippet(&run.stdout)),
                ..TestVerdict::new(case.index, Verdict::OutputMismatch)
            },
        },
        Ok(run) => {
            let exit = match run.status {
                Some(code) => format!("Exited with status {}", code),
                None => "Terminated by a signal".to_string(),
            };
            let stderr = snippet(&run.stderr);
            let message = if stderr.trim().is_empty() {
                exit
            } else {
                format!("{}: {}", exit, stderr.trim_end())
            };
            TestVerdict {
                elapsed_ms: Some(run.execution_time_ms),
                input: Some(snippet(&case.input)),
                actual: Some(snippet(&run.stdout)),
                message: Some(message),
                ..TestVerdict::new(case.index, Verdict::RuntimeError)
            }
        }
        Err(RunError::TimedOut { execution_time_ms }) => TestVerdict {
            elapsed_ms: Some(execution_time_ms),
            input: Some(snippet(&case.input)),
            message: Some("Time limit exceeded".to_string()),
            ..TestVerdict::new(case.index, Verdict::Timeout)
        },
        Err(err @ RunError::OutputLimitExceeded { execution_time_ms, .. }) => TestVerdict {
            elapsed_ms: Some(execution_time_ms),
            input: Some(snippet(&case.input)),
            message: Some(err.to_string()),
            ..TestVerdict::new(case.index, Verdict::RuntimeError)
        },
        Err(err @ RunError::FailedToLaunch { .. }) => {
            tracing::warn!("Test {} could not start: {}", case.index, err);
            TestVerdict {
                message: Some(err.to_string()),
                ..TestVerdict::new(case.index, Verdict::RuntimeError)
            }
        }
    }
}

fn snippet(bytes: &[u8]) -> String {
    preview(&decode(bytes), DIAGNOSTIC_PREVIEW_CHARS)
}
