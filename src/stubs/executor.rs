use std::time::Duration;

use crate::core::{
    domain::{Artifact, CompilationLimits, ExecutionLimits, Language},
    traits::executor::{CompileError, Compiled, Executor, RunError, RunResult},
};

/// Executor that answers every call with fixed results after a delay.
#[derive(Debug, Clone)]
pub struct ExecutorStub {
    compiled: Result<(), CompileError>,
    run: Result<RunResult, RunError>,
    delay: Duration,
}

impl ExecutorStub {
    pub fn new(
        compiled: Result<(), CompileError>,
        run: Result<RunResult, RunError>,
        delay: Duration,
    ) -> Self {
        Self {
            compiled,
            run,
            delay,
        }
    }

    /// Compiles anything and prints `stdout` on every run.
    pub fn printing(stdout: &str, delay: Duration) -> Self {
        Self::new(
            Ok(()),
            Ok(RunResult {
                status: Some(0),
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                execution_time_ms: delay.as_millis() as u64,
            }),
            delay,
        )
    }
}

#[async_trait::async_trait]
impl Executor for ExecutorStub {
    #[tracing::instrument(skip(self, _source))]
    async fn compile(
        &self,
        _source: &str,
        language: &Language,
        limits: &CompilationLimits,
    ) -> Result<Compiled, CompileError> {
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Compilation result: {:?}", self.compiled);

        self.compiled.clone().map(|_| Compiled {
            artifact: Artifact::at("stub"),
            diagnostics: String::new(),
        })
    }

    #[tracing::instrument(skip(self, _stdin))]
    async fn run(
        &self,
        artifact: &Artifact,
        _stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> Result<RunResult, RunError> {
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution result: {:?}", self.run);

        self.run.clone()
    }
}
