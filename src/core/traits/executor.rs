use crate::core::domain::{Artifact, CompilationLimits, ExecutionLimits, Language};

/// Builds and runs submissions on some substrate (native processes, a stub).
#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    async fn compile(
        &self,
        source: &str,
        language: &Language,
        limits: &CompilationLimits,
    ) -> Result<Compiled, CompileError>;

    async fn run(
        &self,
        artifact: &Artifact,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> Result<RunResult, RunError>;
}

#[derive(Debug, Clone)]
pub struct Compiled {
    pub artifact: Artifact,
    /// Compiler stderr, warnings included. Empty for a clean build.
    pub diagnostics: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("Compilation failed")]
    CompilationFailed { diagnostics: String },
    #[error("Compilation exceeded {time_ms} ms")]
    TimedOut { time_ms: u64 },
    #[error("Language {0} is not supported")]
    Unsupported(Language),
    #[error("Compiler could not be run: {msg}")]
    Internal { msg: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code, `None` when the process was ended by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub execution_time_ms: u64,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error("Time limit exceeded after {execution_time_ms} ms")]
    TimedOut { execution_time_ms: u64 },
    #[error("Output exceeded {limit_bytes} bytes")]
    OutputLimitExceeded { limit_bytes: u64, execution_time_ms: u64 },
    #[error("Failed to launch: {msg}")]
    FailedToLaunch { msg: String },
}
