use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::domain::{Artifact, CompilationLimits, Language, StageReport};
use crate::core::errors::EvaluationError;
use crate::core::traits::executor::{CompileError, Executor};

/// What to do with a language the executor cannot build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnsupportedLanguagePolicy {
    /// Fail the code check with an explicit "not supported" message.
    #[default]
    Reject,
    /// Award the full code-check budget without compiling.
    DefaultCredit,
}

#[derive(Clone, Debug)]
pub struct CompileReport {
    pub stage: StageReport,
    pub artifact: Option<Artifact>,
}

impl CompileReport {
    pub fn passed(&self) -> bool {
        self.stage.passed
    }
}

/// Code-check stage: full budget when the source builds, zero otherwise.
#[derive(Clone, Debug)]
pub struct CompilerStage {
    executor: Arc<dyn Executor>,
    limits: CompilationLimits,
    policy: UnsupportedLanguagePolicy,
}

impl CompilerStage {
    pub fn new(
        executor: Arc<dyn Executor>,
        limits: CompilationLimits,
        policy: UnsupportedLanguagePolicy,
    ) -> Self {
        Self {
            executor,
            limits,
            policy,
        }
    }

    /// Compilation failures are reported in the stage; a compiler that cannot
    /// be run at all is an `EvaluationError`.
    #[tracing::instrument(skip(self, source))]
    pub async fn compile(
        &self,
        source: &str,
        language: &Language,
        budget: u32,
    ) -> Result<CompileReport, EvaluationError> {
        let result = self.executor.compile(source, language, &self.limits).await;
        tracing::debug!("Compilation result: {:?}", result.as_ref().map(|c| &c.diagnostics));

        let report = match result {
            Ok(compiled) => CompileReport {
                stage: StageReport {
                    passed: true,
                    score: budget,
                    message: success_message(&compiled.diagnostics),
                },
                artifact: Some(compiled.artifact),
            },
            Err(CompileError::CompilationFailed { diagnostics }) => failed(format!(
                "Compilation error: {}",
                diagnostics
            )),
            Err(CompileError::TimedOut { time_ms }) => {
                failed(format!("Compilation exceeded the {} ms limit", time_ms))
            }
            Err(CompileError::Unsupported(language)) => match self.policy {
                UnsupportedLanguagePolicy::Reject => {
                    failed(format!("Language {} is not supported", language))
                }
                UnsupportedLanguagePolicy::DefaultCredit => CompileReport {
                    stage: StageReport {
                        passed: true,
                        score: budget,
                        message: format!(
                            "Language {} is not supported for code checks, default credit given",
                            language
                        ),
                    },
                    artifact: None,
                },
            },
            Err(CompileError::Internal { msg }) => return Err(EvaluationError::Toolchain(msg)),
        };

        Ok(report)
    }
}

fn success_message(diagnostics: &str) -> String {
    if diagnostics.trim().is_empty() {
        "Compiled successfully".to_string()
    } else {
        format!("Compiled successfully with warnings:\n{}", diagnostics)
    }
}

fn failed(message: String) -> CompileReport {
    CompileReport {
        stage: StageReport {
            passed: false,
            score: 0,
            message,
        },
        artifact: None,
    }
}
