use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::core::compile::{CompileReport, CompilerStage};
use crate::core::domain::{
    EvaluationReport, ExerciseWindow, JudgeSource, Problem, RuntimeReport, ScoreBreakdown,
    Submission, SubmissionIntake, SubmissionStatus,
};
use crate::core::errors::{EvaluationError, IntakeError};
use crate::core::scoring;
use crate::core::traits::judge::{Judge, JudgeInput, JudgeOutcome};
use crate::core::traits::store::{ProblemCatalog, SubmissionStore};

/// Drives one submission from `Pending` to a terminal status.
///
/// `intake` validates preconditions and persists the `Pending` row; it is the
/// only step that can fail towards the caller. `evaluate` always returns a
/// terminal submission and writes it exactly once.
#[derive(Clone, Debug)]
pub struct Evaluator {
    compiler: CompilerStage,
    judge: Arc<dyn Judge>,
    store: Arc<dyn SubmissionStore>,
    catalog: Arc<dyn ProblemCatalog>,
}

type Conclusion = (SubmissionStatus, ScoreBreakdown, EvaluationReport);

impl Evaluator {
    pub fn new(
        compiler: CompilerStage,
        judge: Arc<dyn Judge>,
        store: Arc<dyn SubmissionStore>,
        catalog: Arc<dyn ProblemCatalog>,
    ) -> Self {
        Self {
            compiler,
            judge,
            store,
            catalog,
        }
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    /// Intake followed by evaluation, in the caller's task.
    pub async fn submit(&self, intake: SubmissionIntake) -> Result<Submission, IntakeError> {
        let (problem, submission) = self.intake(intake).await?;
        Ok(self.evaluate(&problem, submission).await)
    }

    #[tracing::instrument(skip(self, intake), fields(user = intake.user_id, problem = intake.problem_id))]
    pub async fn intake(&self, intake: SubmissionIntake) -> Result<(Problem, Submission), IntakeError> {
        let problem = self
            .catalog
            .problem(intake.problem_id)
            .await?
            .ok_or(IntakeError::UnknownProblem(intake.problem_id))?;

        let now = chrono::Utc::now();
        if let Some(exercise_id) = intake.exercise_id {
            let exercise = self
                .catalog
                .exercise(exercise_id)
                .await?
                .ok_or(IntakeError::UnknownExercise(exercise_id))?;
            match exercise.window_at(now) {
                ExerciseWindow::NotStarted => return Err(IntakeError::ExerciseNotStarted(exercise_id)),
                ExerciseWindow::Closed => return Err(IntakeError::ExerciseClosed(exercise_id)),
                ExerciseWindow::Open => {}
            }
        }

        let submission = self.store.create(Submission::pending(intake, now)).await?;
        tracing::debug!("Submission {} recorded as pending", submission.id);
        Ok((problem, submission))
    }

    #[tracing::instrument(skip(self, problem, submission), fields(submission = submission.id, problem = problem.id))]
    pub async fn evaluate(&self, problem: &Problem, submission: Submission) -> Submission {
        let outcome = AssertUnwindSafe(self.run_stages(problem, &submission))
            .catch_unwind()
            .await;

        let concluded = match outcome {
            Ok(Ok((status, scores, report))) => submission.conclude(status, &scores, report),
            Ok(Err(err)) => system_error(&submission, &err),
            Err(panic) => system_error(&submission, &EvaluationError::Panic(panic_message(panic))),
        };

        let concluded = self.persist(concluded).await;
        tracing::info!(
            status = %concluded.status,
            total_score = concluded.total_score,
            "Submission evaluated"
        );
        concluded
    }

    /// Concludes a submission that will never be evaluated.
    pub async fn abandon(&self, submission: Submission, err: EvaluationError) -> Submission {
        self.persist(system_error(&submission, &err)).await
    }

    /// Writes the terminal row. A failed write is noted in `result.error` so
    /// the returned value never claims a state the store does not hold.
    async fn persist(&self, mut concluded: Submission) -> Submission {
        if let Err(err) = self.store.update(&concluded).await {
            tracing::error!("Failed to persist submission {}: {}", concluded.id, err);
            let note = format!("Result was not saved: {}", err);
            let report = concluded.result.get_or_insert_with(EvaluationReport::default);
            report.error = Some(match report.error.take() {
                Some(previous) => format!("{}; {}", previous, note),
                None => note,
            });
        }
        concluded
    }

    async fn run_stages(&self, problem: &Problem, submission: &Submission) -> Result<Conclusion, EvaluationError> {
        let compiled = self
            .compiler
            .compile(&submission.code, &submission.language, problem.code_check_score)
            .await?;

        if !compiled.passed() {
            return Ok(compilation_failed(compiled));
        }

        let input = JudgeInput {
            code: submission.code.clone(),
            language: submission.language.clone(),
            artifact: compiled.artifact.clone(),
        };
        let outcome = self.judge.judge(problem, &input).await?;
        tracing::debug!("Judge outcome: {:?}", outcome);

        let (status, scores, runtime) = score_outcome(problem, compiled.stage.score, outcome);
        Ok((
            status,
            scores,
            EvaluationReport {
                code_check: Some(compiled.stage),
                runtime: Some(runtime),
                error: None,
            },
        ))
    }
}

fn compilation_failed(compiled: CompileReport) -> Conclusion {
    let scores = scoring::compile_only(compiled.stage.score);
    let report = EvaluationReport {
        code_check: Some(compiled.stage),
        runtime: Some(RuntimeReport {
            passed: false,
            score: 0,
            message: "Compilation failed, tests were not run".to_string(),
            passed_count: 0,
            total_count: 0,
            source: JudgeSource::None,
            tests: Vec::new(),
        }),
        error: None,
    };
    (SubmissionStatus::CompilationError, scores, report)
}

fn score_outcome(
    problem: &Problem,
    code_check_score: u32,
    outcome: JudgeOutcome,
) -> (SubmissionStatus, ScoreBreakdown, RuntimeReport) {
    match outcome {
        JudgeOutcome::Verdicts { source, tests } => {
            let total = tests.len() as u32;
            let passed = tests.iter().filter(|t| t.verdict.is_passed()).count() as u32;
            let scores = scoring::breakdown(code_check_score, problem.runtime_score, passed, total);
            let status = scoring::status_for(&scores);
            let message = match (passed, total) {
                (_, 0) => "No test cases, full runtime credit given".to_string(),
                (p, t) if p == t => format!("Passed all tests ({}/{})", p, t),
                (0, t) => format!("No tests passed (0/{})", t),
                (p, t) => format!("Passed some tests ({}/{})", p, t),
            };
            let report = RuntimeReport {
                passed: status == SubmissionStatus::Accepted,
                score: scores.runtime_score,
                message,
                passed_count: passed,
                total_count: total,
                source,
                tests,
            };
            (status, scores, report)
        }
        JudgeOutcome::FixturesAbsent { source, message } => {
            let scores = scoring::breakdown(code_check_score, problem.runtime_score, 0, 0);
            let report = RuntimeReport {
                passed: true,
                score: scores.runtime_score,
                message,
                passed_count: 0,
                total_count: 0,
                source,
                tests: Vec::new(),
            };
            (SubmissionStatus::Accepted, scores, report)
        }
        JudgeOutcome::NotApplicable { message } => {
            runtime_failure(code_check_score, JudgeSource::None, message)
        }
        JudgeOutcome::ServiceFailure { source, message } => {
            tracing::warn!("Judging service failed: {}", message);
            runtime_failure(code_check_score, source, message)
        }
    }
}

fn runtime_failure(
    code_check_score: u32,
    source: JudgeSource,
    message: String,
) -> (SubmissionStatus, ScoreBreakdown, RuntimeReport) {
    let scores = scoring::compile_only(code_check_score);
    let report = RuntimeReport {
        passed: false,
        score: 0,
        message,
        passed_count: 0,
        total_count: 0,
        source,
        tests: Vec::new(),
    };
    (SubmissionStatus::WrongAnswer, scores, report)
}

fn system_error(submission: &Submission, err: &EvaluationError) -> Submission {
    tracing::error!("System error while evaluating submission {}: {}", submission.id, err);
    submission.conclude(
        SubmissionStatus::SystemError,
        &scoring::zeroed(),
        EvaluationReport {
            code_check: None,
            runtime: None,
            error: Some(err.to_string()),
        },
    )
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
