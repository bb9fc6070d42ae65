use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::constants::{DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_TIME_LIMIT_MS};

pub type UserId = i64;
pub type ProblemId = i64;
pub type ExerciseId = i64;
pub type SubmissionId = i64;
pub type ClassId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    C,
    Cpp,
    Other(String),
}

impl From<&str> for Language {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            other => Language::Other(other.to_string()),
        }
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Language::from(value.as_str())
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::C => write!(f, "c"),
            Language::Cpp => write!(f, "cpp"),
            Language::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Per-test aggregation policy. Only the proportional rule is applied today;
/// the value is carried so catalogs can round-trip it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    #[default]
    Sum,
    Max,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub name: String,
    pub time_limit_ms: Option<u64>,
    pub memory_limit_bytes: Option<u64>,
    /// Fixture directory, relative to the configured fixtures root.
    pub data_path: Option<String>,
    pub code_check_score: u32,
    pub runtime_score: u32,
    #[serde(default)]
    pub score_method: ScoreMethod,
}

impl Problem {
    pub fn max_score(&self) -> u32 {
        self.code_check_score + self.runtime_score
    }

    pub fn effective_time_limit_ms(&self) -> u64 {
        self.time_limit_ms
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_TIME_LIMIT_MS)
    }

    pub fn effective_memory_limit_bytes(&self) -> u64 {
        self.memory_limit_bytes
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_MEMORY_LIMIT_BYTES)
    }

    pub fn execution_limits(&self, stdout_size_bytes: Option<u64>) -> ExecutionLimits {
        ExecutionLimits {
            time_ms: self.effective_time_limit_ms(),
            memory_bytes: self.effective_memory_limit_bytes(),
            stdout_size_bytes,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExerciseWindow {
    NotStarted,
    Open,
    Closed,
}

impl Exercise {
    pub fn window_at(&self, now: DateTime<Utc>) -> ExerciseWindow {
        match (self.start_time, self.end_time) {
            (Some(start), _) if now < start => ExerciseWindow::NotStarted,
            (_, Some(end)) if now > end => ExerciseWindow::Closed,
            _ => ExerciseWindow::Open,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionIntake {
    pub user_id: UserId,
    pub problem_id: ProblemId,
    pub exercise_id: Option<ExerciseId>,
    pub code: String,
    pub language: Language,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    #[default]
    Pending,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    #[serde(rename = "System Error")]
    SystemError,
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SubmissionStatus::Pending => "Pending",
            SubmissionStatus::CompilationError => "Compilation Error",
            SubmissionStatus::SystemError => "System Error",
            SubmissionStatus::Accepted => "Accepted",
            SubmissionStatus::WrongAnswer => "Wrong Answer",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub user_id: UserId,
    pub problem_id: ProblemId,
    pub exercise_id: Option<ExerciseId>,
    pub code: String,
    pub language: Language,
    pub status: SubmissionStatus,
    pub code_check_score: u32,
    pub runtime_score: u32,
    pub total_score: u32,
    pub result: Option<EvaluationReport>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// A fresh, not yet persisted submission. The store assigns the id.
    pub fn pending(intake: SubmissionIntake, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            user_id: intake.user_id,
            problem_id: intake.problem_id,
            exercise_id: intake.exercise_id,
            code: intake.code,
            language: intake.language,
            status: SubmissionStatus::Pending,
            code_check_score: 0,
            runtime_score: 0,
            total_score: 0,
            result: None,
            submitted_at,
        }
    }

    pub fn conclude(
        &self,
        status: SubmissionStatus,
        scores: &ScoreBreakdown,
        report: EvaluationReport,
    ) -> Self {
        Self {
            status,
            code_check_score: scores.code_check_score,
            runtime_score: scores.runtime_score,
            total_score: scores.total_score,
            result: Some(report),
            ..self.clone()
        }
    }
}

/// One fixture pair. Identity is the pair index inside the problem directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub index: u32,
    pub input: Vec<u8>,
    pub expected: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    CompileError,
    Timeout,
    RuntimeError,
    OutputMismatch,
    Passed,
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

/// Which comparison rule accepted an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Exact,
    WhitespaceInsensitive,
    IndexedAssignmentValues,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVerdict {
    pub index: u32,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestVerdict {
    pub fn new(index: u32, verdict: Verdict) -> Self {
        Self {
            index,
            verdict,
            elapsed_ms: None,
            matched_by: None,
            input: None,
            expected: None,
            actual: None,
            message: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub code_check_score: u32,
    pub runtime_score: u32,
    pub total_score: u32,
    pub passed_count: u32,
    pub total_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub passed: bool,
    pub score: u32,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeSource {
    Local,
    Remote,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeReport {
    pub passed: bool,
    pub score: u32,
    pub message: String,
    pub passed_count: u32,
    pub total_count: u32,
    pub source: JudgeSource,
    pub tests: Vec<TestVerdict>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_check: Option<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CompilationLimits {
    pub time_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub time_ms: u64,
    /// Advisory only. Forwarded to the remote judge, not enforced locally.
    pub memory_bytes: u64,
    pub stdout_size_bytes: Option<u64>,
}

/// A compiled program. Holding the artifact keeps its scratch directory alive;
/// the directory is removed when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct Artifact {
    path: PathBuf,
    workspace: Option<Arc<TempDir>>,
}

impl Artifact {
    pub fn new(path: PathBuf, workspace: TempDir) -> Self {
        Self {
            path,
            workspace: Some(Arc::new(workspace)),
        }
    }

    /// An artifact that lives outside any scratch directory.
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().into(),
            workspace: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_ref().map(|dir| dir.path())
    }
}
