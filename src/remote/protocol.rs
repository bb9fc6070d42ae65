use serde::{Deserialize, Serialize};

use crate::core::domain::{JudgeSource, Language, Problem, TestVerdict, Verdict};
use crate::core::traits::judge::JudgeOutcome;

/// Error texts the judge server uses when it has no fixtures for a problem.
pub const MISSING_FIXTURE_MARKERS: [&str; 2] = ["Test case not found", "No such file or directory"];

const COMPILE_ERROR_KIND: &str = "CompileError";

const RUN_ENV: [&str; 3] = ["LANG=en_US.UTF-8", "LANGUAGE=en_US:en", "LC_ALL=en_US.UTF-8"];

#[derive(Debug, Serialize)]
pub struct JudgeRequest<'a> {
    pub src: &'a str,
    pub language_config: LanguageConfig,
    pub max_cpu_time: u64,
    pub max_memory: u64,
    pub test_case_id: &'a str,
    pub output: bool,
}

impl<'a> JudgeRequest<'a> {
    pub fn new(src: &'a str, language_config: LanguageConfig, problem: &Problem, test_case_id: &'a str) -> Self {
        Self {
            src,
            language_config,
            max_cpu_time: problem.effective_time_limit_ms(),
            max_memory: problem.effective_memory_limit_bytes(),
            test_case_id,
            output: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LanguageConfig {
    pub compile: CompileConfig,
    pub run: RunConfig,
}

#[derive(Debug, Serialize)]
pub struct CompileConfig {
    pub src_name: &'static str,
    pub exe_name: &'static str,
    pub max_cpu_time: u64,
    pub max_real_time: u64,
    pub max_memory: u64,
    pub compile_command: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub command: &'static str,
    pub seccomp_rule: &'static str,
    pub env: &'static [&'static str],
}

impl LanguageConfig {
    /// `None` for languages the judge server has no profile for.
    pub fn for_language(language: &Language) -> Option<Self> {
        let (src_name, compile_command) = match language {
            Language::C => (
                "main.c",
                "/usr/bin/gcc -DONLINE_JUDGE -O2 -w -fmax-errors=3 -std=c99 {src_path} -lm -o {exe_path}",
            ),
            Language::Cpp => (
                "main.cpp",
                "/usr/bin/g++ -DONLINE_JUDGE -O2 -w -fmax-errors=3 -std=c++14 {src_path} -lm -o {exe_path}",
            ),
            Language::Other(_) => return None,
        };
        Some(Self {
            compile: CompileConfig {
                src_name,
                exe_name: "main",
                max_cpu_time: 3000,
                max_real_time: 5000,
                max_memory: 128 * 1024 * 1024,
                compile_command,
            },
            run: RunConfig {
                command: "{exe_path}",
                seccomp_rule: "c_cpp",
                env: &RUN_ENV,
            },
        })
    }
}

/// `{err, data}` wrapper around every judge server reply.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub err: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RemoteCase {
    result: i64,
    #[serde(default)]
    test_case: Option<String>,
    #[serde(default)]
    real_time: Option<u64>,
}

pub fn verdict_for_code(code: i64) -> Verdict {
    match code {
        0 => Verdict::Passed,
        -1 => Verdict::OutputMismatch,
        1 | 2 => Verdict::Timeout,
        _ => Verdict::RuntimeError,
    }
}

pub fn interpret(envelope: Envelope) -> JudgeOutcome {
    let Some(kind) = envelope.err else {
        return interpret_cases(envelope.data);
    };

    let detail = match &envelope.data {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };

    if MISSING_FIXTURE_MARKERS
        .iter()
        .any(|marker| kind.contains(marker) || detail.contains(marker))
    {
        return JudgeOutcome::FixturesAbsent {
            source: JudgeSource::Remote,
            message: "Remote test cases not found, full runtime credit given".to_string(),
        };
    }

    if kind == COMPILE_ERROR_KIND {
        return JudgeOutcome::Verdicts {
            source: JudgeSource::Remote,
            tests: vec![TestVerdict {
                message: Some(detail),
                ..TestVerdict::new(1, Verdict::CompileError)
            }],
        };
    }

    JudgeOutcome::ServiceFailure {
        source: JudgeSource::Remote,
        message: format!("Judge server error {}: {}", kind, detail),
    }
}

fn interpret_cases(data: serde_json::Value) -> JudgeOutcome {
    let cases: Vec<RemoteCase> = match serde_json::from_value(data) {
        Ok(cases) => cases,
        Err(err) => {
            return JudgeOutcome::ServiceFailure {
                source: JudgeSource::Remote,
                message: format!("Malformed judge server response: {}", err),
            };
        }
    };

    let tests = cases
        .into_iter()
        .enumerate()
        .map(|(position, case)| {
            let index = case
                .test_case
                .as_deref()
                .and_then(|name| name.parse().ok())
                .unwrap_or(position as u32 + 1);
            TestVerdict {
                elapsed_ms: case.real_time,
                ..TestVerdict::new(index, verdict_for_code(case.result))
            }
        })
        .collect();

    JudgeOutcome::Verdicts {
        source: JudgeSource::Remote,
        tests,
    }
}
