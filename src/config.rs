use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_COMPILE_TIMEOUT_MS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_REMOTE_TIMEOUT_MS,
};
use crate::core::compile::UnsupportedLanguagePolicy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Connection settings for the external judge server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJudgeConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub fixtures_root: PathBuf,
    /// First fixture number, 0 or 1.
    pub fixture_first_index: u32,
    pub c_compiler: PathBuf,
    pub compile_timeout_ms: u64,
    pub work_dir: PathBuf,
    pub max_output_bytes: u64,
    pub test_parallelism: usize,
    pub remote: Option<RemoteJudgeConfig>,
    pub eval_workers: usize,
    pub eval_queue_capacity: usize,
    pub unsupported_language_policy: UnsupportedLanguagePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fixtures_root: PathBuf::from("./problems"),
            fixture_first_index: 1,
            c_compiler: PathBuf::from("gcc"),
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            work_dir: std::env::temp_dir(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            test_parallelism: 1,
            remote: None,
            eval_workers: 4,
            eval_queue_capacity: 64,
            unsupported_language_policy: UnsupportedLanguagePolicy::Reject,
        }
    }
}

impl AppConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let fixture_first_index = parse_or(&get, "FIXTURE_FIRST_INDEX", defaults.fixture_first_index)?;
        if fixture_first_index > 1 {
            return Err(ConfigError::Invalid {
                key: "FIXTURE_FIRST_INDEX",
                value: fixture_first_index.to_string(),
                reason: "must be 0 or 1".to_string(),
            });
        }

        let remote = match get("JUDGE_SERVER_URL") {
            Some(base_url) => Some(RemoteJudgeConfig {
                base_url,
                token: get("JUDGE_SERVER_TOKEN").ok_or(ConfigError::Missing("JUDGE_SERVER_TOKEN"))?,
                timeout: Duration::from_millis(parse_or(
                    &get,
                    "JUDGE_SERVER_TIMEOUT_MS",
                    DEFAULT_REMOTE_TIMEOUT_MS,
                )?),
            }),
            None => None,
        };

        let unsupported_language_policy = match get("UNSUPPORTED_LANGUAGE_POLICY").as_deref() {
            None => defaults.unsupported_language_policy,
            Some("reject") => UnsupportedLanguagePolicy::Reject,
            Some("default-credit") => UnsupportedLanguagePolicy::DefaultCredit,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "UNSUPPORTED_LANGUAGE_POLICY",
                    value: other.to_string(),
                    reason: "expected reject or default-credit".to_string(),
                });
            }
        };

        Ok(Self {
            fixtures_root: get("FIXTURES_ROOT").map_or(defaults.fixtures_root, PathBuf::from),
            fixture_first_index,
            c_compiler: get("C_COMPILER").map_or(defaults.c_compiler, PathBuf::from),
            compile_timeout_ms: parse_or(&get, "COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms)?,
            work_dir: get("WORK_DIR").map_or(defaults.work_dir, PathBuf::from),
            max_output_bytes: parse_or(&get, "MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
            test_parallelism: parse_or(&get, "TEST_PARALLELISM", defaults.test_parallelism)?.max(1),
            remote,
            eval_workers: parse_or(&get, "EVAL_WORKERS", defaults.eval_workers)?.max(1),
            eval_queue_capacity: parse_or(&get, "EVAL_QUEUE_CAPACITY", defaults.eval_queue_capacity)?
                .max(1),
            unsupported_language_policy,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
