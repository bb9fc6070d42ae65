pub const DEFAULT_TIME_LIMIT_MS: u64 = 1000;
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 128 * 1024 * 1024;

pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;

/// Decoded fixture and output text kept in a report is cut at this many chars.
pub const DIAGNOSTIC_PREVIEW_CHARS: usize = 2048;

pub const JUDGE_TOKEN_HEADER: &str = "X-Judge-Server-Token";
