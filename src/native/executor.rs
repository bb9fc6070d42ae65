use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{Duration, Instant, timeout};

use crate::core::{
    domain::{Artifact, CompilationLimits, ExecutionLimits, Language},
    traits::executor::{CompileError, Compiled, Executor, RunError, RunResult},
};

const SOURCE_NAME: &str = "main.c";
const EXECUTABLE_NAME: &str = "main";

/// Compiles C sources with the host compiler and runs the result as a plain
/// child process. Each compilation gets its own scratch directory that lives
/// as long as the returned artifact.
#[derive(Clone, Debug)]
pub struct NativeExecutor {
    work_dir: PathBuf,
    c_compiler: PathBuf,
    max_output_bytes: u64,
}

impl NativeExecutor {
    pub fn new<T, U>(work_dir: T, c_compiler: U, max_output_bytes: u64) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        NativeExecutor {
            work_dir: work_dir.as_ref().into(),
            c_compiler: c_compiler.as_ref().into(),
            max_output_bytes,
        }
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, CompileError> {
        std::fs::create_dir_all(&self.work_dir)
            .and_then(|_| {
                tempfile::Builder::new()
                    .prefix("classjudge-")
                    .tempdir_in(&self.work_dir)
            })
            .map_err(|e| CompileError::Internal { msg: e.to_string() })
    }
}

#[async_trait::async_trait]
impl Executor for NativeExecutor {
    #[tracing::instrument(skip(self, source))]
    async fn compile(
        &self,
        source: &str,
        language: &Language,
        limits: &CompilationLimits,
    ) -> Result<Compiled, CompileError> {
        if *language != Language::C {
            return Err(CompileError::Unsupported(language.clone()));
        }

        let workspace = self.scratch_dir()?;
        let source_path = workspace.path().join(SOURCE_NAME);
        let executable_path = workspace.path().join(EXECUTABLE_NAME);
        tokio::fs::write(&source_path, source)
            .await
            .map_err(|e| CompileError::Internal { msg: e.to_string() })?;

        let child = Command::new(&self.c_compiler)
            .arg("-Wall")
            .arg("-O2")
            .arg("-o")
            .arg(&executable_path)
            .arg(&source_path)
            .arg("-lm")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CompileError::Internal { msg: e.to_string() })?;

        let out = match limits.time_ms {
            Some(time_ms) => timeout(Duration::from_millis(time_ms), child.wait_with_output())
                .await
                .map_err(|_| CompileError::TimedOut { time_ms })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| CompileError::Internal { msg: e.to_string() })?;

        let diagnostics = String::from_utf8_lossy(&out.stderr).to_string();
        if !out.status.success() {
            return Err(CompileError::CompilationFailed { diagnostics });
        }

        tracing::debug!("Compiled {}", executable_path.display());
        Ok(Compiled {
            artifact: Artifact::new(executable_path, workspace),
            diagnostics,
        })
    }

    #[tracing::instrument(skip(self, stdin), fields(stdin_len = stdin.len()))]
    async fn run(
        &self,
        artifact: &Artifact,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> Result<RunResult, RunError> {
        let mut command = Command::new(artifact.path());
        if let Some(dir) = artifact.workspace() {
            command.current_dir(dir);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::FailedToLaunch { msg: e.to_string() })?;
        let start = Instant::now();

        // A program that never reads its input must not block the writer.
        let input = stdin.to_vec();
        let stdin_pipe = child.stdin.take();
        let feeder = tokio::spawn(async move {
            if let Some(mut pipe) = stdin_pipe {
                let _ = pipe.write_all(&input).await;
            }
        });

        let cap = limits.stdout_size_bytes.unwrap_or(self.max_output_bytes);
        let stderr_reader = tokio::spawn(read_draining(child.stderr.take(), cap));
        let stdout_pipe = child.stdout.take();

        let execution = async {
            let (stdout, overflow) = read_capped(stdout_pipe, cap).await?;
            if overflow {
                return Ok(Execution::Overflow);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(Execution::Finished(status, stdout))
        };
        let outcome = timeout(Duration::from_millis(limits.time_ms), execution).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        feeder.abort();

        let (status, stdout) = match outcome {
            Err(_) => {
                stderr_reader.abort();
                let _ = child.start_kill();
                return Err(RunError::TimedOut { execution_time_ms });
            }
            Ok(Err(e)) => {
                stderr_reader.abort();
                let _ = child.start_kill();
                return Err(RunError::FailedToLaunch { msg: e.to_string() });
            }
            Ok(Ok(Execution::Overflow)) => {
                stderr_reader.abort();
                let _ = child.start_kill();
                return Err(RunError::OutputLimitExceeded {
                    limit_bytes: cap,
                    execution_time_ms,
                });
            }
            Ok(Ok(Execution::Finished(status, stdout))) => (status, stdout),
        };

        let stderr = match stderr_reader.await {
            Ok(Ok(stderr)) => stderr,
            _ => Vec::new(),
        };

        Ok(RunResult {
            status: status.code(),
            stdout,
            stderr,
            execution_time_ms,
        })
    }
}

enum Execution {
    Finished(ExitStatus, Vec<u8>),
    Overflow,
}

/// Reads at most `cap` bytes; the flag is set when the stream had more.
async fn read_capped<R>(pipe: Option<R>, cap: u64) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    pipe.take(cap.saturating_add(1)).read_to_end(&mut buf).await?;
    let overflow = buf.len() as u64 > cap;
    buf.truncate(cap as usize);
    Ok((buf, overflow))
}

/// Keeps the first `cap` bytes and drains the rest until the pipe closes.
async fn read_draining<R>(pipe: Option<R>, cap: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    (&mut pipe).take(cap).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO: &str = "#include <stdio.h>\nint main(void) { printf(\"Hello, World!\\n\"); return 0; }\n";
    const SUM: &str = "#include <stdio.h>\nint main(void) { int a, b; scanf(\"%d %d\", &a, &b); printf(\"%d\\n\", a + b); return 0; }\n";
    const BROKEN: &str = "int main(void) { return 0 }\n";
    const WARNS: &str = "int main(void) { int unused; return 0; }\n";
    const SPIN: &str = "int main(void) { for (;;) {} }\n";
    const CRASH: &str = "int main(void) { return 3; }\n";
    const NOISY: &str = "#include <stdio.h>\nint main(void) { for (int i = 0; i < 200000; i++) fputs(\"debug line\\n\", stderr); puts(\"ok\"); return 0; }\n";
    const FLOOD: &str = "#include <stdio.h>\nint main(void) { for (;;) putchar('x'); }\n";

    fn c_compiler() -> String {
        std::env::var("C_COMPILER").unwrap_or_else(|_| "gcc".to_string())
    }

    /// `None` when no C compiler can be spawned on this host.
    fn executor(dir: &TempDir) -> Option<NativeExecutor> {
        let available = std::process::Command::new(c_compiler())
            .arg("--version")
            .output()
            .is_ok();
        if !available {
            eprintln!("skipping: {} is not available", c_compiler());
            return None;
        }
        Some(NativeExecutor::new(dir.path(), c_compiler(), 1024))
    }

    fn compile_limits() -> CompilationLimits {
        CompilationLimits { time_ms: Some(10_000) }
    }

    fn run_limits(time_ms: u64) -> ExecutionLimits {
        ExecutionLimits {
            time_ms,
            memory_bytes: 128 * 1024 * 1024,
            stdout_size_bytes: None,
        }
    }

    #[tokio::test]
    async fn test_compile_and_run() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(SUM, &Language::C, &compile_limits()).await.unwrap();
        let result = executor
            .run(&compiled.artifact, b"2 3\n", &run_limits(2000))
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.stdout, b"5\n");
    }

    #[tokio::test]
    async fn test_compile_error_keeps_diagnostics() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let result = executor.compile(BROKEN, &Language::C, &compile_limits()).await;

        let Err(CompileError::CompilationFailed { diagnostics }) = result else {
            panic!("expected compilation failure, got {:?}", result);
        };
        assert!(diagnostics.contains("error"));
    }

    #[tokio::test]
    async fn test_warnings_are_reported() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(WARNS, &Language::C, &compile_limits()).await.unwrap();

        assert!(compiled.diagnostics.contains("unused"));
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_with_artifact() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(HELLO, &Language::C, &compile_limits()).await.unwrap();
        let workspace = compiled.artifact.workspace().unwrap().to_path_buf();
        assert!(workspace.exists());

        drop(compiled);
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_failed_compilation_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let _ = executor.compile(BROKEN, &Language::C, &compile_limits()).await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_time_limit() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(SPIN, &Language::C, &compile_limits()).await.unwrap();
        let result = executor.run(&compiled.artifact, b"", &run_limits(200)).await;

        assert!(matches!(result, Err(RunError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(CRASH, &Language::C, &compile_limits()).await.unwrap();
        let result = executor.run(&compiled.artifact, b"", &run_limits(2000)).await.unwrap();

        assert_eq!(result.status, Some(3));
        assert!(!result.succeeded());
    }

    #[tokio::test]
    async fn test_output_cap() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(FLOOD, &Language::C, &compile_limits()).await.unwrap();
        let result = executor.run(&compiled.artifact, b"", &run_limits(5000)).await;

        assert!(matches!(
            result,
            Err(RunError::OutputLimitExceeded { limit_bytes: 1024, .. })
        ));
    }

    #[tokio::test]
    async fn test_stderr_flood_does_not_kill_program() {
        let dir = TempDir::new().unwrap();
        let Some(executor) = executor(&dir) else { return };

        let compiled = executor.compile(NOISY, &Language::C, &compile_limits()).await.unwrap();
        let result = executor
            .run(&compiled.artifact, b"", &run_limits(10_000))
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.stdout, b"ok\n");
        assert_eq!(result.stderr.len(), 1024);
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let dir = TempDir::new().unwrap();
        let executor = NativeExecutor::new(dir.path(), "gcc", 1024);

        let result = executor
            .compile("print(1)", &Language::from("python"), &compile_limits())
            .await;

        assert!(matches!(result, Err(CompileError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_compiler_not_found() {
        let dir = TempDir::new().unwrap();
        let executor = NativeExecutor::new(dir.path(), "/nonexistent/cc", 1024);

        let result = executor.compile(HELLO, &Language::C, &compile_limits()).await;

        assert!(matches!(result, Err(CompileError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = TempDir::new().unwrap();
        let executor = NativeExecutor::new(dir.path(), "gcc", 1024);

        let result = executor
            .run(&Artifact::at(dir.path().join("nope")), b"", &run_limits(1000))
            .await;

        assert!(matches!(result, Err(RunError::FailedToLaunch { .. })));
    }
}
