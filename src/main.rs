use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use classjudge::config::AppConfig;
use classjudge::core::compile::CompilerStage;
use classjudge::core::domain::{CompilationLimits, Language, Problem, ScoreMethod, SubmissionIntake};
use classjudge::core::evaluator::Evaluator;
use classjudge::core::fixtures::FixtureLoader;
use classjudge::core::judging::{FallbackJudge, LocalJudge};
use classjudge::core::pipeline::queue::EvaluationQueue;
use classjudge::core::sandbox::LocalSandbox;
use classjudge::core::traits::judge::Judge;
use classjudge::native::executor::NativeExecutor;
use classjudge::remote::client::RemoteJudge;
use classjudge::storage::memory::MemoryStore;

#[derive(Parser, Debug)]
#[command(name = "classjudge", version, about = "Compile, run and score C submissions against fixtures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one source file and print the scored submission as JSON.
    Judge {
        /// Directory holding the numbered .in/.out fixture pairs.
        #[arg(long)]
        problem_dir: PathBuf,
        #[arg(long)]
        source: PathBuf,
        #[arg(long, default_value = "c")]
        language: String,
        /// Per-test wall-clock limit in milliseconds.
        #[arg(long)]
        time_limit: Option<u64>,
        #[arg(long, default_value_t = 20)]
        code_check_score: u32,
        #[arg(long, default_value_t = 80)]
        runtime_score: u32,
    },
    /// Print the decoded fixtures of a problem directory as JSON.
    Fixtures {
        #[arg(long)]
        problem_dir: PathBuf,
    },
}

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);

    match cli.command {
        Command::Judge {
            problem_dir,
            source,
            language,
            time_limit,
            code_check_score,
            runtime_score,
        } => {
            let (fixtures_root, data_path) = split_problem_dir(&problem_dir)?;
            let code = tokio::fs::read_to_string(&source).await?;

            let store = Arc::new(MemoryStore::new());
            store.add_problem(Problem {
                id: 1,
                name: data_path.clone(),
                time_limit_ms: time_limit,
                memory_limit_bytes: None,
                data_path: Some(data_path),
                code_check_score,
                runtime_score,
                score_method: ScoreMethod::Sum,
            });

            let evaluator = build_evaluator(&config, fixtures_root, store.clone());
            let queue = EvaluationQueue::start(evaluator, config.eval_workers, config.eval_queue_capacity);
            let handle = queue
                .enqueue(SubmissionIntake {
                    user_id: 0,
                    problem_id: 1,
                    exercise_id: None,
                    code,
                    language: Language::from(language.as_str()),
                })
                .await?;
            let submission = handle.wait().await;

            tracing::info!("Submission finished with status {}", submission.status);
            println!("{}", serde_json::to_string_pretty(&submission)?);
        }
        Command::Fixtures { problem_dir } => {
            let (fixtures_root, data_path) = split_problem_dir(&problem_dir)?;
            let loader = FixtureLoader::new(fixtures_root, config.fixture_first_index);
            let previews = loader.preview(Some(&data_path)).await?;
            println!("{}", serde_json::to_string_pretty(&previews)?);
        }
    }

    Ok(())
}

fn build_evaluator(config: &AppConfig, fixtures_root: PathBuf, store: Arc<MemoryStore>) -> Evaluator {
    let executor = Arc::new(NativeExecutor::new(
        &config.work_dir,
        &config.c_compiler,
        config.max_output_bytes,
    ));

    let local = LocalJudge::new(
        FixtureLoader::new(fixtures_root, config.fixture_first_index),
        LocalSandbox::new(executor.clone(), config.test_parallelism),
        Some(config.max_output_bytes),
    );
    let judge: Arc<dyn Judge> = match &config.remote {
        Some(remote) => Arc::new(FallbackJudge::new(
            Arc::new(local),
            Arc::new(RemoteJudge::new(&remote.base_url, &remote.token, remote.timeout)),
        )),
        None => Arc::new(local),
    };

    let compiler = CompilerStage::new(
        executor,
        CompilationLimits {
            time_ms: Some(config.compile_timeout_ms),
        },
        config.unsupported_language_policy,
    );

    Evaluator::new(compiler, judge, store.clone(), store)
}

/// The parent directory becomes the fixtures root and the last component the
/// problem's data path, which is also the remote test case id.
fn split_problem_dir(dir: &Path) -> Result<(PathBuf, String), Box<dyn std::error::Error>> {
    let dir = std::path::absolute(dir)?;
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or("problem directory has no usable name")?
        .to_string();
    let root = dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    Ok((root, name))
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
