use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::domain::{Problem, Submission, SubmissionId, SubmissionIntake};
use crate::core::errors::{EvaluationError, IntakeError, StoreError};
use crate::core::evaluator::Evaluator;

struct Job {
    problem: Problem,
    submission: Submission,
    state_tx: watch::Sender<Submission>,
}

/// Caller's view of a queued submission.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    id: SubmissionId,
    state_rx: watch::Receiver<Submission>,
}

impl SubmissionHandle {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn current(&self) -> Submission {
        self.state_rx.borrow().clone()
    }

    /// Resolves once the submission reached a terminal status.
    pub async fn wait(mut self) -> Submission {
        let terminal = self
            .state_rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|s| s.clone());
        terminal.unwrap_or_else(|_| self.state_rx.borrow().clone())
    }
}

/// Bounded queue in front of the evaluator.
///
/// `enqueue` records the `Pending` row and returns at once; a dispatcher
/// hands jobs to at most `workers` concurrent evaluations. When every worker
/// is busy and the channel is full, `enqueue` waits.
#[derive(Debug, Clone)]
pub struct EvaluationQueue {
    evaluator: Evaluator,
    job_tx: mpsc::Sender<Job>,
    in_flight: Arc<DashMap<SubmissionId, watch::Receiver<Submission>>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("submission", &self.submission.id)
            .finish()
    }
}

impl EvaluationQueue {
    pub fn start(evaluator: Evaluator, workers: usize, capacity: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel(capacity.max(1));
        let in_flight = Arc::new(DashMap::new());
        handle_evaluations(job_rx, evaluator.clone(), workers, in_flight.clone());

        Self {
            evaluator,
            job_tx,
            in_flight,
        }
    }

    #[tracing::instrument(skip(self, intake), fields(user = intake.user_id, problem = intake.problem_id))]
    pub async fn enqueue(&self, intake: SubmissionIntake) -> Result<SubmissionHandle, IntakeError> {
        let (problem, submission) = self.evaluator.intake(intake).await?;
        let id = submission.id;
        let (state_tx, state_rx) = watch::channel(submission.clone());
        self.in_flight.insert(id, state_rx.clone());

        let job = Job {
            problem,
            submission,
            state_tx,
        };
        if let Err(mpsc::error::SendError(job)) = self.job_tx.send(job).await {
            self.in_flight.remove(&id);
            let reason = EvaluationError::Interrupted("evaluation queue is closed".to_string());
            let concluded = self.evaluator.abandon(job.submission, reason).await;
            job.state_tx.send_replace(concluded);
            return Err(IntakeError::QueueClosed);
        }

        tracing::debug!("Submission {} queued", id);
        Ok(SubmissionHandle { id, state_rx })
    }

    /// Latest known state: the live one while queued or running, otherwise
    /// the stored record.
    pub async fn poll(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        if let Some(state_rx) = self.in_flight.get(&id) {
            return Ok(Some(state_rx.borrow().clone()));
        }
        self.evaluator.store().get(id).await
    }
}

#[tracing::instrument(skip(job_rx, evaluator, in_flight))]
fn handle_evaluations(
    mut job_rx: mpsc::Receiver<Job>,
    evaluator: Evaluator,
    workers: usize,
    in_flight: Arc<DashMap<SubmissionId, watch::Receiver<Submission>>>,
) -> JoinHandle<()> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));

    tokio::spawn(async move {
        while let Some(job) = job_rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let evaluator = evaluator.clone();
            let in_flight = in_flight.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let id = job.submission.id;
                let concluded = evaluator.evaluate(&job.problem, job.submission).await;
                job.state_tx.send_replace(concluded);
                in_flight.remove(&id);
            });
        }
        tracing::debug!("Evaluation queue closed");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::core::compile::{CompilerStage, UnsupportedLanguagePolicy};
    use crate::core::domain::{
        CompilationLimits, JudgeSource, Language, ScoreMethod, SubmissionStatus, TestVerdict,
        Verdict,
    };
    use crate::core::traits::judge::{Judge, JudgeInput, JudgeOutcome};
    use crate::storage::memory::MemoryStore;
    use crate::stubs::executor::ExecutorStub;

    /// Passes every submission after `delay`, recording peak concurrency.
    #[derive(Debug, Default)]
    struct CountingJudge {
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Judge for CountingJudge {
        async fn judge(&self, _problem: &Problem, _input: &JudgeInput) -> Result<JudgeOutcome, EvaluationError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(JudgeOutcome::Verdicts {
                source: JudgeSource::Local,
                tests: vec![TestVerdict::new(1, Verdict::Passed)],
            })
        }
    }

    fn setup(judge: Arc<CountingJudge>, workers: usize) -> (EvaluationQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.add_problem(Problem {
            id: 1,
            name: "sum".to_string(),
            time_limit_ms: None,
            memory_limit_bytes: None,
            data_path: None,
            code_check_score: 20,
            runtime_score: 80,
            score_method: ScoreMethod::Sum,
        });
        let compiler = CompilerStage::new(
            Arc::new(ExecutorStub::printing("", Duration::from_millis(1))),
            CompilationLimits::default(),
            UnsupportedLanguagePolicy::Reject,
        );
        let evaluator = Evaluator::new(compiler, judge, store.clone(), store.clone());
        (EvaluationQueue::start(evaluator, workers, 2), store)
    }

    fn intake(user_id: i64, problem_id: i64) -> SubmissionIntake {
        SubmissionIntake {
            user_id,
            problem_id,
            exercise_id: None,
            code: "int main(){}".to_string(),
            language: Language::C,
        }
    }

    #[tokio::test]
    async fn test_handle_resolves_to_terminal_state() {
        let judge = Arc::new(CountingJudge {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let (queue, store) = setup(judge, 2);

        let handle = queue.enqueue(intake(1, 1)).await.unwrap();
        let id = handle.id();
        let done = handle.wait().await;

        assert_eq!(done.status, SubmissionStatus::Accepted);
        assert_eq!(done.total_score, 100);
        assert_eq!(store.get_submission(id).unwrap().status, SubmissionStatus::Accepted);
        let polled = queue.poll(id).await.unwrap().unwrap();
        assert!(polled.status.is_terminal());
    }

    #[tokio::test]
    async fn test_pending_visible_before_completion() {
        let judge = Arc::new(CountingJudge {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let (queue, _store) = setup(judge, 1);

        let handle = queue.enqueue(intake(1, 1)).await.unwrap();

        assert_eq!(handle.current().status, SubmissionStatus::Pending);
        let polled = queue.poll(handle.id()).await.unwrap().unwrap();
        assert_eq!(polled.status, SubmissionStatus::Pending);
        assert_eq!(handle.wait().await.status, SubmissionStatus::Accepted);
    }

    #[tokio::test]
    async fn test_worker_limit_is_respected() {
        let judge = Arc::new(CountingJudge {
            delay: Duration::from_millis(30),
            ..Default::default()
        });
        let (queue, store) = setup(judge.clone(), 2);

        let mut handles = Vec::new();
        for user_id in 0..6 {
            handles.push(queue.enqueue(intake(user_id, 1)).await.unwrap());
        }
        let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;

        assert!(results.iter().all(|s| s.status == SubmissionStatus::Accepted));
        assert!(judge.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.submissions().len(), 6);
    }

    #[tokio::test]
    async fn test_intake_errors_are_returned_directly() {
        let (queue, store) = setup(Arc::new(CountingJudge::default()), 1);

        let result = queue.enqueue(intake(1, 404)).await;

        assert!(matches!(result, Err(IntakeError::UnknownProblem(404))));
        assert!(store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_poll_unknown_submission() {
        let (queue, _store) = setup(Arc::new(CountingJudge::default()), 1);

        assert!(queue.poll(12345).await.unwrap().is_none());
    }
}
