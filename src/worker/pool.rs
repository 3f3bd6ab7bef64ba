//! Fixed-size worker pool fed by a bounded queue.
//!
//! All workers share one receiver. The queue capacity bounds how much work
//! can be waiting, and the worker count bounds how many pipelines (and
//! therefore outbound connections) run at once.
//!
//! # Shutdown
//!
//! The dispatcher owns the only sender. Once [`Dispatcher::close`] has dropped
//! it, [`WorkerPool::shutdown`] lets workers drain what is already queued and,
//! after the grace period, cancels whatever is still running. A cancelled
//! job's record is completed as `error` with [`INTERRUPTED_DETAIL`].
//!
//! [`Dispatcher::close`]: super::Dispatcher::close

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analysis::AnalysisBackend;
use crate::effects::HostInterpreter;
use crate::pipeline::Pipeline;
use crate::store::{EventJournal, INTERRUPTED_DETAIL, JournalError};
use crate::types::{Completion, PublishOutcome};

use super::message::Job;

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 4;

/// Default capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued job finished within the grace period.
    Drained,
    /// The grace period expired and running jobs were cancelled.
    Cancelled,
}

/// A running pool of workers.
#[derive(Debug)]
pub struct WorkerPool {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers (at least one) consuming from `rx`.
    pub fn spawn<H, B>(
        size: usize,
        rx: mpsc::Receiver<Job>,
        pipeline: Arc<Pipeline<H, B>>,
        journal: Arc<EventJournal>,
    ) -> Self
    where
        H: HostInterpreter + Send + Sync + 'static,
        B: AnalysisBackend + Send + Sync + 'static,
    {
        let size = size.max(1);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for index in 0..size {
            let worker = Worker {
                index,
                rx: rx.clone(),
                pipeline: pipeline.clone(),
                journal: journal.clone(),
                cancel: cancel.child_token(),
            };
            tasks.spawn(worker.run());
        }

        info!(workers = size, "Worker pool started");
        WorkerPool {
            tasks,
            cancel,
            size,
        }
    }

    /// Number of worker tasks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Waits for the workers to drain the queue, cancelling them after
    /// `grace`. The queue's sender must already be closed, otherwise this
    /// always runs into the grace period.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownOutcome {
        info!(grace_secs = grace.as_secs(), "Draining worker queue");

        let drained = tokio::time::timeout(grace, join_all(&mut self.tasks)).await;
        let outcome = match drained {
            Ok(()) => ShutdownOutcome::Drained,
            Err(_) => {
                warn!("Shutdown grace period expired, cancelling workers");
                self.cancel.cancel();
                join_all(&mut self.tasks).await;
                ShutdownOutcome::Cancelled
            }
        };

        info!(?outcome, "Worker pool stopped");
        outcome
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Worker task panicked");
        }
    }
}

struct Worker<H, B> {
    index: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    pipeline: Arc<Pipeline<H, B>>,
    journal: Arc<EventJournal>,
    cancel: CancellationToken,
}

impl<H, B> Worker<H, B>
where
    H: HostInterpreter + Send + Sync + 'static,
    B: AnalysisBackend + Send + Sync + 'static,
{
    async fn run(self) {
        debug!(worker = self.index, "Worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                job = async { self.rx.lock().await.recv().await } => job,
            };
            // None: cancelled, or the queue is closed and empty.
            let Some(job) = next else { break };

            self.process(job).await;
        }

        debug!(worker = self.index, "Worker stopped");
    }

    async fn process(&self, job: Job) {
        debug!(worker = self.index, event_id = %job.event_id, pr = %job.event.pr, "Processing job");

        let completion = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(event_id = %job.event_id, "Job interrupted by shutdown");
                Completion::error(INTERRUPTED_DETAIL.to_string(), PublishOutcome::NotAttempted)
            }
            completion = self.pipeline.run(&job.event) => completion,
        };

        match self.journal.complete(job.event_id, completion) {
            Ok(record) => info!(
                event_id = %record.id,
                pr = %record.subject_id,
                status = %record.status,
                "Event completed"
            ),
            Err(JournalError::NotFound(id)) => {
                warn!(event_id = %id, "Record evicted from journal before completion")
            }
            Err(e) => error!(error = %e, "Failed to complete journal record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisClient, RetryConfig};
    use crate::store::DedupeStore;
    use crate::test_utils::{MockHost, ScriptedBackend, sample_event, transient_error};
    use crate::types::{EventStatus, PublishOutcome};
    use crate::worker::Dispatcher;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        journal: Arc<EventJournal>,
        pipeline: Arc<Pipeline<MockHost, ScriptedBackend>>,
        pool: WorkerPool,
    }

    fn harness(host: MockHost, client: AnalysisClient<ScriptedBackend>, workers: usize) -> Harness {
        let journal = Arc::new(EventJournal::new(10));
        let dedupe = Arc::new(DedupeStore::new(100));
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let pipeline = Arc::new(Pipeline::new(host, client));
        let pool = WorkerPool::spawn(workers, rx, pipeline.clone(), journal.clone());
        let dispatcher = Arc::new(Dispatcher::new(dedupe, journal.clone(), tx));
        Harness {
            dispatcher,
            journal,
            pipeline,
            pool,
        }
    }

    async fn drain(dispatcher: &Dispatcher, pool: WorkerPool, grace: Duration) -> ShutdownOutcome {
        dispatcher.close();
        pool.shutdown(grace).await
    }

    #[tokio::test]
    async fn accepted_event_reaches_success() {
        let h = harness(
            MockHost::with_diff("+x"),
            AnalysisClient::new(ScriptedBackend::new(vec![])),
            2,
        );

        let ack = h.dispatcher.submit(sample_event(1, "abc123")).unwrap();
        let event_id = ack.event_id().unwrap();

        assert_eq!(
            drain(&h.dispatcher, h.pool, Duration::from_secs(5)).await,
            ShutdownOutcome::Drained
        );

        let record = h.journal.get(event_id).unwrap();
        assert_eq!(record.status, EventStatus::Success);
        assert_eq!(record.result.as_deref(), Some("Looks good."));
        assert_eq!(record.publish, PublishOutcome::Delivered);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_duplicates_run_pipeline_once() {
        let h = harness(
            MockHost::with_diff("+x"),
            AnalysisClient::new(ScriptedBackend::new(vec![])),
            4,
        );

        let submissions: Vec<_> = (0..16)
            .map(|_| {
                let dispatcher = h.dispatcher.clone();
                tokio::spawn(async move { dispatcher.submit(sample_event(9, "abc123")) })
            })
            .collect();
        for handle in submissions {
            handle.await.unwrap().unwrap();
        }

        drain(&h.dispatcher, h.pool, Duration::from_secs(5)).await;

        assert_eq!(h.pipeline.host().fetch_count(), 1);
        assert_eq!(h.pipeline.analysis().backend().calls(), 1);
        let records = h.journal.recent();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EventStatus::Success);
    }

    #[tokio::test]
    async fn skipped_event_makes_no_calls() {
        let h = harness(
            MockHost::with_diff("+x"),
            AnalysisClient::new(ScriptedBackend::new(vec![])),
            1,
        );
        let mut event = sample_event(2, "abc123");
        event.state = "DECLINED".to_string();

        let ack = h.dispatcher.submit(event).unwrap();
        drain(&h.dispatcher, h.pool, Duration::from_secs(5)).await;

        let record = h.journal.get(ack.event_id().unwrap()).unwrap();
        assert_eq!(record.status, EventStatus::Skipped);
        assert!(h.pipeline.host().effects().is_empty());
        assert_eq!(h.pipeline.analysis().backend().calls(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_marks_record_error() {
        let h = harness(
            MockHost::failing_fetch(502),
            AnalysisClient::new(ScriptedBackend::new(vec![])),
            1,
        );

        let ack = h.dispatcher.submit(sample_event(3, "abc123")).unwrap();
        drain(&h.dispatcher, h.pool, Duration::from_secs(5)).await;

        let record = h.journal.get(ack.event_id().unwrap()).unwrap();
        assert_eq!(record.status, EventStatus::Error);
        assert!(record.error_detail.unwrap().contains("Unable to fetch code changes"));
        assert_eq!(h.pipeline.host().comments().len(), 1);
    }

    #[tokio::test]
    async fn new_commit_runs_pipeline_again() {
        let h = harness(
            MockHost::with_diff("+x"),
            AnalysisClient::new(ScriptedBackend::new(vec![])),
            2,
        );

        h.dispatcher.submit(sample_event(4, "abc123")).unwrap();
        h.dispatcher.submit(sample_event(4, "def456")).unwrap();
        drain(&h.dispatcher, h.pool, Duration::from_secs(5)).await;

        assert_eq!(h.pipeline.host().fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_expiry_cancels_and_marks_interrupted() {
        let slow_retry = RetryConfig::new(
            3,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            2.0,
        );
        let h = harness(
            MockHost::with_diff("+x"),
            AnalysisClient::with_retry(ScriptedBackend::repeating(|| Err(transient_error())), slow_retry),
            1,
        );

        let ack = h.dispatcher.submit(sample_event(5, "abc123")).unwrap();
        assert_eq!(
            drain(&h.dispatcher, h.pool, Duration::from_secs(1)).await,
            ShutdownOutcome::Cancelled
        );

        let record = h.journal.get(ack.event_id().unwrap()).unwrap();
        assert_eq!(record.status, EventStatus::Error);
        assert_eq!(record.error_detail.as_deref(), Some(INTERRUPTED_DETAIL));
        assert!(h.pipeline.host().comments().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_without_closing_hits_grace_period() {
        let h = harness(
            MockHost::with_diff("+x"),
            AnalysisClient::new(ScriptedBackend::new(vec![])),
            2,
        );

        // The dispatcher still holds the sender, so idle workers never see
        // the end of the queue.
        assert_eq!(
            h.pool.shutdown(Duration::from_secs(1)).await,
            ShutdownOutcome::Cancelled
        );
    }
}
