// Download worker pool: a fixed number of workers draining a FIFO queue of segment
// downloads, each task retried up to the configured number of attempts.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use url::Url;

use crate::hls::config::WorkerPoolConfig;
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::retry::{RetryAction, RetryOutcome, retry_with_backoff};

/// A segment to fetch and where to put it. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: Url,
    pub destination: PathBuf,
    /// Media sequence number, for log context
    pub sequence: u64,
}

#[derive(Debug)]
enum QueueItem {
    Task(DownloadTask),
    /// Tells the worker that dequeues it to exit.
    Shutdown,
}

/// FIFO of pending downloads. Idle workers park on a `Notify` instead of polling.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never blocks on anything but the queue lock.
    pub fn push(&self, task: DownloadTask) {
        self.push_item(QueueItem::Task(task));
    }

    fn push_item(&self, item: QueueItem) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Number of items waiting, shutdown markers included.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    async fn pop(&self) -> QueueItem {
        loop {
            // Register interest before checking, so a push between the check and
            // the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            notified.await;
        }
    }
}

/// Counts of finished tasks, collected when the pool is drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub succeeded: u64,
    /// Tasks that exhausted their attempts or hit a non-retryable error
    pub failed: u64,
    /// Download attempts over all tasks
    pub attempts: u64,
}

impl PoolSummary {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Default)]
struct PoolStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
}

impl PoolStats {
    fn snapshot(&self) -> PoolSummary {
        PoolSummary {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}

pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    downloader: Arc<dyn SegmentDownloader>,
    config: Arc<WorkerPoolConfig>,
    stats: Arc<PoolStats>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(downloader: Arc<dyn SegmentDownloader>, config: WorkerPoolConfig) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            downloader,
            config: Arc::new(config),
            stats: Arc::new(PoolStats::default()),
            workers: Vec::new(),
        }
    }

    /// Start the workers. Calling it on a running pool does nothing.
    ///
    /// Workers inherit the caller's span, so their logs carry its context.
    pub fn run(&mut self) {
        if !self.workers.is_empty() {
            return;
        }

        let count = self.config.workers.max(1);
        for id in 0..count {
            let queue = Arc::clone(&self.queue);
            let downloader = Arc::clone(&self.downloader);
            let config = Arc::clone(&self.config);
            let stats = Arc::clone(&self.stats);
            let span = info_span!("worker", id);
            self.workers.push(tokio::spawn(
                worker_loop(queue, downloader, config, stats).instrument(span),
            ));
        }
        debug!(workers = count, "Download workers started");
    }

    pub fn enqueue(&self, task: DownloadTask) {
        self.queue.push(task);
    }

    /// Tasks not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Let the workers finish every task already queued, then stop them.
    ///
    /// A pool that was never started is started first so no queued task is lost.
    pub async fn drain_and_stop(&mut self) -> PoolSummary {
        self.run();

        let workers = std::mem::take(&mut self.workers);
        debug!(workers = workers.len(), pending = self.pending(), "Draining download workers");
        for _ in 0..workers.len() {
            self.queue.push_item(QueueItem::Shutdown);
        }
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Download worker terminated abnormally");
            }
        }

        let summary = self.stats.snapshot();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            attempts = summary.attempts,
            "Download workers stopped"
        );
        summary
    }

    pub fn summary(&self) -> PoolSummary {
        self.stats.snapshot()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropped without draining: let the workers go once the queue empties.
        for _ in 0..self.workers.len() {
            self.queue.push_item(QueueItem::Shutdown);
        }
    }
}

async fn worker_loop(
    queue: Arc<TaskQueue>,
    downloader: Arc<dyn SegmentDownloader>,
    config: Arc<WorkerPoolConfig>,
    stats: Arc<PoolStats>,
) {
    loop {
        match queue.pop().await {
            QueueItem::Task(task) => execute(downloader.as_ref(), &config, &stats, &task).await,
            QueueItem::Shutdown => {
                debug!("Worker exiting");
                break;
            }
        }
    }
}

async fn execute(
    downloader: &dyn SegmentDownloader,
    config: &WorkerPoolConfig,
    stats: &PoolStats,
    task: &DownloadTask,
) {
    let RetryOutcome { result, attempts } =
        retry_with_backoff(config.max_attempts, &config.retry_policy, |attempt| async move {
            debug!(sequence = task.sequence, attempt = attempt + 1, url = %task.url, "Downloading segment");
            RetryAction::<u64>::from(downloader.download(task).await)
        })
        .await;

    stats
        .attempts
        .fetch_add(u64::from(attempts), Ordering::Relaxed);
    match result {
        Ok(bytes) => {
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                sequence = task.sequence,
                bytes,
                attempts,
                path = %task.destination.display(),
                "Segment downloaded"
            );
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                sequence = task.sequence,
                attempts,
                url = %task.url,
                error = %e,
                "Giving up on segment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DownloadError;
    use crate::hls::retry::RetryPolicy;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    fn task(sequence: u64) -> DownloadTask {
        DownloadTask {
            url: Url::parse(&format!("http://origin.test/{sequence}.ts")).unwrap(),
            destination: PathBuf::from(format!("/out/{sequence}.ts")),
            sequence,
        }
    }

    fn config(workers: usize, max_attempts: u32) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers,
            max_attempts,
            retry_policy: RetryPolicy::immediate(),
        }
    }

    /// Records calls and fails the first `failures` attempts of every task.
    #[derive(Default)]
    struct RecordingDownloader {
        failures: u32,
        status: Option<StatusCode>,
        delay: Duration,
        calls: Mutex<HashMap<u64, u32>>,
        in_flight: Mutex<HashSet<PathBuf>>,
        overlaps: AtomicU64,
    }

    #[async_trait]
    impl SegmentDownloader for RecordingDownloader {
        async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError> {
            let attempt = {
                let mut calls = self.calls.lock();
                let count = calls.entry(task.sequence).or_default();
                *count += 1;
                *count
            };
            if !self.in_flight.lock().insert(task.destination.clone()) {
                self.overlaps.fetch_add(1, Ordering::Relaxed);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.lock().remove(&task.destination);

            if attempt <= self.failures {
                let status = self.status.unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
                return Err(DownloadError::http_status(status, task.url.as_str(), "segment download"));
            }
            Ok(188)
        }
    }

    #[tokio::test]
    async fn every_task_completes_exactly_once() {
        let downloader = Arc::new(RecordingDownloader {
            delay: Duration::from_millis(2),
            ..Default::default()
        });
        let mut pool = WorkerPool::new(downloader.clone(), config(5, 3));
        pool.run();
        for seq in 0..40 {
            pool.enqueue(task(seq));
        }

        let summary = pool.drain_and_stop().await;
        assert_eq!(summary.succeeded, 40);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.attempts, 40);

        let calls = downloader.calls.lock();
        assert_eq!(calls.len(), 40);
        assert!(calls.values().all(|&n| n == 1));
        assert_eq!(downloader.overlaps.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn tasks_enqueued_before_run_are_not_lost() {
        let downloader = Arc::new(RecordingDownloader::default());
        let mut pool = WorkerPool::new(downloader.clone(), config(2, 1));
        pool.enqueue(task(1));
        pool.enqueue(task(2));
        assert_eq!(pool.pending(), 2);

        let summary = pool.drain_and_stop().await;
        assert_eq!(summary.completed(), 2);
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let downloader = Arc::new(RecordingDownloader {
            failures: 2,
            ..Default::default()
        });
        let mut pool = WorkerPool::new(downloader.clone(), config(3, 3));
        pool.run();
        pool.enqueue(task(7));

        let summary = pool.drain_and_stop().await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.attempts, 3);
        assert_eq!(downloader.calls.lock()[&7], 3);
    }

    #[tokio::test]
    async fn exhausted_task_does_not_stop_the_pool() {
        let downloader = Arc::new(RecordingDownloader {
            failures: u32::MAX,
            ..Default::default()
        });
        let mut pool = WorkerPool::new(downloader.clone(), config(2, 4));
        pool.run();
        for seq in 0..3 {
            pool.enqueue(task(seq));
        }

        let summary = pool.drain_and_stop().await;
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.attempts, 12);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let downloader = Arc::new(RecordingDownloader {
            failures: u32::MAX,
            status: Some(StatusCode::NOT_FOUND),
            ..Default::default()
        });
        let mut pool = WorkerPool::new(downloader.clone(), config(1, 5));
        pool.run();
        pool.enqueue(task(1));

        let summary = pool.drain_and_stop().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.attempts, 1);
    }

    #[tokio::test]
    async fn idle_workers_wake_up_for_late_tasks() {
        let downloader = Arc::new(RecordingDownloader::default());
        let mut pool = WorkerPool::new(downloader.clone(), config(4, 1));
        pool.run();
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.enqueue(task(99));
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.summary().completed() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task was not picked up");

        assert_eq!(pool.drain_and_stop().await.succeeded, 1);
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let queue = TaskQueue::new();
        queue.push(task(1));
        queue.push(task(2));
        queue.push_item(QueueItem::Shutdown);

        assert!(matches!(queue.pop().await, QueueItem::Task(t) if t.sequence == 1));
        assert!(matches!(queue.pop().await, QueueItem::Task(t) if t.sequence == 2));
        assert!(matches!(queue.pop().await, QueueItem::Shutdown));
        assert!(queue.is_empty());
    }
}
