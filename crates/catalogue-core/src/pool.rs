//! Bounded worker pool for independent fetch jobs.
//!
//! Jobs are owned values tagged with their position. Workers pull from a
//! shared `async_channel` queue, never see each other's inputs, and hand
//! back owned outcomes that the caller merges after every worker has
//! finished. A failed job is logged and reported in its outcome; it never
//! stops the batch.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Worker count and per-worker politeness delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub workers: usize,
    /// Slept by a worker after each job.
    pub delay: Duration,
    /// Random extra delay, up to this much, added to `delay`.
    pub jitter: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
        }
    }
}

/// One unit of work.
#[derive(Debug, Clone)]
pub struct Job<T> {
    pub index: usize,
    /// Shown in progress output and logs.
    pub label: String,
    pub input: T,
}

/// What a job produced.
#[derive(Debug)]
pub struct JobOutcome<R> {
    pub index: usize,
    pub label: String,
    pub result: R,
}

/// Progress events emitted by workers.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Started {
        index: usize,
        total: usize,
        label: String,
    },
    Finished {
        index: usize,
        total: usize,
        label: String,
        ok: bool,
    },
}

/// Progress callback shared by all workers.
pub type ProgressFn = Arc<dyn Fn(PoolEvent) + Send + Sync>;

/// A callback that ignores every event.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Number jobs in iteration order.
pub fn make_jobs<T>(items: impl IntoIterator<Item = (String, T)>) -> Vec<Job<T>> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, (label, input))| Job {
            index,
            label,
            input,
        })
        .collect()
}

fn politeness_pause(options: &PoolOptions) -> Duration {
    let jitter_ms = options.jitter.as_millis() as u64;
    if jitter_ms == 0 {
        options.delay
    } else {
        options.delay + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }
}

/// Run every job through `task` on `options.workers` workers.
///
/// Outcomes are returned sorted by job index.
pub async fn run_pool<T, R, E, F, Fut>(
    jobs: Vec<Job<T>>,
    options: PoolOptions,
    task: F,
    progress: ProgressFn,
) -> Vec<JobOutcome<Result<R, E>>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }

    let (job_tx, job_rx) = async_channel::bounded::<Job<T>>(total);
    for job in jobs {
        // Capacity equals job count, so this never waits
        if job_tx.send(job).await.is_err() {
            break;
        }
    }
    job_tx.close();

    let task = Arc::new(task);
    let worker_count = options.workers.clamp(1, total);
    let mut handles = Vec::with_capacity(worker_count);

    for worker in 0..worker_count {
        let rx = job_rx.clone();
        let task = Arc::clone(&task);
        let progress = Arc::clone(&progress);

        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Ok(job) = rx.recv().await {
                progress(PoolEvent::Started {
                    index: job.index,
                    total,
                    label: job.label.clone(),
                });

                let result = task(job.input).await;
                let ok = result.is_ok();
                if let Err(e) = &result {
                    tracing::warn!(worker, job = %job.label, error = %e, "job failed");
                }

                progress(PoolEvent::Finished {
                    index: job.index,
                    total,
                    label: job.label.clone(),
                    ok,
                });

                outcomes.push(JobOutcome {
                    index: job.index,
                    label: job.label,
                    result,
                });

                let pause = politeness_pause(&options);
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
            outcomes
        }));
    }

    let mut outcomes = Vec::with_capacity(total);
    for handle in handles {
        match handle.await {
            Ok(mut batch) => outcomes.append(&mut batch),
            Err(e) => tracing::error!(error = %e, "pool worker panicked"),
        }
    }

    outcomes.sort_by_key(|o| o.index);
    outcomes
}
