// Runs a batch of independent tasks on a bounded pool of scoped worker threads.
//
// Workers pull `(index, task)` pairs from a shared queue and send results back over a
// channel. A failing or panicking task only affects its own result. Results are returned
// in input order; a slot whose result never arrived is reported as `NotScheduled` with no
// task attached. Once the cancellation token fires, remaining tasks are not started.

use crate::libs::utilities::cancel::CancellationToken;
use crate::{log_debug, log_error, log_warn};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// Why a task did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task ran and returned an error.
    Failed(String),
    /// The task panicked.
    Panicked(String),
    /// The task never ran, or its result was lost.
    NotScheduled(String),
    /// The batch was cancelled before the task started.
    Cancelled,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Failed(message) => write!(f, "{}", message),
            TaskError::Panicked(message) => write!(f, "task panicked: {}", message),
            TaskError::NotScheduled(message) => write!(f, "task could not be scheduled: {}", message),
            TaskError::Cancelled => f.write_str("task was cancelled"),
        }
    }
}

/// Result of one task of a batch.
#[derive(Debug, Clone)]
pub struct TaskResult<T, O> {
    /// Position of the task in the input.
    pub index: usize,
    /// `None` when the task could not be scheduled.
    pub task: Option<T>,
    pub output: Option<O>,
    pub duration: Duration,
    pub started_at: Option<DateTime<Local>>,
    pub error: Option<TaskError>,
}

impl<T, O> TaskResult<T, O> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn not_scheduled(index: usize, reason: &str) -> Self {
        TaskResult {
            index,
            task: None,
            output: None,
            duration: Duration::ZERO,
            started_at: None,
            error: Some(TaskError::NotScheduled(reason.to_string())),
        }
    }
}

pub struct ConcurrentTaskRunner {
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl ConcurrentTaskRunner {
    /// `max_concurrency` of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        ConcurrentTaskRunner {
            max_concurrency: max_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs `work` for every task and blocks until all results are in.
    ///
    /// # Returns
    /// One result per input task, in input order.
    pub fn run<T, O, E, F>(&self, tasks: Vec<T>, work: F) -> Vec<TaskResult<T, O>>
    where
        T: Send,
        O: Send,
        E: fmt::Display,
        F: Fn(&T) -> Result<O, E> + Sync,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.max_concurrency.min(total);
        log_debug!("[Tasks] Running {} task(s) on {} worker(s)", total, workers);

        let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(tasks.into_iter().enumerate().collect());
        let (tx, rx) = mpsc::channel::<TaskResult<T, O>>();

        thread::scope(|scope| {
            for worker in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let work = &work;
                let cancel = &self.cancel;
                let spawned = thread::Builder::new()
                    .name(format!("dfcli-task-{}", worker))
                    .spawn_scoped(scope, move || {
                        while let Some((index, task)) = pop(queue) {
                            let result = if cancel.is_cancelled() {
                                TaskResult {
                                    index,
                                    task: Some(task),
                                    output: None,
                                    duration: Duration::ZERO,
                                    started_at: None,
                                    error: Some(TaskError::Cancelled),
                                }
                            } else {
                                run_one(index, task, work)
                            };
                            if tx.send(result).is_err() {
                                break;
                            }
                        }
                    });
                if let Err(e) = spawned {
                    log_error!("[Tasks] Failed to start worker {}: {}", worker, e);
                }
            }
        });
        drop(tx);

        let mut slots: Vec<Option<TaskResult<T, O>>> = (0..total).map(|_| None).collect();
        for result in rx {
            let index = result.index;
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    log_warn!("[Tasks] No result for task {}", index);
                    TaskResult::not_scheduled(index, "no worker picked up the task")
                })
            })
            .collect()
    }
}

fn pop<T>(queue: &Mutex<VecDeque<(usize, T)>>) -> Option<(usize, T)> {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .pop_front()
}

fn run_one<T, O, E, F>(index: usize, task: T, work: &F) -> TaskResult<T, O>
where
    E: fmt::Display,
    F: Fn(&T) -> Result<O, E>,
{
    let started_at = Local::now();
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&task)));
    let duration = started.elapsed();
    let (output, error) = match outcome {
        Ok(Ok(output)) => (Some(output), None),
        Ok(Err(e)) => (None, Some(TaskError::Failed(e.to_string()))),
        Err(payload) => (None, Some(TaskError::Panicked(panic_message(payload.as_ref())))),
    };
    if let Some(error) = &error {
        log_warn!("[Tasks] Task {} failed: {}", index, error);
    }
    TaskResult {
        index,
        task: Some(task),
        output,
        duration,
        started_at: Some(started_at),
        error,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
