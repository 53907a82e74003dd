//! Job queue: single-lane scheduler with reorder and pause controls.
//!
//! All scheduler state (pending jobs, the running slot, terminal records and
//! the admission flag) lives behind one mutex. Critical sections are
//! synchronous and never span an await, so a state check and the mutation
//! it guards always happen together.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::executor::JobExecutor;
use super::model::{Job, JobState, StatusEvent};
use super::sink::EventSink;
use crate::error::{JobError, QueueError};

/// Default number of terminal job ids kept for position lookups.
const DEFAULT_FINISHED_RETENTION: usize = 10_000;

struct PendingJob {
    job: Job,
    sink: Arc<dyn EventSink>,
}

/// The running slot. The job itself, payload included, is owned by its run task.
struct RunningJob {
    id: Uuid,
    started_at: DateTime<Utc>,
}

struct QueueState {
    pending: VecDeque<PendingJob>,
    current: Option<RunningJob>,
    finished: HashMap<Uuid, JobState>,
    finished_order: VecDeque<Uuid>,
    admission_enabled: bool,
}

impl QueueState {
    fn record_finished(&mut self, id: Uuid, state: JobState, retention: usize) {
        self.finished.insert(id, state);
        self.finished_order.push_back(id);
        while self.finished_order.len() > retention {
            if let Some(evicted) = self.finished_order.pop_front() {
                self.finished.remove(&evicted);
            }
        }
    }
}

/// Point-in-time view of the queue for inspection endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub running: Option<Uuid>,
    pub pending: Vec<Uuid>,
    pub admission_enabled: bool,
    pub finished: usize,
}

/// Runs submitted jobs one at a time, in FIFO order unless reordered.
pub struct JobQueue {
    state: Mutex<QueueState>,
    executor: Arc<JobExecutor>,
    finished_retention: usize,
}

impl JobQueue {
    /// Create a new queue driving `executor`.
    pub fn new(executor: Arc<JobExecutor>) -> Arc<Self> {
        Self::with_retention(executor, DEFAULT_FINISHED_RETENTION)
    }

    /// Create a queue that remembers at most `finished_retention` terminal ids.
    pub fn with_retention(executor: Arc<JobExecutor>, finished_retention: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                current: None,
                finished: HashMap::new(),
                finished_order: VecDeque::new(),
                admission_enabled: true,
            }),
            executor,
            finished_retention: finished_retention.max(1),
        })
    }

    // Nothing runs user code under this lock, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job to the tail of the queue and try to start it.
    pub fn enqueue(self: &Arc<Self>, job: Job, sink: Arc<dyn EventSink>) -> Uuid {
        let id = job.id;
        {
            let mut state = self.lock();
            state.pending.push_back(PendingJob { job, sink });
            info!(job_id = %id, pending = state.pending.len(), "Job enqueued");
        }
        self.attempt_schedule();
        id
    }

    /// Start the head job unless one is running, admission is paused, or
    /// nothing is pending. Safe to call any number of times.
    pub fn attempt_schedule(self: &Arc<Self>) {
        let (job, sink) = {
            let mut state = self.lock();
            if state.current.is_some() || !state.admission_enabled {
                return;
            }
            let Some(PendingJob { mut job, sink }) = state.pending.pop_front() else {
                return;
            };
            if let Err(e) = job.transition_to(JobState::Running) {
                // Pending jobs are always Queued; keep the lane moving regardless.
                warn!(job_id = %job.id, error = %e, "Unexpected state for pending job");
            }
            state.current = Some(RunningJob {
                id: job.id,
                started_at: job.started_at.unwrap_or_else(Utc::now),
            });
            (job, sink)
        };

        debug!(job_id = %job.id, "Starting job");
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.run_job(job, sink).await;
        });
    }

    async fn run_job(self: Arc<Self>, job: Job, sink: Arc<dyn EventSink>) {
        let id = job.id;
        let executor = Arc::clone(&self.executor);
        let run_sink = Arc::clone(&sink);
        let handle = tokio::spawn(async move { executor.run(&job, &*run_sink).await });

        let outcome = match handle.await {
            Ok(state) => state,
            Err(e) => {
                let fault = JobError::Fault {
                    id,
                    reason: if e.is_panic() {
                        "executor panicked".to_string()
                    } else {
                        "executor was cancelled".to_string()
                    },
                };
                error!(job_id = %id, error = %fault, "Job faulted");
                sink.emit(StatusEvent::error("Internal error", Some(fault.to_string())));
                JobState::Failed
            }
        };

        self.complete(id, outcome);
        drop(sink);
        self.attempt_schedule();
    }

    fn complete(&self, id: Uuid, outcome: JobState) {
        let outcome = if outcome.is_terminal() {
            outcome
        } else {
            JobState::Failed
        };

        let mut state = self.lock();
        match state.current.take() {
            Some(running) if running.id == id => {
                let elapsed_ms = (Utc::now() - running.started_at).num_milliseconds();
                info!(job_id = %id, state = %outcome, elapsed_ms, "Job completed");
                state.record_finished(id, outcome, self.finished_retention);
            }
            other => {
                error!(job_id = %id, "Completed job does not hold the running slot");
                state.current = other;
                state.record_finished(id, outcome, self.finished_retention);
            }
        }
    }

    /// Move the pending job at `index` (0-based) to the head of the queue.
    /// Returns the moved job's id.
    pub fn move_to_front(&self, index: usize) -> Result<Uuid, QueueError> {
        let mut state = self.lock();
        let len = state.pending.len();
        let entry = state
            .pending
            .remove(index)
            .ok_or(QueueError::InvalidIndex { index, len })?;
        let id = entry.job.id;
        state.pending.push_front(entry);

        info!(job_id = %id, from = index, "Job moved to front");
        Ok(id)
    }

    /// Pause (`true`) or resume (`false`) admission of new runs. A running job
    /// always completes. Returns whether the queue is now running.
    pub fn pause(self: &Arc<Self>, paused: bool) -> bool {
        {
            let mut state = self.lock();
            state.admission_enabled = !paused;
        }
        info!(paused, "Queue admission updated");

        if !paused {
            self.attempt_schedule();
        }
        !paused
    }

    /// Whether admission is enabled.
    pub fn is_running(&self) -> bool {
        self.lock().admission_enabled
    }

    /// `0` while running, `k` for the k-th pending job, `-1` once terminal or unknown.
    pub fn position(&self, id: Uuid) -> i64 {
        let state = self.lock();
        if state.current.as_ref().is_some_and(|running| running.id == id) {
            return 0;
        }
        state
            .pending
            .iter()
            .position(|p| p.job.id == id)
            .map(|i| i as i64 + 1)
            .unwrap_or(-1)
    }

    /// Current lifecycle state of a known job.
    pub fn state_of(&self, id: Uuid) -> Option<JobState> {
        let state = self.lock();
        if state.current.as_ref().is_some_and(|running| running.id == id) {
            return Some(JobState::Running);
        }
        if let Some(p) = state.pending.iter().find(|p| p.job.id == id) {
            return Some(p.job.state);
        }
        state.finished.get(&id).copied()
    }

    /// Number of pending (not yet started) jobs.
    pub fn size(&self) -> usize {
        self.lock().pending.len()
    }

    /// Running id, pending ids in order, admission flag and retained terminal count.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            running: state.current.as_ref().map(|running| running.id),
            pending: state.pending.iter().map(|p| p.job.id).collect(),
            admission_enabled: state.admission_enabled,
            finished: state.finished.len(),
        }
    }
}
