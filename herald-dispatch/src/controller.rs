//! Run control: job queue, pause/resume, and the single-worker guarantee
//!
//! The controller owns the submitted-job queue and the process-wide
//! [`RunState`]. At most one dispatch worker runs at a time: enqueueing
//! while a worker is active just queues the job behind the current one, and
//! the worker-exit handshake happens under the same lock as enqueueing so a
//! job can never land in a queue nobody is draining.

use herald_common::{JobId, RunState, SendJob, Signal};
use tokio::sync::broadcast;

use crate::worker::WorkerState;

const SHUTDOWN_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct ControlInner {
    run_state: RunState,
    worker_state: WorkerState,
    worker_active: bool,
    jobs: std::collections::VecDeque<SendJob>,
}

/// Owns start/pause/resume/stop state for the dispatch worker.
#[derive(Debug)]
pub struct RunController {
    inner: parking_lot::Mutex<ControlInner>,
    shutdown: broadcast::Sender<Signal>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);
        Self {
            inner: parking_lot::Mutex::new(ControlInner {
                run_state: RunState::Idle,
                worker_state: WorkerState::Idle,
                worker_active: false,
                jobs: std::collections::VecDeque::new(),
            }),
            shutdown,
        }
    }

    /// The process-wide run state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.inner.lock().run_state
    }

    /// The worker's last observed state, for diagnostics.
    #[must_use]
    pub fn worker_state(&self) -> WorkerState {
        self.inner.lock().worker_state
    }

    /// Number of jobs waiting, including the active one.
    #[must_use]
    pub fn queued_jobs(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Request a pause. Takes effect at the worker's next polling check;
    /// an in-flight send completes and is recorded first.
    pub fn pause(&self) {
        self.inner.lock().run_state = RunState::Paused;
    }

    /// Resume a paused run.
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        inner.run_state = if inner.worker_active {
            RunState::Running
        } else {
            RunState::Idle
        };
    }

    /// Broadcast a shutdown request to the worker. The worker honors it at
    /// the top of its next iteration; an in-flight send completes.
    pub fn shutdown(&self) {
        // An error just means no worker is listening right now.
        let _ = self.shutdown.send(Signal::Shutdown);
    }

    pub(crate) fn subscribe_shutdown(&self) -> broadcast::Receiver<Signal> {
        self.shutdown.subscribe()
    }

    /// Enqueue a job. Returns `true` when the caller must spawn the worker
    /// (none is active).
    pub(crate) fn enqueue(&self, job: SendJob) -> bool {
        let mut inner = self.inner.lock();
        inner.jobs.push_back(job);

        if inner.worker_active {
            false
        } else {
            inner.worker_active = true;
            if inner.run_state == RunState::Idle {
                inner.run_state = RunState::Running;
            }
            true
        }
    }

    /// The job at the head of the queue, if any.
    pub(crate) fn current_job(&self) -> Option<SendJob> {
        self.inner.lock().jobs.front().cloned()
    }

    /// Dequeue the active job once its recipients are exhausted.
    pub(crate) fn retire_job(&self, id: JobId) {
        let mut inner = self.inner.lock();
        if inner.jobs.front().is_some_and(|job| job.id == id) {
            inner.jobs.pop_front();
        }
    }

    /// Worker-exit handshake for the idle path. Exits only when the job
    /// queue is still empty under the lock; otherwise the worker must keep
    /// draining, a concurrent submission landed between its last check
    /// and now.
    pub(crate) fn try_exit(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.jobs.is_empty() {
            return false;
        }

        inner.worker_active = false;
        inner.worker_state = WorkerState::Idle;
        if inner.run_state == RunState::Running {
            inner.run_state = RunState::Idle;
        }
        true
    }

    /// Unconditional worker exit for the controller-requested stop path.
    pub(crate) fn force_exit(&self) {
        let mut inner = self.inner.lock();
        inner.worker_active = false;
        inner.worker_state = WorkerState::Stopped;
        inner.run_state = RunState::Idle;
    }

    pub(crate) fn set_worker_state(&self, state: WorkerState) {
        self.inner.lock().worker_state = state;
    }
}
