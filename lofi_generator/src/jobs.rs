// Background train/generate jobs.
//
// `JobRunner` runs the blocking `train` and `generate` operations on worker
// threads so a caller (the HTTP trigger) can return immediately and poll
// for the outcome. Each job gets a sequential `JobId` and a `JobRecord` in a
// table shared between the runner and its workers behind `Arc<Mutex<..>>`.
// A job moves Queued -> Running -> Succeeded | Failed; the failure text is
// kept so it can be reported later instead of being lost. A panic inside the
// work is caught on the worker and recorded as a failure, so pollers see the
// final state without anyone joining the thread.
//
// Join handles are kept only so `wait` can block on them; finished ones are
// pruned on every `spawn`. There is no cancellation, timeout or retry.

use crate::config::GeneratorConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Train,
    Generate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded { summary: String },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
}

const WORKER_PANICKED: &str = "worker thread panicked";

type JobTable = Arc<Mutex<BTreeMap<JobId, JobRecord>>>;

#[derive(Default)]
pub struct JobRunner {
    jobs: JobTable,
    workers: Mutex<BTreeMap<JobId, thread::JoinHandle<()>>>,
    next_id: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_train(&self, config: GeneratorConfig) -> JobId {
        self.spawn(JobKind::Train, move || {
            crate::train(&config).map(|report| report.to_string())
        })
    }

    pub fn spawn_generate(&self, config: GeneratorConfig) -> JobId {
        self.spawn(JobKind::Generate, move || {
            crate::generate(&config).map(|report| report.to_string())
        })
    }

    /// Run `work` on a new thread under a fresh job id.
    pub fn spawn<F, E>(&self, kind: JobKind, work: F) -> JobId
    where
        F: FnOnce() -> Result<String, E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let id = {
            let mut next = lock(&self.next_id);
            *next += 1;
            JobId(*next)
        };
        lock(&self.jobs).insert(
            id,
            JobRecord {
                id,
                kind,
                status: JobStatus::Queued,
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let handle = thread::spawn(move || {
            set_status(&jobs, id, JobStatus::Running);
            log::info!("job {id} ({kind:?}) started");
            let status = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(summary)) => {
                    log::info!("job {id} succeeded: {summary}");
                    JobStatus::Succeeded { summary }
                }
                Ok(Err(e)) => {
                    log::error!("job {id} failed: {e}");
                    JobStatus::Failed {
                        error: e.to_string(),
                    }
                }
                Err(_) => {
                    log::error!("job {id} panicked");
                    JobStatus::Failed {
                        error: WORKER_PANICKED.into(),
                    }
                }
            };
            set_status(&jobs, id, status);
        });
        let mut workers = lock(&self.workers);
        workers.retain(|_, handle| !handle.is_finished());
        workers.insert(id, handle);
        id
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        lock(&self.jobs).get(&id).map(|record| record.status.clone())
    }

    pub fn record(&self, id: JobId) -> Option<JobRecord> {
        lock(&self.jobs).get(&id).cloned()
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        lock(&self.jobs).values().cloned().collect()
    }

    /// Block until job `id` finishes and return its final status. A job
    /// whose handle was already pruned has finished.
    pub fn wait(&self, id: JobId) -> Option<JobStatus> {
        let handle = lock(&self.workers).remove(&id);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                set_status(
                    &self.jobs,
                    id,
                    JobStatus::Failed {
                        error: WORKER_PANICKED.into(),
                    },
                );
            }
        }
        self.status(id)
    }
}

fn set_status(jobs: &JobTable, id: JobId, status: JobStatus) {
    if let Some(record) = lock(jobs).get_mut(&id) {
        record.status = status;
    }
}
