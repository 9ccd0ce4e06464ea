use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::error::ProgressResult;
use crate::remote::AggregatedGameRecord;
use crate::service::history::HistoryService;
use crate::session::result::GameTypeResult;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// The aggregate after the attempt, or `None` when it was dropped as a
    /// duplicate submission.
    pub record: Option<AggregatedGameRecord>,
    /// Games folded into the aggregate.
    pub committed: usize,
    /// Games dropped as part of a duplicate attempt.
    pub skipped: usize,
}

#[derive(Debug)]
pub enum WaitOutcome {
    Finished(ProgressResult<CommitReport>),
    TimedOut,
    Cancelled,
}

#[derive(Default)]
struct CommitState {
    outcome: Option<ProgressResult<CommitReport>>,
    cancelled: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<CommitState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CommitState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Submit every accumulated result for a module as one attempt. A
/// duplicate attempt is reported as skipped rather than failed.
pub fn commit_results(
    service: &HistoryService,
    module_id: &str,
    level_number: u32,
    results: &[GameTypeResult],
) -> ProgressResult<CommitReport> {
    if results.is_empty() {
        return Ok(CommitReport::default());
    }
    match service.submit_attempt(module_id, level_number, results) {
        Ok(record) => Ok(CommitReport {
            record: Some(record),
            committed: results.len(),
            skipped: 0,
        }),
        Err(e) if e.is_benign() => Ok(CommitReport {
            record: None,
            committed: 0,
            skipped: results.len(),
        }),
        Err(e) => Err(e),
    }
}

pub struct BatchCommit;

impl BatchCommit {
    /// Run the batch on a worker thread and hand back a handle to wait on.
    pub fn spawn(
        service: Arc<HistoryService>,
        module_id: &str,
        level_number: u32,
        results: Vec<GameTypeResult>,
    ) -> PendingCommit {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let module_id = module_id.to_string();

        thread::spawn(move || {
            let outcome = commit_results(&service, &module_id, level_number, &results);
            if let Err(e) = &outcome {
                tracing::warn!(error = %e, module = %module_id, "batch commit failed");
            }
            worker_shared.lock().outcome = Some(outcome);
            worker_shared.ready.notify_all();
        });

        PendingCommit { shared }
    }
}

/// Handle to an in-flight batch commit.
pub struct PendingCommit {
    shared: Arc<Shared>,
}

impl PendingCommit {
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock().outcome.is_none()
    }

    /// Block until the batch finishes, the timeout passes, or the token is
    /// cancelled. The remote calls themselves keep running in the latter
    /// two cases.
    pub fn wait(self, timeout: Duration) -> WaitOutcome {
        let guard = self.shared.lock();
        let (mut state, _) = self
            .shared
            .ready
            .wait_timeout_while(guard, timeout, |s| s.outcome.is_none() && !s.cancelled)
            .unwrap_or_else(|e| e.into_inner());

        if let Some(outcome) = state.outcome.take() {
            WaitOutcome::Finished(outcome)
        } else if state.cancelled {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::TimedOut
        }
    }
}

#[derive(Clone)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    /// Stop waiting. Wakes any thread blocked in `PendingCommit::wait`.
    pub fn cancel(&self) {
        self.shared.lock().cancelled = true;
        self.shared.ready.notify_all();
    }
}
