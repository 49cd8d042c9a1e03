//! Threaded and task based interface for running queries.
//!
//! Predicates are immutable, so any number of queries may share them. Each
//! query gets its own [`Thread`] and runs either on a background OS thread,
//! streaming answers back over a channel, or as a tokio task streaming them
//! through [`ReceiverStream`]. Cancellation is cooperative: every query owns a
//! [`CancelToken`] that its thread checks between steps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::predicate::Predicate;
use crate::thread::Thread;
use crate::value::Record;

/// Cancellation token shared between a query and whoever may cancel it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self { Self(Arc::new(AtomicBool::new(false))) }
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

/// Opaque query identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(u64);

/// Handle to a query running on a background thread.
pub struct QueryHandle {
    pub id: QueryId,
    cancel: CancelToken,
    started: Instant,
    join: Option<JoinHandle<()>>,
    /// Answers in the order they were found; an error, if any, comes last.
    pub results: Receiver<Result<Record>>,
}
impl QueryHandle {
    /// Request cancellation (cooperative). The worker observes it before its next step.
    pub fn cancel(&self) { self.cancel.cancel(); }
    /// Wait for the query to finish and collect whatever it has not yet handed over.
    pub fn join(mut self) -> Vec<Result<Record>> {
        if let Some(j) = self.join.take() { let _ = j.join(); }
        self.results.try_iter().collect()
    }
    /// Elapsed time since start.
    pub fn elapsed(&self) -> Duration { self.started.elapsed() }
}

/// Query submission options.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    /// Stop after this many answers.
    pub limit: Option<usize>,
    pub timeout: Option<Duration>,
}

/// Registry managing query lifecycles.
pub struct QueryInterface {
    config: EngineConfig,
    next_id: AtomicU64,
    active: Arc<Mutex<HashMap<QueryId, CancelToken>>>, // for external cancellation
}

impl QueryInterface {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, next_id: AtomicU64::new(0), active: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn allocate_id(&self) -> QueryId {
        QueryId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn register(&self, id: QueryId, cancel: &CancelToken) {
        if let Ok(mut active) = self.active.lock() {
            active.insert(id, cancel.clone());
        }
    }

    fn prepare(&self, goal: &Predicate, scope: &Record, cancel: &CancelToken, options: &QueryOptions) -> Thread {
        let thread = Thread::with_config(goal.clone(), scope, self.config.clone()).with_cancel(cancel.clone());
        match options.timeout {
            Some(timeout) => thread.with_deadline(Instant::now() + timeout),
            None => thread,
        }
    }

    /// Run a query on a background thread, streaming its answers back.
    ///
    /// The thread must not reach an asynchronous leaf; use [`QueryInterface::spawn_async`]
    /// for goals that contain them.
    pub fn start_query(&self, goal: &Predicate, scope: &Record, options: QueryOptions) -> QueryHandle {
        let id = self.allocate_id();
        let cancel = CancelToken::new();
        self.register(id, &cancel);

        let (tx, rx) = mpsc::channel();
        let mut thread = self.prepare(goal, scope, &cancel, &options);
        let active = Arc::clone(&self.active);
        let started = Instant::now();
        let join = std::thread::spawn(move || {
            let mut found = 0usize;
            for answer in thread.solutions() {
                let failed = answer.is_err();
                if let Err(e) = &answer {
                    warn!(target: "clausal::interface", query = id.0, error = %e, "query error");
                }
                if tx.send(answer).is_err() || failed {
                    break;
                }
                found += 1;
                if options.limit.is_some_and(|limit| found >= limit) {
                    break;
                }
            }
            let elapsed_ms_f64 = started.elapsed().as_secs_f64() * 1000.0;
            info!(target: "clausal::interface", query = id.0, ms = elapsed_ms_f64, solutions = found, steps = thread.steps(), "query complete");
            if let Ok(mut active) = active.lock() {
                active.remove(&id);
            }
        });

        QueryHandle { id, cancel, started, join: Some(join), results: rx }
    }

    /// Run a query to completion on the current thread.
    pub fn run_sync(&self, goal: &Predicate, scope: &Record, options: QueryOptions) -> Result<Vec<Record>> {
        let started = Instant::now();
        let mut thread = self.prepare(goal, scope, &CancelToken::new(), &options);
        let limit = options.limit.unwrap_or(usize::MAX);
        let answers = thread.solutions().take(limit).collect::<Result<Vec<_>>>();
        match &answers {
            Ok(found) => {
                let elapsed_ms_f64 = started.elapsed().as_secs_f64() * 1000.0;
                info!(target: "clausal::interface", ms = elapsed_ms_f64, solutions = found.len(), steps = thread.steps(), "query complete");
            }
            Err(e) => warn!(target: "clausal::interface", error = %e, "query error"),
        }
        answers
    }

    /// Run a query as a tokio task; asynchronous leaves are awaited.
    /// Must be called from within a tokio runtime.
    pub fn spawn_async(&self, goal: &Predicate, scope: &Record, options: QueryOptions) -> (QueryId, ReceiverStream<Result<Record>>) {
        let id = self.allocate_id();
        let cancel = CancelToken::new();
        self.register(id, &cancel);

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let mut thread = self.prepare(goal, scope, &cancel, &options);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            let started = Instant::now();
            let mut found = 0usize;
            loop {
                if options.limit.is_some_and(|limit| found >= limit) {
                    break;
                }
                match thread.run_async().await {
                    Ok(Some(answer)) => {
                        if tx.send(Ok(answer)).await.is_err() {
                            break;
                        }
                        found += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(target: "clausal::interface", query = id.0, error = %e, "query error");
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
            let elapsed_ms_f64 = started.elapsed().as_secs_f64() * 1000.0;
            info!(target: "clausal::interface", query = id.0, ms = elapsed_ms_f64, solutions = found, steps = thread.steps(), "query complete");
            if let Ok(mut active) = active.lock() {
                active.remove(&id);
            }
        });
        (id, ReceiverStream::new(rx))
    }

    /// Cancel a query by id. False when no such query is running.
    pub fn cancel(&self, id: QueryId) -> bool {
        match self.active.lock() {
            Ok(active) => match active.get(&id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Number of queries still running.
    pub fn active(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }
}
