//! Bounded session-pool builder.
//!
//! Opens N independent sessions against one broker through a worker pool
//! of `concurrency` slots. Either every attempt succeeds and the batch is
//! returned whole, or the collected failures are merged into one aggregate
//! error -- sessions that did connect remain open and are handed back with
//! the failure so the caller decides whether to close or keep them.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::{validate_batch_limits, ConnectionConfig};
use crate::error::{aggregate, Error};
use crate::session::{Connector, Session};

/// A session batch that failed partway: some attempts errored, the rest
/// connected and remain open.
pub struct PoolFailure {
    /// Sessions that connected successfully before the batch failed.
    pub survivors: Vec<Arc<dyn Session>>,
    /// The merged multi-line aggregate of every failed attempt.
    pub error: Error,
}

impl std::fmt::Debug for PoolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFailure")
            .field("survivors", &self.survivors.len())
            .field("error", &self.error)
            .finish()
    }
}

impl std::fmt::Display for PoolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for PoolFailure {}

impl From<PoolFailure> for Error {
    fn from(failure: PoolFailure) -> Self {
        failure.error
    }
}

/// Parameters of one session batch.
#[derive(Debug, Clone)]
pub struct PoolSpec {
    /// Number of sessions to establish.
    pub count: usize,
    /// Worker-pool size capping simultaneous connection attempts.
    pub concurrency: usize,
    /// Transport keep-alive ping interval; zero disables keep-alive.
    pub keepalive: Duration,
    /// Log per-attempt connect time.
    pub log_connect_time: bool,
}

impl PoolSpec {
    /// A batch of `count` sessions connected through `concurrency` slots.
    pub fn new(count: usize, concurrency: usize) -> Self {
        Self {
            count,
            concurrency,
            keepalive: Duration::ZERO,
            log_connect_time: false,
        }
    }

    /// Sets the transport keep-alive interval.
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Logs how long each attempt took to join.
    pub fn with_connect_time_logging(mut self, enabled: bool) -> Self {
        self.log_connect_time = enabled;
        self
    }
}

/// Establishes exactly `spec.count` sessions, or fails the whole batch.
///
/// Every attempt is submitted onto the worker pool; successes append to a
/// guarded collection, failures push into a bounded error channel sized to
/// the batch. After the pool fully drains, the errors merge into one
/// aggregate. There is no ordering guarantee between submission order and
/// completion order.
pub async fn connect_sessions(
    connector: Arc<dyn Connector>,
    config: &ConnectionConfig,
    spec: &PoolSpec,
) -> Result<Vec<Arc<dyn Session>>, PoolFailure> {
    // Configuration errors surface before any connection attempt.
    if let Err(err) = validate_batch_limits(spec.count, spec.concurrency) {
        return Err(PoolFailure {
            survivors: Vec::new(),
            error: err,
        });
    }
    if let Err(err) = config.validate() {
        return Err(PoolFailure {
            survivors: Vec::new(),
            error: err,
        });
    }

    let semaphore = Arc::new(Semaphore::new(spec.concurrency));
    let tracker = TaskTracker::new();
    let sessions: Arc<Mutex<Vec<Arc<dyn Session>>>> = Arc::new(Mutex::new(Vec::new()));
    let (error_tx, mut error_rx) = mpsc::channel::<String>(spec.count);

    for _ in 0..spec.count {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        let connector = connector.clone();
        let config = config.clone();
        let keepalive = spec.keepalive;
        let log_connect_time = spec.log_connect_time;
        let sessions = sessions.clone();
        let error_tx = error_tx.clone();
        tracker.spawn(async move {
            let started = Instant::now();
            let outcome = connector.connect(&config, keepalive).await;
            drop(permit);
            match outcome {
                Ok(session) => {
                    if log_connect_time {
                        info!("session joined in {}ms", started.elapsed().as_millis());
                    }
                    sessions.lock().unwrap().push(session);
                }
                Err(err) => {
                    let _ = error_tx.send(err.to_string()).await;
                }
            }
        });
    }
    drop(error_tx);

    tracker.close();
    tracker.wait().await;

    let mut failures = Vec::new();
    while let Some(message) = error_rx.recv().await {
        failures.push(message);
    }

    let survivors = std::mem::take(&mut *sessions.lock().unwrap());

    match aggregate(failures) {
        Ok(()) => Ok(survivors),
        Err(error) => Err(PoolFailure { survivors, error }),
    }
}
