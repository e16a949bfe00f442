//! Concurrency-bounded repeated-operation executor.
//!
//! Runs one operation (call, publish, register, subscribe) against a live
//! session, with ad-hoc load semantics: an optional one-time initial
//! delay, a repeat count, and a concurrency bound capping in-flight
//! executions. Repetitions are best-effort fan-out -- an error on one
//! never cancels the rest; every failure is collected through a bounded
//! channel and merged into a single aggregate after the pool drains.
//!
//! Worker pools are built the same way throughout the crate: a
//! [`TaskTracker`] for joining, a [`Semaphore`] for the concurrency bound,
//! and a bounded mpsc channel for error fan-in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::error::{aggregate, Error};
use crate::format;
use crate::handler::{HandlerBuilder, RegistrationMonitor};
use crate::session::{Dict, Event, EventHandler, List, Session};

/// One repeatable call or publish operation.
///
/// Numeric knobs are validated at construction and never silently
/// clamped: the repeat count must be at least one. A concurrency bound of
/// zero or one means strictly sequential execution; the delay applies
/// once, before the first repetition only.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    target: String,
    args: List,
    kwargs: Dict,
    options: Dict,
    repeat: u64,
    delay: Duration,
    concurrency: usize,
}

impl OperationSpec {
    /// Creates a spec for `target` (procedure or topic) with the given
    /// repeat count, initial delay, and concurrency bound.
    pub fn new(
        target: impl Into<String>,
        repeat: u64,
        delay: Duration,
        concurrency: usize,
    ) -> Result<Self, Error> {
        if repeat < 1 {
            return Err(Error::config("repeat count must be greater than zero"));
        }
        Ok(Self {
            target: target.into(),
            args: List::new(),
            kwargs: Dict::new(),
            options: Dict::new(),
            repeat,
            delay,
            concurrency,
        })
    }

    /// Sets the positional arguments sent with every repetition.
    pub fn with_args(mut self, args: List) -> Self {
        self.args = args;
        self
    }

    /// Sets the keyword arguments sent with every repetition.
    pub fn with_kwargs(mut self, kwargs: Dict) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Sets the options map sent with every repetition.
    pub fn with_options(mut self, options: Dict) -> Self {
        self.options = options;
        self
    }

    /// Target procedure or topic name.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Total number of executions.
    pub fn repeat(&self) -> u64 {
        self.repeat
    }

    /// One-time delay before the first execution.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Concurrency bound; zero and one both mean sequential.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// Submits `repeat` units of work onto a pool bounded by `concurrency`
/// permits, collects per-unit failures through a bounded channel, and
/// merges them after the pool fully drains.
///
/// Units have no defined relative or completion order; only the aggregate
/// count and aggregate error set are guaranteed.
async fn fan_out<F, Fut>(repeat: u64, concurrency: usize, op: F) -> Result<(), Error>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let tracker = TaskTracker::new();
    let (error_tx, mut error_rx) = mpsc::channel::<String>(repeat as usize);

    for i in 0..repeat {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        let unit = op(i);
        let error_tx = error_tx.clone();
        tracker.spawn(async move {
            let outcome = unit.await;
            drop(permit);
            if let Err(err) = outcome {
                let _ = error_tx.send(err.to_string()).await;
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
    aggregate(failures)
}

/// Executes a call operation `spec.repeat()` times.
///
/// Each repetition issues one call and logs the result in the stable text
/// layout at debug level. Failures are merged into a single aggregate
/// error after all repetitions complete.
pub async fn run_call(session: Arc<dyn Session>, spec: &OperationSpec) -> Result<(), Error> {
    if spec.delay > Duration::ZERO {
        tokio::time::sleep(spec.delay).await;
    }

    let spec = spec.clone();
    fan_out(spec.repeat, spec.concurrency, move |_| {
        let session = session.clone();
        let target = spec.target.clone();
        let options = spec.options.clone();
        let args = spec.args.clone();
        let kwargs = spec.kwargs.clone();
        async move {
            let result = session.call(&target, options, args, kwargs).await?;
            if let Ok(output) = format::args_kwargs(&result.args, &result.kwargs, None) {
                debug!("call result:\n{output}");
            }
            Ok(())
        }
    })
    .await
}

/// Executes a publish operation `spec.repeat()` times.
///
/// Identical delay/repeat/concurrency semantics to [`run_call`], without
/// awaiting anything beyond the transport acknowledgement.
pub async fn run_publish(session: Arc<dyn Session>, spec: &OperationSpec) -> Result<(), Error> {
    if spec.delay > Duration::ZERO {
        tokio::time::sleep(spec.delay).await;
    }

    let spec = spec.clone();
    fan_out(spec.repeat, spec.concurrency, move |_| {
        let session = session.clone();
        let target = spec.target.clone();
        let options = spec.options.clone();
        let args = spec.args.clone();
        let kwargs = spec.kwargs.clone();
        async move {
            session.publish(&target, options, args, kwargs).await?;
            Ok(())
        }
    })
    .await
}

/// Registers `procedure` with a [`HandlerBuilder`] callback, after an
/// optional one-time delay.
///
/// `command`, when set, is run through a subshell on every invocation and
/// its stdout becomes the response. A non-zero `max_invocations`
/// unregisters the procedure after that many invocations and closes the
/// owning session after a grace period; the returned monitor observes and
/// can cancel that deferred close.
pub async fn run_register(
    session: Arc<dyn Session>,
    procedure: &str,
    options: Dict,
    delay: Duration,
    command: Option<String>,
    max_invocations: u64,
) -> Result<RegistrationMonitor, Error> {
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }

    let mut builder = HandlerBuilder::new(session.clone(), procedure)
        .with_max_invocations(max_invocations);
    if let Some(command) = command {
        builder = builder.with_command(command);
    }
    let (handler, monitor) = builder.build();

    session.register(procedure, handler, options).await?;
    info!("registered procedure {procedure}");
    Ok(monitor)
}

/// Subscribes to `topic` with a handler that logs every received event in
/// the stable text layout, after an optional one-time delay.
///
/// `log_details` includes the broker-provided event details in the output.
pub async fn run_subscribe(
    session: Arc<dyn Session>,
    topic: &str,
    options: Dict,
    delay: Duration,
    log_details: bool,
) -> Result<(), Error> {
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }

    let handler: EventHandler = Arc::new(move |event: Event| {
        let details = if log_details {
            event.details.as_ref()
        } else {
            None
        };
        match format::args_kwargs(&event.args, &event.kwargs, details) {
            Ok(output) => info!("{output}"),
            Err(err) => debug!("failed to format event: {err}"),
        }
    });

    session.subscribe(topic, handler, options).await?;
    info!("subscribed to topic {topic}");
    Ok(())
}
