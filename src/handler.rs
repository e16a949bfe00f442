//! Invocation handler construction for ad-hoc registrations.
//!
//! [`HandlerBuilder`] produces the callback a registered procedure uses to
//! answer invocations. The callback logs each received payload in the
//! stable text layout, optionally shells out to produce the response, and
//! -- when a maximum invocation count is configured -- unregisters itself
//! and closes the owning session after a short grace period.
//!
//! The deferred close is a cancellable timer, not a detached background
//! action: tearing the registration down externally before the grace
//! period elapses cancels the pending close instead of leaving a dangling
//! close aimed at a dead session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::format;
use crate::session::{Invocation, InvocationHandler, InvokeResult, Session};

/// Grace period between exhausting the invocation count and closing the
/// owning session.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of a count-limited registration.
///
/// `Active(remaining=N) -> ... -> Active(remaining=1) -> Unregistering ->
/// (grace delay) -> Closed`. No transition skips the grace delay; once
/// `Closed`, invocation is impossible. Registrations without a maximum
/// invocation count stay `Active` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Accepting invocations; `remaining` is `None` for unlimited.
    Active {
        /// Invocations left before self-termination, when limited.
        remaining: Option<u64>,
    },
    /// Count exhausted: unregistered, close timer running.
    Unregistering,
    /// The owning session has been closed.
    Closed,
}

struct HandlerShared {
    session: Arc<dyn Session>,
    procedure: String,
    command: Option<String>,
    grace: Duration,
    state: Mutex<RegistrationState>,
    close_cancel: CancellationToken,
}

impl HandlerShared {
    async fn handle(self: Arc<Self>, invocation: Invocation) -> InvokeResult {
        match *self.state.lock().unwrap() {
            RegistrationState::Active { .. } => {}
            // The broker has already dropped the registration; this only
            // fires on calls racing the unregister.
            _ => return InvokeResult::error("wamp.error.no_such_procedure", Vec::new()),
        }

        let output = match format::args_kwargs(
            &invocation.args,
            &invocation.kwargs,
            invocation.details.as_ref(),
        ) {
            Ok(output) => output,
            Err(err) => {
                return InvokeResult::error(
                    "wamp.error.internal_error",
                    vec![serde_json::Value::from(err.to_string())],
                )
            }
        };
        info!("{output}");

        let result = match &self.command {
            Some(command) => self.shell_out(command).await,
            None => String::new(),
        };

        if self.consume_one_invocation() {
            self.terminate().await;
        }

        InvokeResult::with_args(vec![serde_json::Value::from(result)])
    }

    /// Runs the configured command through a subshell. Stdout is the
    /// response payload; any failure is logged only and the response
    /// degrades to an empty string.
    async fn shell_out(&self, command: &str) -> String {
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
        {
            Ok(output) => {
                if !output.status.success() {
                    warn!(
                        command,
                        status = %output.status,
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "command exited with failure"
                    );
                }
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Err(err) => {
                error!(command, "failed to run command: {err}");
                String::new()
            }
        }
    }

    /// Decrements the remaining-invocation counter. Returns `true` when
    /// the count just reached zero and termination should start.
    fn consume_one_invocation(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if let RegistrationState::Active {
            remaining: Some(remaining),
        } = *state
        {
            let remaining = remaining - 1;
            if remaining == 0 {
                *state = RegistrationState::Unregistering;
                return true;
            }
            *state = RegistrationState::Active {
                remaining: Some(remaining),
            };
        }
        false
    }

    /// Unregisters the procedure and schedules the session close after the
    /// grace period. The close is cancellable through `close_cancel`.
    async fn terminate(self: &Arc<Self>) {
        if let Err(err) = self.session.unregister(&self.procedure).await {
            warn!(procedure = %self.procedure, "unregister failed: {err}");
        }
        let shared = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(shared.grace) => {
                    info!("session closing");
                    if let Err(err) = shared.session.close().await {
                        warn!("session close failed: {err}");
                    }
                    *shared.state.lock().unwrap() = RegistrationState::Closed;
                }
                _ = shared.close_cancel.cancelled() => {
                    debug!(procedure = %shared.procedure, "deferred session close cancelled");
                }
            }
        });
    }
}

/// Observes and controls a registration built by [`HandlerBuilder`].
#[derive(Clone)]
pub struct RegistrationMonitor {
    shared: Arc<HandlerShared>,
}

impl RegistrationMonitor {
    /// Current lifecycle state.
    pub fn state(&self) -> RegistrationState {
        *self.shared.state.lock().unwrap()
    }

    /// Cancels a pending deferred close. Call this when the registration
    /// is torn down externally before the grace period elapses; a close
    /// that already ran is unaffected.
    pub fn cancel_close(&self) {
        self.shared.close_cancel.cancel();
    }
}

/// Builds the invocation callback for an ad-hoc registration.
pub struct HandlerBuilder {
    session: Arc<dyn Session>,
    procedure: String,
    command: Option<String>,
    max_invocations: Option<u64>,
    grace: Duration,
}

impl HandlerBuilder {
    /// Creates a builder for the given owning session and procedure name.
    pub fn new(session: Arc<dyn Session>, procedure: impl Into<String>) -> Self {
        Self {
            session,
            procedure: procedure.into(),
            command: None,
            max_invocations: None,
            grace: CLOSE_GRACE,
        }
    }

    /// Runs `command` through a subshell on every invocation; its stdout
    /// becomes the response payload.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Unregisters after `count` invocations, then closes the owning
    /// session after the grace period. `count` of zero means unlimited.
    pub fn with_max_invocations(mut self, count: u64) -> Self {
        self.max_invocations = if count == 0 { None } else { Some(count) };
        self
    }

    /// Overrides the close grace period (defaults to [`CLOSE_GRACE`]).
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Produces the invocation callback and a monitor over its lifecycle.
    pub fn build(self) -> (InvocationHandler, RegistrationMonitor) {
        let shared = Arc::new(HandlerShared {
            session: self.session,
            procedure: self.procedure,
            command: self.command,
            grace: self.grace,
            state: Mutex::new(RegistrationState::Active {
                remaining: self.max_invocations,
            }),
            close_cancel: CancellationToken::new(),
        });

        let handler_shared = shared.clone();
        let handler: InvocationHandler = Arc::new(move |invocation| {
            let shared = handler_shared.clone();
            Box::pin(shared.handle(invocation))
        });

        (handler, RegistrationMonitor { shared })
    }
}
