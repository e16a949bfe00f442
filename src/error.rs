//! Error types for the broker driver.
//!
//! Defines [`Error`] for configuration, batch, and compose failures, and
//! [`SessionError`] for protocol and transport errors reported by the
//! external [`Session`](crate::session::Session) implementation.
//!
//! Batch operations (session pools, repeated calls/publishes) never fail
//! fast: every unit of work reports its outcome, and the coordinator merges
//! all failures into a single [`Error::Batch`] after the pool drains.

/// Errors returned by the driver to its caller.
///
/// Expectation mismatches and shell-command failures are deliberately
/// absent: those are log-only diagnostics and never change control flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration -- rejected before any connection attempt or
    /// operation is started (bad counts, conflicting credentials, ...).
    #[error("{message}")]
    Config {
        /// Human-readable description of the invalid value.
        message: String,
    },

    /// One or more units of a batch failed. Carries every failure, one
    /// line per failed unit, merged after the whole pool drained.
    #[error("got errors:\n{}", .failures.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n"))]
    Batch {
        /// One message per failed unit of work, in drain order.
        failures: Vec<String>,
    },

    /// A compose task violated the per-kind field legality rules. Fatal:
    /// aborts the whole run on the first violation.
    #[error("{message}")]
    Task {
        /// Which field was missing or illegal for which task kind.
        message: String,
    },

    /// Protocol or transport failure reported by the session layer.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A `:=`-prefixed file reference could not be read.
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path portion of the file reference.
        path: String,
        source: std::io::Error,
    },

    /// The compose document is not valid YAML or does not match the schema.
    #[error("failed to parse compose document: {0}")]
    ComposeParse(#[from] serde_yaml::Error),

    /// JSON encoding failure while producing the stable text layouts.
    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Builds a configuration error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Builds a compose-validation error from a message.
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}

/// Merges collected per-unit failures into the batch result.
///
/// Returns `Ok(())` when every unit succeeded, otherwise one combined
/// [`Error::Batch`] listing every failure.
pub(crate) fn aggregate(failures: Vec<String>) -> Result<(), Error> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Batch { failures })
    }
}

/// Protocol and transport errors produced by [`Session`](crate::session::Session)
/// and [`Connector`](crate::session::Connector) implementations.
///
/// The driver consumes these, it never constructs broker-side failures of
/// its own beyond [`SessionError::Closed`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// An error URI returned by the broker for a call, registration,
    /// subscription, or publish.
    #[error("broker error {uri}{}", if .message.is_empty() { String::new() } else { format!(": {}", .message) })]
    Broker {
        /// WAMP-style error URI, e.g. `wamp.error.no_such_procedure`.
        uri: String,
        /// Optional detail accompanying the error.
        message: String,
    },

    /// The call exceeded the response timeout owned by the transport.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (resolve, dial, handshake, auth).
    #[error("connection error: {message}")]
    Connection {
        /// Transport-provided detail.
        message: String,
    },

    /// The session was already closed.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Shorthand for a broker error with the given URI and no detail.
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Broker {
            uri: uri.into(),
            message: String::new(),
        }
    }
}
