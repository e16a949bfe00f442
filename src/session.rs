//! Session and connector seams to the external protocol layer.
//!
//! The wire protocol and transport are not implemented here. The driver
//! talks to the broker exclusively through the [`Session`] trait (call,
//! publish, register, subscribe, teardown) and obtains sessions through
//! the [`Connector`] capability, which is passed explicitly into the pool
//! builder and executors so tests can substitute in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::config::ConnectionConfig;
use crate::error::SessionError;

/// Positional argument sequence carried by calls, publishes, and events.
pub type List = Vec<serde_json::Value>;

/// Keyword argument mapping carried by calls, publishes, and events.
pub type Dict = serde_json::Map<String, serde_json::Value>;

/// One invocation of a registered procedure, as delivered by the broker.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Positional arguments of the call.
    pub args: List,
    /// Keyword arguments of the call.
    pub kwargs: Dict,
    /// Broker-provided invocation details, when disclosed.
    pub details: Option<Dict>,
}

/// The response a registered procedure yields back to its caller.
#[derive(Debug, Clone, Default)]
pub struct InvokeResult {
    /// Positional result values.
    pub args: List,
    /// Keyword result values.
    pub kwargs: Dict,
    /// Error URI when the invocation should fail instead of yielding.
    pub err: Option<String>,
}

impl InvokeResult {
    /// A successful result carrying the given positional values.
    pub fn with_args(args: List) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    /// A failed invocation carrying an error URI and detail arguments.
    pub fn error(uri: impl Into<String>, args: List) -> Self {
        Self {
            args,
            kwargs: Dict::new(),
            err: Some(uri.into()),
        }
    }
}

/// One published event, as delivered to a subscriber.
#[derive(Debug, Clone, Default)]
pub struct Event {
    /// Positional payload of the event.
    pub args: List,
    /// Keyword payload of the event.
    pub kwargs: Dict,
    /// Broker-provided event details, when disclosed.
    pub details: Option<Dict>,
}

/// The result of a completed call.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    /// Positional result values.
    pub args: List,
    /// Keyword result values.
    pub kwargs: Dict,
}

/// Callback invoked for each call routed to a registered procedure.
pub type InvocationHandler =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, InvokeResult> + Send + Sync>;

/// Callback invoked for each event delivered to a subscription.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// A live, authenticated connection to the broker.
///
/// Exclusively owned by its creating execution path (shared via `Arc`
/// where fan-out requires it). Must be closed exactly once; every
/// operation after close fails with [`SessionError::Closed`].
#[async_trait]
pub trait Session: Send + Sync {
    /// Issues a call and waits for its result. The response timeout is
    /// owned by the transport, not by the driver.
    async fn call(
        &self,
        procedure: &str,
        options: Dict,
        args: List,
        kwargs: Dict,
    ) -> Result<CallResult, SessionError>;

    /// Publishes to a topic. No response is awaited beyond the
    /// transport-level acknowledgement.
    async fn publish(
        &self,
        topic: &str,
        options: Dict,
        args: List,
        kwargs: Dict,
    ) -> Result<(), SessionError>;

    /// Registers a procedure with the given invocation callback.
    async fn register(
        &self,
        procedure: &str,
        handler: InvocationHandler,
        options: Dict,
    ) -> Result<(), SessionError>;

    /// Subscribes to a topic with the given event callback.
    async fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
        options: Dict,
    ) -> Result<(), SessionError>;

    /// Removes a registration previously installed by this session.
    async fn unregister(&self, procedure: &str) -> Result<(), SessionError>;

    /// Removes a subscription previously installed by this session.
    async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError>;

    /// Leaves the realm and tears the connection down.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Capability for opening new sessions.
///
/// Passed explicitly into the pool builder rather than resolved through
/// shared mutable bindings, so test doubles plug in without global state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one session for the given configuration. `keepalive` is the
    /// transport ping interval; `Duration::ZERO` disables keep-alive.
    async fn connect(
        &self,
        config: &ConnectionConfig,
        keepalive: Duration,
    ) -> Result<Arc<dyn Session>, SessionError>;
}
