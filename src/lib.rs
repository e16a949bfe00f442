//! Broker Workload Driver Library
//!
//! This crate drives messaging-broker workloads: repeated calls and
//! publishes fanned out under a concurrency bound, bounded batches of
//! broker sessions, self-terminating invocation callbacks, and declarative
//! YAML compose scripts that exercise both sides of a broker in order.
//!
//! Broker access goes through the [`Session`] and [`Connector`] traits, so
//! every piece of machinery here works against any transport that
//! implements them, including in-process doubles in tests.
//!
//! # Examples
//!
//! ## Repeat a Call Under a Concurrency Bound
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wrench::{run_call, OperationSpec, Session};
//!
//! async fn hammer(session: Arc<dyn Session>) -> anyhow::Result<()> {
//!     let spec = OperationSpec::new(
//!         "com.example.procedure",
//!         100,            // repeat count
//!         Duration::ZERO, // one-time delay before the batch
//!         10,             // concurrency bound (0 = sequential)
//!     )?;
//!     run_call(session, &spec).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Run a Compose Script
//!
//! ```no_run
//! use std::sync::Arc;
//! use wrench::{compose, Compose, Session};
//!
//! async fn run(producer: Arc<dyn Session>, consumer: Arc<dyn Session>) -> anyhow::Result<()> {
//!     let document = std::fs::read_to_string("tasks.yaml")?;
//!     let script = Compose::from_yaml(&document)?;
//!     compose::execute(script, producer, consumer).await?;
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod compose;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod handler;
pub mod pool;
pub mod session;

pub use compose::{equal_args_kwargs, ArgsKwargs, Compose, Task, TaskSpec};
pub use config::{
    sanitize_url, validate_batch_limits, AuthMethod, ConnectionConfig, Serializer,
};
pub use error::{Error, SessionError};
pub use executor::{run_call, run_publish, run_register, run_subscribe, OperationSpec};
pub use handler::{HandlerBuilder, RegistrationMonitor, RegistrationState, CLOSE_GRACE};
pub use pool::{connect_sessions, PoolFailure, PoolSpec};
pub use session::{
    CallResult, Connector, Dict, Event, EventHandler, Invocation, InvocationHandler,
    InvokeResult, List, Session,
};
