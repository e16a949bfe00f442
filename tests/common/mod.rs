//! In-process broker double shared by the integration tests.
//!
//! [`LocalBroker`] keeps registration and subscription tables behind a
//! mutex and routes calls, invocations, and events entirely in memory, so
//! the driver machinery can be exercised end to end without a network.

// Each test binary uses a subset of this module.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use wrench::{
    CallResult, ConnectionConfig, Connector, Dict, Event, EventHandler, Invocation,
    InvocationHandler, List, Session, SessionError,
};

static TRACING: Once = Once::new();

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call from
/// every test; only the first call wins.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
struct BrokerState {
    procedures: HashMap<String, (u64, InvocationHandler)>,
    subscriptions: HashMap<String, Vec<(u64, EventHandler)>>,
}

/// An in-memory broker: sessions attached to the same broker see each
/// other's registrations and subscriptions.
#[derive(Default)]
pub struct LocalBroker {
    state: Mutex<BrokerState>,
    next_session_id: AtomicU64,
}

impl LocalBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a fresh session to this broker.
    pub fn session(self: &Arc<Self>) -> Arc<LocalSession> {
        Arc::new(LocalSession {
            broker: self.clone(),
            id: self.next_session_id.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
        })
    }

    /// Drops every registration and subscription owned by `session_id`.
    fn evict(&self, session_id: u64) {
        let mut state = self.state.lock().unwrap();
        state.procedures.retain(|_, (owner, _)| *owner != session_id);
        for handlers in state.subscriptions.values_mut() {
            handlers.retain(|(owner, _)| *owner != session_id);
        }
    }
}

/// One attached session. Closing it evicts everything it installed;
/// further operations fail with [`SessionError::Closed`].
pub struct LocalSession {
    broker: Arc<LocalBroker>,
    id: u64,
    closed: AtomicBool,
}

impl LocalSession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for LocalSession {
    async fn call(
        &self,
        procedure: &str,
        _options: Dict,
        args: List,
        kwargs: Dict,
    ) -> Result<CallResult, SessionError> {
        self.ensure_open()?;
        let handler = {
            let state = self.broker.state.lock().unwrap();
            match state.procedures.get(procedure) {
                Some((_, handler)) => handler.clone(),
                None => return Err(SessionError::uri("wamp.error.no_such_procedure")),
            }
        };
        let result = handler(Invocation {
            args,
            kwargs,
            details: None,
        })
        .await;
        if let Some(uri) = result.err {
            return Err(SessionError::Broker {
                uri,
                message: String::new(),
            });
        }
        Ok(CallResult {
            args: result.args,
            kwargs: result.kwargs,
        })
    }

    async fn publish(
        &self,
        topic: &str,
        _options: Dict,
        args: List,
        kwargs: Dict,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let handlers: Vec<EventHandler> = {
            let state = self.broker.state.lock().unwrap();
            state
                .subscriptions
                .get(topic)
                .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(Event {
                args: args.clone(),
                kwargs: kwargs.clone(),
                details: None,
            });
        }
        Ok(())
    }

    async fn register(
        &self,
        procedure: &str,
        handler: InvocationHandler,
        _options: Dict,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock().unwrap();
        if state.procedures.contains_key(procedure) {
            return Err(SessionError::uri("wamp.error.procedure_already_exists"));
        }
        state
            .procedures
            .insert(procedure.to_string(), (self.id, handler));
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
        _options: Dict,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock().unwrap();
        state
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .push((self.id, handler));
        Ok(())
    }

    async fn unregister(&self, procedure: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock().unwrap();
        match state.procedures.get(procedure) {
            Some((owner, _)) if *owner == self.id => {
                state.procedures.remove(procedure);
                Ok(())
            }
            _ => Err(SessionError::uri("wamp.error.no_such_registration")),
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock().unwrap();
        let Some(handlers) = state.subscriptions.get_mut(topic) else {
            return Err(SessionError::uri("wamp.error.no_such_subscription"));
        };
        let before = handlers.len();
        handlers.retain(|(owner, _)| *owner != self.id);
        if handlers.len() == before {
            return Err(SessionError::uri("wamp.error.no_such_subscription"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.broker.evict(self.id);
        Ok(())
    }
}

/// Connector that attaches sessions to a shared [`LocalBroker`] and can be
/// scripted to fail on selected attempts.
pub struct LocalConnector {
    broker: Arc<LocalBroker>,
    attempts: AtomicUsize,
    fail_attempts: Vec<usize>,
}

impl LocalConnector {
    pub fn new(broker: Arc<LocalBroker>) -> Self {
        Self {
            broker,
            attempts: AtomicUsize::new(0),
            fail_attempts: Vec::new(),
        }
    }

    /// Fails the given zero-based connection attempts with a connection
    /// error naming the attempt.
    pub fn failing_on(broker: Arc<LocalBroker>, fail_attempts: Vec<usize>) -> Self {
        Self {
            broker,
            attempts: AtomicUsize::new(0),
            fail_attempts,
        }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
        _keepalive: Duration,
    ) -> Result<Arc<dyn Session>, SessionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_attempts.contains(&attempt) {
            return Err(SessionError::Connection {
                message: format!("dial refused for attempt {attempt}"),
            });
        }
        Ok(self.broker.session())
    }
}
