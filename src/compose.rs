//! Declarative compose documents and their execution engine.
//!
//! A compose document is an ordered YAML script of heterogeneous tasks
//! (register, call, subscribe, publish) executed against two live
//! sessions: a producer side that registers and subscribes, and a
//! consumer side that calls and publishes. Tasks run strictly in order --
//! task N+1 never starts until task N's primary effect is acknowledged.
//!
//! Each task kind carries only the fields legal for it. The YAML surface
//! is flat and cannot express that by construction, so the raw
//! [`TaskSpec`] is validated into the [`Task`] sum type before execution;
//! any violation aborts the whole run before side effects compound.
//! Expectation payloads (expected invocation, call result, event) are
//! diffed structurally against what the broker actually delivers;
//! mismatches are diagnostics only and never halt execution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::Error;
use crate::session::{
    Dict, Event, EventHandler, Invocation, InvocationHandler, InvokeResult, List, Session,
};

const REGISTER: &str = "register";
const CALL: &str = "call";
const SUBSCRIBE: &str = "subscribe";
const PUBLISH: &str = "publish";

/// A positional-argument sequence plus a keyword-argument mapping, used
/// both as task payloads and as expectation values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgsKwargs {
    /// Positional values.
    #[serde(default)]
    pub args: List,
    /// Keyword values.
    #[serde(default)]
    pub kwargs: Dict,
}

/// Structural deep equality over a positional sequence and a keyword
/// mapping. Any difference in length, type, or value anywhere is a
/// mismatch.
pub fn equal_args_kwargs(list1: &List, list2: &List, dict1: &Dict, dict2: &Dict) -> bool {
    list1 == list2 && dict1 == dict2
}

/// One task as it appears in the YAML document: a flat bag of optional
/// fields. [`TaskSpec::validate`] narrows it into a [`Task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Free-form task label used in logs.
    #[serde(default)]
    pub name: String,
    /// Task kind: one of `register`, `call`, `subscribe`, `publish`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Options map forwarded to the protocol operation.
    #[serde(default)]
    pub options: Dict,
    /// Target procedure (register and call only).
    #[serde(default)]
    pub procedure: String,
    /// Target topic (subscribe and publish only).
    #[serde(default)]
    pub topic: String,
    /// Response the registered callback yields (register only).
    #[serde(rename = "yield", default)]
    pub yield_result: Option<ArgsKwargs>,
    /// Expected invocation payload (register only).
    #[serde(default)]
    pub invocation: Option<ArgsKwargs>,
    /// Payload sent with the operation (call and publish only).
    #[serde(default)]
    pub parameters: Option<ArgsKwargs>,
    /// Expected call result (call only).
    #[serde(default)]
    pub result: Option<ArgsKwargs>,
    /// Expected event payload (subscribe only).
    #[serde(default)]
    pub event: Option<ArgsKwargs>,
}

/// A validated compose task, carrying only the fields legal for its kind.
#[derive(Debug, Clone)]
pub enum Task {
    /// Install an invocation callback on the producer session.
    Register {
        /// Log label.
        name: String,
        /// Procedure to register.
        procedure: String,
        /// Registration options.
        options: Dict,
        /// Expected payload of each invocation, diffed when present.
        invocation: Option<ArgsKwargs>,
        /// Response the callback yields; empty result when absent.
        yield_result: Option<ArgsKwargs>,
    },
    /// Issue a call from the consumer session and await its result.
    Call {
        /// Log label.
        name: String,
        /// Procedure to call.
        procedure: String,
        /// Call options.
        options: Dict,
        /// Payload sent with the call; empty when absent.
        parameters: Option<ArgsKwargs>,
        /// Expected call result, diffed when present.
        result: Option<ArgsKwargs>,
    },
    /// Install an event callback on the producer session.
    Subscribe {
        /// Log label.
        name: String,
        /// Topic to subscribe to.
        topic: String,
        /// Subscription options.
        options: Dict,
        /// Expected payload of each event, diffed when present.
        event: Option<ArgsKwargs>,
    },
    /// Publish from the consumer session.
    Publish {
        /// Log label.
        name: String,
        /// Topic to publish to.
        topic: String,
        /// Publish options.
        options: Dict,
        /// Payload to publish; empty when absent.
        parameters: Option<ArgsKwargs>,
    },
}

impl TaskSpec {
    /// Enforces per-kind field legality and produces the validated task.
    ///
    /// Violations are fatal for the whole compose run: a forbidden field
    /// on any task aborts before anything executes further.
    pub fn validate(self) -> Result<Task, Error> {
        match self.kind.as_str() {
            REGISTER => {
                if self.procedure.is_empty() {
                    return Err(Error::task("procedure is required for register"));
                }
                if !self.topic.is_empty() {
                    return Err(Error::task("topic is not required for register"));
                }
                if self.event.is_some() {
                    return Err(Error::task("event is not required for register"));
                }
                if self.result.is_some() {
                    return Err(Error::task("result is not required for register"));
                }
                if self.parameters.is_some() {
                    return Err(Error::task("parameters are not required for register"));
                }
                Ok(Task::Register {
                    name: self.name,
                    procedure: self.procedure,
                    options: self.options,
                    invocation: self.invocation,
                    yield_result: self.yield_result,
                })
            }
            CALL => {
                if self.procedure.is_empty() {
                    return Err(Error::task("procedure is required for call"));
                }
                if !self.topic.is_empty() {
                    return Err(Error::task("topic is not required for call"));
                }
                if self.event.is_some() {
                    return Err(Error::task("event is not required for call"));
                }
                if self.yield_result.is_some() {
                    return Err(Error::task("yield is not required for call"));
                }
                if self.invocation.is_some() {
                    return Err(Error::task("invocation are not required for call"));
                }
                Ok(Task::Call {
                    name: self.name,
                    procedure: self.procedure,
                    options: self.options,
                    parameters: self.parameters,
                    result: self.result,
                })
            }
            SUBSCRIBE => {
                if self.topic.is_empty() {
                    return Err(Error::task("topic is required for subscribe"));
                }
                if !self.procedure.is_empty() {
                    return Err(Error::task("procedure is not required for subscribe"));
                }
                if self.result.is_some() {
                    return Err(Error::task("result is not required for subscribe"));
                }
                if self.yield_result.is_some() {
                    return Err(Error::task("yield is not required for subscribe"));
                }
                if self.invocation.is_some() {
                    return Err(Error::task("invocation is not required for subscribe"));
                }
                if self.parameters.is_some() {
                    return Err(Error::task("parameters are not required for subscribe"));
                }
                Ok(Task::Subscribe {
                    name: self.name,
                    topic: self.topic,
                    options: self.options,
                    event: self.event,
                })
            }
            PUBLISH => {
                if self.topic.is_empty() {
                    return Err(Error::task("topic is required for publish"));
                }
                if !self.procedure.is_empty() {
                    return Err(Error::task("procedure is not required for publish"));
                }
                if self.result.is_some() {
                    return Err(Error::task("result is not required for publish"));
                }
                if self.yield_result.is_some() {
                    return Err(Error::task("yield is not required for publish"));
                }
                if self.invocation.is_some() {
                    return Err(Error::task("invocation is not required for publish"));
                }
                if self.event.is_some() {
                    return Err(Error::task("event is not required for publish"));
                }
                Ok(Task::Publish {
                    name: self.name,
                    topic: self.topic,
                    options: self.options,
                    parameters: self.parameters,
                })
            }
            other => Err(Error::task(format!(
                "{other} not supported: supported types are {REGISTER}, {CALL}, {SUBSCRIBE}, {PUBLISH}"
            ))),
        }
    }
}

/// A parsed compose document: a version tag and the ordered task list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Compose {
    /// Document schema version.
    #[serde(default)]
    pub version: String,
    /// Tasks, consumed strictly in list order.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Compose {
    /// Parses a compose document from YAML.
    pub fn from_yaml(document: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(document)?)
    }
}

fn compact_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unencodable>".to_string())
}

/// Logs an expectation mismatch. Diagnostics only: mismatches never change
/// control flow or the returned status.
fn report_mismatch(what: &str, expected: &ArgsKwargs, args: &List, kwargs: &Dict) {
    error!(
        "actual {what} is not equal to expected {what}: expected={} {} actual={} {}",
        compact_json(&expected.args),
        compact_json(&expected.kwargs),
        compact_json(args),
        compact_json(kwargs),
    );
}

/// Builds the invocation callback for a register task: diffs each actual
/// invocation against the expectation when one is declared and yields the
/// declared response, or an empty result.
fn compose_invocation_handler(
    invocation: Option<ArgsKwargs>,
    yield_result: Option<ArgsKwargs>,
) -> InvocationHandler {
    Arc::new(move |actual: Invocation| {
        let invocation = invocation.clone();
        let yield_result = yield_result.clone();
        Box::pin(async move {
            if let Some(expected) = &invocation {
                if !equal_args_kwargs(&expected.args, &actual.args, &expected.kwargs, &actual.kwargs)
                {
                    report_mismatch("invocation", expected, &actual.args, &actual.kwargs);
                }
            }
            debug!(
                "procedure called with args:{} and kwargs:{}",
                compact_json(&actual.args),
                compact_json(&actual.kwargs)
            );
            match yield_result {
                Some(response) => InvokeResult {
                    args: response.args,
                    kwargs: response.kwargs,
                    err: None,
                },
                None => InvokeResult::default(),
            }
        })
    })
}

/// Builds the event callback for a subscribe task: diffs each received
/// event against the expectation when one is declared.
fn compose_event_handler(event: Option<ArgsKwargs>) -> EventHandler {
    Arc::new(move |actual: Event| {
        if let Some(expected) = &event {
            if !equal_args_kwargs(&expected.args, &actual.args, &expected.kwargs, &actual.kwargs) {
                report_mismatch("event", expected, &actual.args, &actual.kwargs);
            }
        }
    })
}

/// Executes every task in the compose document, strictly in order.
///
/// `producer` registers and subscribes; `consumer` calls and publishes.
/// The first field-legality violation or protocol failure aborts the run
/// with an error; expectation mismatches are logged and execution
/// continues.
pub async fn execute(
    compose: Compose,
    producer: Arc<dyn Session>,
    consumer: Arc<dyn Session>,
) -> Result<(), Error> {
    for spec in compose.tasks {
        match spec.validate()? {
            Task::Register {
                name,
                procedure,
                options,
                invocation,
                yield_result,
            } => {
                let handler = compose_invocation_handler(invocation, yield_result);
                producer.register(&procedure, handler, options).await?;
                info!(task = %name, "registered procedure {procedure}");
            }
            Task::Call {
                name,
                procedure,
                options,
                parameters,
                result,
            } => {
                let parameters = parameters.unwrap_or_default();
                let actual = consumer
                    .call(&procedure, options, parameters.args, parameters.kwargs)
                    .await?;
                if let Some(expected) = &result {
                    if !equal_args_kwargs(
                        &expected.args,
                        &actual.args,
                        &expected.kwargs,
                        &actual.kwargs,
                    ) {
                        report_mismatch("call result", expected, &actual.args, &actual.kwargs);
                    }
                }
                info!(task = %name, "called procedure {procedure}");
                debug!(
                    "call results: args:{} kwargs:{}",
                    compact_json(&actual.args),
                    compact_json(&actual.kwargs)
                );
            }
            Task::Subscribe {
                name,
                topic,
                options,
                event,
            } => {
                let handler = compose_event_handler(event);
                producer.subscribe(&topic, handler, options).await?;
                info!(task = %name, "subscribed to topic {topic}");
            }
            Task::Publish {
                name,
                topic,
                options,
                parameters,
            } => {
                let parameters = parameters.unwrap_or_default();
                consumer
                    .publish(&topic, options, parameters.args, parameters.kwargs)
                    .await?;
                info!(task = %name, "published to topic {topic}");
            }
        }
    }
    Ok(())
}
