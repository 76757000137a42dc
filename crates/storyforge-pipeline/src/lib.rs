//! Workflow graph execution engine for multi-stage generation pipelines.
//!
//! A [`Graph`] holds named asynchronous nodes and directed edges (unconditional
//! or predicate-selected), with an explicit entry point and terminal marker.
//! [`Graph::invoke`] drives one run: each node returns a state patch plus
//! progress messages, the patch is merged copy-on-write under the state's
//! declared per-field merge policy, and messages are relayed to an
//! instrumentation hook that fans them out to [`broker::ProgressBroker`]
//! subscribers. External calls inside handlers go through
//! [`retry::with_retry`], which absorbs transient rate-limit failures with
//! exponential backoff.

pub mod broker;
pub mod engine;
pub mod graph;
pub mod instrument;
pub mod node;
pub mod retry;
pub mod state;

pub use broker::{Frame, ProgressBroker, ProgressEvent, Subscription, DEFAULT_HEARTBEAT_INTERVAL};
pub use graph::{Graph, GraphBuilder, Target};
pub use instrument::{broker_hook, MessageHook};
pub use node::{node_fn, FnHandler, NodeHandler, NodeOutput};
pub use retry::{with_retry, RetryPolicy};
pub use state::{append, overwrite, GraphState, Update};
