//! Instrumentation hook: relays per-node progress messages to observers.
//!
//! The hook is a pure observability side channel. It receives the post-merge
//! state snapshot, the node name, and that node's message delta; it never
//! affects control flow or state.

use std::sync::Arc;

use crate::broker::{ProgressBroker, ProgressEvent};
use crate::state::GraphState;

/// Callback invoked by the executor after each node's messages are merged.
pub type MessageHook<S> = Arc<dyn Fn(&S, &str, &[String]) + Send + Sync>;

/// The standard hook: log each message, then forward
/// `{node, messages, timestamp}` to the broker under the run's stream id.
///
/// `stream_id_of` extracts the run's declared stream id from state; a run
/// without one (non-interactive caller) publishes nothing.
pub fn broker_hook<S, F>(broker: ProgressBroker, stream_id_of: F) -> MessageHook<S>
where
    S: GraphState,
    F: for<'a> Fn(&'a S) -> Option<&'a str> + Send + Sync + 'static,
{
    Arc::new(move |state, node, messages| {
        for message in messages {
            tracing::info!(node = %node, "{message}");
        }
        let Some(stream_id) = stream_id_of(state) else {
            return;
        };
        broker.publish(stream_id, ProgressEvent::now(node, messages.to_vec()));
    })
}
