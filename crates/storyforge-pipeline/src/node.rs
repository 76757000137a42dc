//! Node handler trait and the output contract shared by every node.

use async_trait::async_trait;

use storyforge_types::Result;

use crate::state::GraphState;

/// What a node handler returns: a state patch plus optional progress messages.
///
/// The patch is merged into the run's state under each field's declared merge
/// policy; the messages are appended to the state's message log and relayed to
/// the instrumentation hook.
#[derive(Debug)]
pub struct NodeOutput<P> {
    pub patch: P,
    pub messages: Vec<String>,
}

impl<P> NodeOutput<P> {
    pub fn new(patch: P) -> Self {
        Self {
            patch,
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = String>) -> Self {
        self.messages.extend(messages);
        self
    }
}

impl<P: Default> Default for NodeOutput<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

/// An asynchronous state-transforming step in a workflow graph.
///
/// Handlers are side-effect-free apart from their external calls; a fatal
/// condition is signalled by returning an error, which aborts the whole run.
#[async_trait]
pub trait NodeHandler<S: GraphState>: Send + Sync {
    async fn run(&self, state: &S) -> Result<NodeOutput<S::Patch>>;
}

/// Adapter so plain async functions and closures can serve as node handlers.
pub struct FnHandler<F>(F);

/// Wrap an async function `Fn(S) -> Future<Result<NodeOutput>>` as a node
/// handler. The state is cloned into the call, matching the engine's
/// copy-on-merge discipline.
pub fn node_fn<S, F, Fut>(f: F) -> FnHandler<F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<NodeOutput<S::Patch>>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<S, F, Fut> NodeHandler<S> for FnHandler<F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<NodeOutput<S::Patch>>> + Send,
{
    async fn run(&self, state: &S) -> Result<NodeOutput<S::Patch>> {
        (self.0)(state.clone()).await
    }
}
