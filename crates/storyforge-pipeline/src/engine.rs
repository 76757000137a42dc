//! Graph traversal: the run loop behind [`Graph::invoke`].

use storyforge_types::{ForgeError, Result};

use crate::graph::{Edge, Graph, Target};
use crate::node::NodeOutput;
use crate::state::GraphState;

impl<S: GraphState> Graph<S> {
    /// Execute one run of this graph from `initial` state to a terminal state.
    ///
    /// Each step runs the current node's handler, merges the returned patch
    /// into a fresh state snapshot under the per-field merge policy, appends
    /// the node's messages to the log, relays them to the instrumentation hook
    /// (unless the node is excluded), and follows the node's outgoing edge.
    /// Reaching [`Target::End`] returns the final state.
    ///
    /// A handler error aborts the run immediately; it is tagged with the stage
    /// name and propagated unchanged otherwise. No partial state is returned.
    ///
    /// The engine does not bound the number of loop iterations: cycles carry
    /// their own attempt ceilings inside the participating nodes, because
    /// different cycles need different ceilings and different fatal-error
    /// payloads.
    pub async fn invoke(&self, initial: S) -> Result<S> {
        let mut state = initial;
        let mut current = self.entry.clone();

        loop {
            let handler = self.nodes.get(&current).ok_or_else(|| {
                ForgeError::GraphConfig(format!("node '{current}' missing from compiled graph"))
            })?;

            tracing::debug!(node = %current, "running node");
            let NodeOutput { patch, messages } = handler
                .run(&state)
                .await
                .map_err(|e| e.at_stage(&current))?;

            state = state.merge(patch);
            state.push_messages(&messages);

            if !messages.is_empty() && !self.quiet.contains(&current) {
                if let Some(hook) = &self.hook {
                    hook(&state, &current, &messages);
                }
            }

            let target = match self.edges.get(&current) {
                Some(Edge::Direct(target)) => target.clone(),
                Some(Edge::Conditional { routes, pick }) => {
                    let picked = pick(&state);
                    // The declared routes were validated at compile time; a
                    // predicate escaping them is a defect reachable only at
                    // run time, surfaced as a fatal run error.
                    if !routes.contains(&picked) {
                        return Err(ForgeError::UnroutedBranch {
                            node: current.clone(),
                            target: picked.to_string(),
                        });
                    }
                    picked
                }
                None => {
                    return Err(ForgeError::GraphConfig(format!(
                        "node '{current}' missing an outgoing edge in compiled graph"
                    )))
                }
            };

            match target {
                Target::End => {
                    tracing::debug!(node = %current, "run reached terminal marker");
                    return Ok(state);
                }
                Target::Node(next) => {
                    tracing::debug!(from = %current, to = %next, "following edge");
                    current = next;
                }
            }
        }
    }
}
