//! Graph structure: named nodes, directed edges, entry point, terminal marker,
//! and eager construction-time validation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use storyforge_types::{ForgeError, Result};

use crate::instrument::MessageHook;
use crate::node::NodeHandler;
use crate::state::GraphState;

/// Where an edge leads: another node, or the terminal marker that ends the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(name) => f.write_str(name),
            Target::End => f.write_str("__end__"),
        }
    }
}

/// Outgoing edge of a node.
///
/// A conditional edge carries its predicate plus the declared list of targets
/// the predicate may return. The predicate returns a [`Target`] directly, so
/// branch outcomes are matched exhaustively at the definition site, and the
/// declared routes let [`GraphBuilder::compile`] verify every reachable target
/// exists before any run starts.
pub(crate) enum Edge<S> {
    Direct(Target),
    Conditional {
        routes: Vec<Target>,
        pick: Arc<dyn Fn(&S) -> Target + Send + Sync>,
    },
}

/// Builder for a workflow graph. Defects are collected as nodes and edges are
/// added and reported together by [`compile`](GraphBuilder::compile).
pub struct GraphBuilder<S: GraphState> {
    nodes: HashMap<String, Arc<dyn NodeHandler<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry: Option<String>,
    hook: Option<MessageHook<S>>,
    quiet: HashSet<String>,
    defects: Vec<String>,
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            hook: None,
            quiet: HashSet::new(),
            defects: Vec::new(),
        }
    }

    /// Register a node. Names must be unique within the graph.
    pub fn add_node(mut self, name: impl Into<String>, handler: impl NodeHandler<S> + 'static) -> Self {
        let name = name.into();
        if self.nodes.insert(name.clone(), Arc::new(handler)).is_some() {
            self.defects.push(format!("duplicate node '{name}'"));
        }
        self
    }

    /// Add an unconditional edge from `from` to `to`.
    pub fn add_edge(mut self, from: impl Into<String>, to: Target) -> Self {
        let from = from.into();
        if self.edges.insert(from.clone(), Edge::Direct(to)).is_some() {
            self.defects.push(format!("node '{from}' already has an outgoing edge"));
        }
        self
    }

    /// Add a conditional edge: `pick` is evaluated against the post-merge state
    /// and must return one of the declared `routes`.
    pub fn add_branch(
        mut self,
        from: impl Into<String>,
        routes: impl IntoIterator<Item = Target>,
        pick: impl Fn(&S) -> Target + Send + Sync + 'static,
    ) -> Self {
        let from = from.into();
        let routes: Vec<Target> = routes.into_iter().collect();
        if routes.is_empty() {
            self.defects.push(format!("conditional edge on '{from}' declares no routes"));
        }
        let edge = Edge::Conditional {
            routes,
            pick: Arc::new(pick),
        };
        if self.edges.insert(from.clone(), edge).is_some() {
            self.defects.push(format!("node '{from}' already has an outgoing edge"));
        }
        self
    }

    /// Set the entry node.
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Install the instrumentation hook invoked with each node's message delta.
    pub fn on_messages(mut self, hook: MessageHook<S>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Exclude a node from instrumentation (high-volume output that is not a
    /// human-readable progress note).
    pub fn quiet(mut self, name: impl Into<String>) -> Self {
        self.quiet.insert(name.into());
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Construction-time errors: a missing or unknown entry node, duplicate
    /// node names, an edge leaving an unknown node, a dangling edge target
    /// (direct or declared route), and any node without an outgoing edge.
    /// The terminal marker is explicit, so every node must lead somewhere.
    pub fn compile(self) -> Result<Graph<S>> {
        let mut defects = self.defects;

        let entry = match &self.entry {
            Some(name) if self.nodes.contains_key(name) => name.clone(),
            Some(name) => {
                defects.push(format!("entry node '{name}' is not registered"));
                String::new()
            }
            None => {
                defects.push("no entry node set".into());
                String::new()
            }
        };

        for from in self.edges.keys() {
            if !self.nodes.contains_key(from) {
                defects.push(format!("edge leaves unknown node '{from}'"));
            }
        }

        let check_target = |from: &str, target: &Target, defects: &mut Vec<String>| {
            if let Target::Node(name) = target {
                if !self.nodes.contains_key(name) {
                    defects.push(format!("edge from '{from}' references unknown node '{name}'"));
                }
            }
        };
        for (from, edge) in &self.edges {
            match edge {
                Edge::Direct(target) => check_target(from, target, &mut defects),
                Edge::Conditional { routes, .. } => {
                    for target in routes {
                        check_target(from, target, &mut defects);
                    }
                }
            }
        }

        for name in self.nodes.keys() {
            if !self.edges.contains_key(name) {
                defects.push(format!("node '{name}' has no outgoing edge"));
            }
        }

        if !defects.is_empty() {
            defects.sort();
            return Err(ForgeError::GraphConfig(defects.join("; ")));
        }

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            hook: self.hook,
            quiet: self.quiet,
        })
    }
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiled workflow graph. Immutable; a single instance may serve many
/// concurrent runs via [`invoke`](Graph::invoke).
pub struct Graph<S: GraphState> {
    pub(crate) nodes: HashMap<String, Arc<dyn NodeHandler<S>>>,
    pub(crate) edges: HashMap<String, Edge<S>>,
    pub(crate) entry: String,
    pub(crate) hook: Option<MessageHook<S>>,
    pub(crate) quiet: HashSet<String>,
}

impl<S: GraphState> Graph<S> {
    pub fn entry_node(&self) -> &str {
        &self.entry
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }
}

impl<S: GraphState> std::fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("quiet", &self.quiet)
            .finish()
    }
}
