//! The tagged dependency graph and its gated traversal.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::{Bfs, EdgeRef},
};
use serde::Serialize;

pub(crate) mod builder;
pub(crate) mod node;

pub(crate) use node::{Node, NodeKey, NodeKind};

/// The tag carried by workflows that only run on `pull_request_target`
/// label events.
pub(crate) const LABELED_TRIGGER: &str = "pull_request_target:labeled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Relation {
    /// repo → workflow, workflow → root job, job/action → step.
    Contains,
    /// dependency → dependent job.
    Needs,
    /// job → called workflow, step → action.
    Uses,
    /// step → following step in the same job.
    Next,
}

/// Per-path traversal state.
#[derive(Debug, Clone, Copy, Default)]
struct PathContext {
    labeled: bool,
    mutable_checkout: bool,
    soft_gated: bool,
}

/// A directed graph of workflows, jobs, steps and actions, indexed by
/// node identity and by tag.
///
/// The graph is append-only: nodes are never removed, although an
/// uninitialized node may be replaced by its populated counterpart.
#[derive(Debug, Default)]
pub(crate) struct TaggedGraph {
    graph: DiGraph<Node, Relation>,
    index: HashMap<NodeKey, NodeIndex>,
    tags: HashMap<String, BTreeSet<NodeIndex>>,
}

impl TaggedGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    #[cfg(test)]
    pub(crate) fn lookup(&self, key: &NodeKey) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph
            .node_indices()
            .map(|idx| (idx, &self.graph[idx]))
    }

    fn index_tags(&mut self, idx: NodeIndex) {
        for tag in self.graph[idx].tags() {
            self.tags.entry(tag).or_default().insert(idx);
        }
    }

    fn unindex_tags(&mut self, idx: NodeIndex) {
        for tag in self.graph[idx].tags() {
            if let Some(nodes) = self.tags.get_mut(&tag) {
                nodes.remove(&idx);
            }
        }
    }

    /// Returns the handle for `node`'s identity, inserting it if absent.
    ///
    /// If the existing node is uninitialized and `node` isn't, the
    /// existing node's contents are replaced and its tags recomputed.
    pub(crate) fn get_or_insert(&mut self, node: Node) -> NodeIndex {
        let key = node.key();

        match self.index.get(&key).copied() {
            Some(idx) => {
                if !self.graph[idx].is_initialized() && node.is_initialized() {
                    tracing::debug!("initializing {} {}", key.kind, key.name);
                    self.replace(idx, node);
                }
                idx
            }
            None => {
                tracing::debug!(attrs = ?node.attrs(), "adding node");
                let idx = self.graph.add_node(node);
                self.index.insert(key, idx);
                self.index_tags(idx);
                idx
            }
        }
    }

    /// Replaces the node at `idx` with `node`, which must share its identity.
    pub(crate) fn replace(&mut self, idx: NodeIndex, node: Node) {
        debug_assert_eq!(self.graph[idx].key(), node.key());

        self.unindex_tags(idx);
        self.graph[idx] = node;
        self.index_tags(idx);
    }

    /// Marks an uninitialized workflow or action node as initialized.
    pub(crate) fn mark_initialized(&mut self, idx: NodeIndex) {
        let mut node = self.graph[idx].clone();
        match &mut node {
            Node::Workflow(workflow) => workflow.initialized = true,
            Node::Action(action) => action.initialized = true,
            _ => return,
        }
        self.replace(idx, node);
    }

    /// Adds an edge, unless an identical one already exists.
    pub(crate) fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, relation: Relation) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|edge| *edge.weight() == relation);

        if !exists {
            self.graph.add_edge(from, to, relation);
        }
    }

    /// Returns every node carrying at least one of the given tags, in
    /// insertion order.
    pub(crate) fn get_nodes_for_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<NodeIndex> {
        tags.iter()
            .filter_map(|tag| self.tags.get(tag.as_ref()))
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub(crate) fn has_tag(&self, idx: NodeIndex, tag: &str) -> bool {
        self.tags.get(tag).is_some_and(|nodes| nodes.contains(&idx))
    }

    /// The nodes reachable in one traversal step from `idx`, in insertion
    /// order.
    ///
    /// `contains` edges into steps are only followed for a job's first
    /// step; later steps are reached through `next`, so that every step
    /// before a given step lies on the path to it.
    fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut successors = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| match (edge.weight(), &self.graph[edge.target()]) {
                (Relation::Contains, Node::Step(step)) => step.index == 0,
                _ => true,
            })
            .map(|edge| edge.target())
            .collect::<Vec<_>>();

        successors.sort();
        successors.dedup();
        successors
    }

    /// The steps directly contained by a job or action.
    pub(crate) fn steps_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut steps = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| {
                *edge.weight() == Relation::Contains
                    && self.graph[edge.target()].kind() == NodeKind::Step
            })
            .map(|edge| edge.target())
            .collect::<Vec<_>>();
        steps.sort();
        steps
    }

    /// The steps from `step` onwards along `next` edges, starting with
    /// `step` itself.
    pub(crate) fn steps_from(&self, step: NodeIndex) -> Vec<NodeIndex> {
        let mut steps = vec![step];
        let mut current = step;

        while let Some(next) = self
            .graph
            .edges_directed(current, Direction::Outgoing)
            .find(|edge| *edge.weight() == Relation::Next)
            .map(|edge| edge.target())
        {
            if steps.contains(&next) {
                break;
            }
            steps.push(next);
            current = next;
        }

        steps
    }

    /// Every node reachable from `starts`, ignoring gates and conditions.
    pub(crate) fn reachable_from(&self, starts: &[NodeIndex]) -> BTreeSet<NodeIndex> {
        let mut reachable = BTreeSet::new();

        for start in starts {
            if reachable.contains(start) {
                continue;
            }
            let mut bfs = Bfs::new(&self.graph, *start);
            while let Some(idx) = bfs.next(&self.graph) {
                reachable.insert(idx);
            }
        }

        reachable
    }

    /// Finds every path from `start` to a node carrying `target`.
    ///
    /// Traversal never enters nodes whose `if:` condition is
    /// `RESTRICTED`. A hard gate ends the branch it's on. A soft gate
    /// ends the branch unless `start` is a label-triggered workflow, in
    /// which case targets past it are only reported once the path has
    /// checked out a mutable ref. Matching a target doesn't stop the
    /// search from expanding past it.
    ///
    /// A node reached by several routes is expanded once per route, since
    /// each route carries its own env, inputs and job outputs. Only nodes
    /// already on the current path are skipped.
    pub(crate) fn dfs_to_tag(&self, start: NodeIndex, target: &str) -> Vec<Vec<NodeIndex>> {
        let ctx = PathContext {
            labeled: self.has_tag(start, LABELED_TRIGGER),
            ..Default::default()
        };

        let mut paths = vec![];
        let mut path = vec![];
        let mut on_path = HashSet::new();

        self.dfs(start, target, ctx, &mut path, &mut on_path, &mut paths);

        paths
    }

    fn dfs(
        &self,
        idx: NodeIndex,
        target: &str,
        mut ctx: PathContext,
        path: &mut Vec<NodeIndex>,
        on_path: &mut HashSet<NodeIndex>,
        paths: &mut Vec<Vec<NodeIndex>>,
    ) {
        if on_path.contains(&idx) {
            return;
        }

        let node = &self.graph[idx];
        if node.is_restricted() {
            tracing::debug!("not entering restricted node {}", node.name());
            return;
        }

        let step = node.as_step().map(|step| &step.class);
        let mutable_checkout = step.is_some_and(|class| class.is_mutable_checkout());

        path.push(idx);
        on_path.insert(idx);

        if self.has_tag(idx, target)
            && (!ctx.soft_gated || ctx.mutable_checkout || mutable_checkout)
        {
            paths.push(path.clone());
        }

        let expand = match step {
            Some(class) if class.hard_gate => {
                tracing::debug!("hard gate at {}", node.name());
                false
            }
            Some(class) if class.soft_gate && !ctx.labeled => {
                tracing::debug!("soft gate at {} without a label trigger", node.name());
                false
            }
            Some(class) if class.soft_gate => {
                if !ctx.mutable_checkout {
                    ctx.soft_gated = true;
                }
                true
            }
            _ => true,
        };

        if mutable_checkout {
            ctx.mutable_checkout = true;
        }

        if expand {
            for next in self.successors(idx) {
                self.dfs(next, target, ctx, path, on_path, paths);
            }
        }

        on_path.remove(&idx);
        path.pop();
    }
}
