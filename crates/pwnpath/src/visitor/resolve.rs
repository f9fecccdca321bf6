//! Lazy resolution of referenced workflows and actions.

use petgraph::graph::NodeIndex;

use crate::graph::{
    Node, TaggedGraph,
    builder::{build_graph_from_action, build_graph_from_yaml},
    node::UNINITIALIZED,
};

use super::Context;

/// How many layers of references are followed from the entry points.
const MAX_DEPTH: usize = 5;

/// Fetches, parses and graphs every uninitialized workflow or action
/// reachable from `entries`, including ones that resolution itself
/// turns up, up to [`MAX_DEPTH`] layers deep.
///
/// Nodes that can't be resolved are marked initialized regardless, so
/// that each reference is only tried once.
pub(crate) async fn resolve_references(
    graph: &mut TaggedGraph,
    entries: &[NodeIndex],
    ctx: &Context<'_>,
) {
    for depth in 0..MAX_DEPTH {
        let reachable = graph.reachable_from(entries);
        let pending = graph
            .get_nodes_for_tags(&[UNINITIALIZED])
            .into_iter()
            .filter(|idx| reachable.contains(idx))
            .collect::<Vec<_>>();

        if pending.is_empty() {
            return;
        }

        tracing::debug!("resolving {} references at depth {depth}", pending.len());

        for idx in pending {
            resolve_node(graph, idx, ctx).await;
        }
    }

    tracing::debug!("not resolving references deeper than {MAX_DEPTH}");
}

async fn resolve_node(graph: &mut TaggedGraph, idx: NodeIndex, ctx: &Context<'_>) {
    match graph.node(idx).clone() {
        Node::Workflow(workflow) => {
            match ctx
                .cache
                .workflow(ctx.api, &workflow.repo, &workflow.git_ref, &workflow.path)
                .await
            {
                Some(doc) if doc.is_valid() => {
                    build_graph_from_yaml(graph, &doc, ctx.patterns);
                }
                _ => tracing::warn!("couldn't resolve workflow {}", workflow.name),
            }
        }
        Node::Action(action) => {
            match ctx
                .cache
                .action(ctx.api, &action.repo, &action.git_ref, &action.path)
                .await
            {
                Some(doc) if doc.is_valid() => {
                    build_graph_from_action(graph, idx, &doc, ctx.patterns);
                }
                _ => tracing::warn!("couldn't resolve action {}", action.name),
            }
        }
        _ => {}
    }

    graph.mark_initialized(idx);
}
