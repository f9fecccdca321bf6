//! Script injection: attacker-controlled contexts interpolated into a
//! script that a workflow runs.

use crate::{
    finding::{Confidence, Details, Findings, Source},
    graph::{LABELED_TRIGGER, Node, TaggedGraph},
};

use super::{Context, PathWalk};

/// Triggers whose event payloads an external attacker controls.
pub(crate) const INJECTION_TRIGGERS: &[&str] = &[
    "pull_request_target",
    LABELED_TRIGGER,
    "issue_comment",
    "issues",
    "workflow_run",
    "fork",
    "discussion",
    "discussion_comment",
    "pull_request_review",
    "pull_request_review_comment",
];

pub(crate) async fn find_injections(graph: &TaggedGraph, ctx: &Context<'_>) -> Findings {
    let mut findings = Findings::new();

    for entry in graph.get_nodes_for_tags(INJECTION_TRIGGERS) {
        for path in graph.dfs_to_tag(entry, "injectable") {
            let Some(Node::Step(step)) = path.last().map(|idx| graph.node(*idx)) else {
                continue;
            };

            let Some(walk) = PathWalk::walk(graph, &path, ctx).await else {
                continue;
            };

            if walk.approval_gate {
                tracing::debug!("{} is behind an approval gate", step.name);
                continue;
            }

            let contexts = walk.implicated(&step.class.contexts);
            if contexts.is_empty() {
                continue;
            }

            let confidence = if contexts.iter().any(|c| c.source == Source::Direct) {
                Confidence::High
            } else {
                Confidence::Medium
            };

            tracing::info!("injection in {}", step.name);

            if let Some(finding) =
                walk.finding(graph, &path, confidence, Details::Injection { contexts })
            {
                findings.push(finding);
            }
        }
    }

    findings
}
