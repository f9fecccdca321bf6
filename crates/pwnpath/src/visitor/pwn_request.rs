//! Pwn requests: privileged workflows that check out and run pull
//! request code.

use petgraph::graph::NodeIndex;

use crate::{
    finding::{Confidence, Details, Findings},
    graph::{LABELED_TRIGGER, Node, TaggedGraph},
};

use super::{Context, PathWalk};

/// Privileged triggers that can be made to run on a pull request's code.
pub(crate) const PWN_REQUEST_TRIGGERS: &[&str] = &[
    "pull_request_target",
    LABELED_TRIGGER,
    "issue_comment",
    "workflow_run",
];

/// The label of the first sink at or after `checkout` in its job.
///
/// A hard gate after the checkout ends the search.
fn sink_after(graph: &TaggedGraph, checkout: NodeIndex) -> Option<String> {
    for idx in graph.steps_from(checkout) {
        let Node::Step(step) = graph.node(idx) else {
            break;
        };

        if step.condition.is_restricted() {
            continue;
        }
        if idx != checkout && step.class.hard_gate {
            break;
        }
        if step.class.is_sink {
            return Some(step.label.clone());
        }
    }

    None
}

pub(crate) async fn find_pwn_requests(graph: &TaggedGraph, ctx: &Context<'_>) -> Findings {
    let mut findings = Findings::new();

    for entry in graph.get_nodes_for_tags(PWN_REQUEST_TRIGGERS) {
        let labeled = graph.has_tag(entry, LABELED_TRIGGER);

        for path in graph.dfs_to_tag(entry, "checkout") {
            let Some(&checkout) = path.last() else {
                continue;
            };
            let Node::Step(step) = graph.node(checkout) else {
                continue;
            };

            let Some(walk) = PathWalk::walk(graph, &path, ctx).await else {
                continue;
            };

            let mutable = step.class.mutable_ref;
            let gated = walk.approval_gate || walk.soft_gated || labeled;
            if gated && !mutable {
                tracing::debug!("{} checks out an approved commit", step.name);
                continue;
            }

            let sink = sink_after(graph, checkout);
            let confidence = if sink.is_some() {
                Confidence::High
            } else {
                Confidence::Medium
            };

            tracing::info!("pwn request in {}", step.name);

            let details = Details::PwnRequest {
                checkout_ref: step.class.checkout_ref.clone().unwrap_or_default(),
                mutable,
                sink,
                toctou: gated,
            };

            if let Some(finding) = walk.finding(graph, &path, confidence, details) {
                findings.push(finding);
            }
        }
    }

    findings
}
