//! Populating the [`TaggedGraph`] from workflow and action documents.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use super::{
    Relation, TaggedGraph,
    node::{ActionNode, JobNode, Node, RepoNode, StepNode, WorkflowNode},
};
use crate::{
    classify::Patterns,
    models::{Document, StepDef, Uses, document::COMPOSITE_JOB},
};

/// The ref assumed for a `uses:` clause without one.
const DEFAULT_REF: &str = "HEAD";

fn owner(repo: &str) -> &str {
    repo.split_once('/').map(|(owner, _)| owner).unwrap_or(repo)
}

/// Adds a workflow document to the graph: its repository, workflow,
/// jobs and steps, and forward references to whatever it `uses:`.
///
/// Rebuilding from the same document is a no-op, except that a
/// previously uninitialized workflow node gets populated.
///
/// Returns the workflow's node, or `None` if the document is invalid.
pub(crate) fn build_graph_from_yaml(
    graph: &mut TaggedGraph,
    doc: &Document,
    patterns: &Patterns,
) -> Option<NodeIndex> {
    if !doc.is_valid() {
        tracing::debug!("skipping invalid document {}:{}", doc.repo, doc.path);
        return None;
    }

    let repo = graph.get_or_insert(Node::Repo(RepoNode {
        name: doc.repo.clone(),
    }));

    let workflow = WorkflowNode::from_document(doc);
    let jobs = doc.jobs();

    // Every job gets a node before any edges are drawn, so that
    // `needs:` can refer forward.
    let job_nodes = jobs
        .iter()
        .map(|job| JobNode::new(&workflow, job))
        .collect::<Vec<_>>();
    let workflow_idx = graph.get_or_insert(Node::Workflow(workflow));
    graph.add_edge(repo, workflow_idx, Relation::Contains);

    let job_idxs = job_nodes
        .into_iter()
        .map(|job| (job.job.clone(), (job.name.clone(), graph.get_or_insert(Node::Job(job)))))
        .collect::<HashMap<_, _>>();

    for job in &jobs {
        let Some((job_name, job_idx)) = job_idxs.get(job.name).cloned() else {
            continue;
        };

        let mut rooted = false;
        for need in job.needs() {
            match job_idxs.get(need) {
                Some((_, dep)) => {
                    graph.add_edge(*dep, job_idx, Relation::Needs);
                    rooted = true;
                }
                None => tracing::warn!(
                    "{}:{}: job `{}` needs unknown job `{need}`",
                    doc.repo,
                    doc.path,
                    job.name
                ),
            }
        }
        // Jobs without a known dependency hang off the workflow.
        if !rooted {
            graph.add_edge(workflow_idx, job_idx, Relation::Contains);
        }

        if let Some(uses) = job.uses() {
            let callee = match Uses::parse(uses) {
                Ok(Uses::Local(path)) => Some(WorkflowNode::uninitialized(
                    &doc.repo,
                    &doc.git_ref,
                    &path,
                )),
                Ok(Uses::Repository(uses)) => uses.subpath.as_deref().map(|path| {
                    WorkflowNode::uninitialized(
                        &uses.slug(),
                        uses.git_ref.as_deref().unwrap_or(DEFAULT_REF),
                        path,
                    )
                }),
                Ok(Uses::Docker(_)) | Err(_) => None,
            };

            match callee {
                Some(callee) => {
                    let callee = graph.get_or_insert(Node::Workflow(callee));
                    graph.add_edge(job_idx, callee, Relation::Uses);
                }
                None => tracing::warn!("{}:{}: unusable workflow call `{uses}`", doc.repo, doc.path),
            }
        }

        add_steps(
            graph,
            job_idx,
            &job_name,
            job.name,
            &job.steps(),
            (&doc.repo, &doc.git_ref),
            patterns,
        );
    }

    Some(workflow_idx)
}

/// Adds an action's definition under its (previously uninitialized)
/// node and marks it initialized. Only composite actions contribute
/// steps; other kinds are opaque.
pub(crate) fn build_graph_from_action(
    graph: &mut TaggedGraph,
    action_idx: NodeIndex,
    doc: &Document,
    patterns: &Patterns,
) {
    let Node::Action(action) = graph.node(action_idx).clone() else {
        return;
    };

    if doc.is_composite() {
        let parent = format!("{}:{COMPOSITE_JOB}", action.name);
        for job in doc.jobs() {
            add_steps(
                graph,
                action_idx,
                &parent,
                COMPOSITE_JOB,
                &job.steps(),
                (&action.repo, &action.git_ref),
                patterns,
            );
        }
    } else {
        tracing::debug!("{} is not a composite action", action.name);
    }

    graph.mark_initialized(action_idx);
}

/// Adds `steps` under `parent` (a job, or a composite action), chained
/// in order with `next` edges.
fn add_steps(
    graph: &mut TaggedGraph,
    parent: NodeIndex,
    parent_name: &str,
    job: &str,
    steps: &[StepDef<'_>],
    (repo, git_ref): (&str, &str),
    patterns: &Patterns,
) {
    let mut prev = None;

    for step in steps {
        let node = StepNode::new(parent_name, repo, job, step, patterns);
        let step_idx = graph.get_or_insert(Node::Step(node));

        graph.add_edge(parent, step_idx, Relation::Contains);
        if let Some(prev) = prev {
            graph.add_edge(prev, step_idx, Relation::Next);
        }
        prev = Some(step_idx);

        if let Some(action) = step.uses().and_then(|uses| action_node(uses, repo, git_ref, patterns)) {
            let action = graph.get_or_insert(Node::Action(action));
            graph.add_edge(step_idx, action, Relation::Uses);
        }
    }
}

/// The action a step's `uses:` refers to. Actions from the caller's own
/// organization that aren't known-safe start out uninitialized, so that
/// their definitions get fetched and analyzed.
fn action_node(uses: &str, repo: &str, git_ref: &str, patterns: &Patterns) -> Option<ActionNode> {
    match Uses::parse(uses) {
        Ok(Uses::Local(path)) => Some(ActionNode::new(repo, git_ref, &path, false)),
        Ok(Uses::Repository(uses)) => {
            let same_org = uses.owner.eq_ignore_ascii_case(owner(repo));
            let safe = uses.matches_any(&patterns.safe_actions);

            Some(ActionNode::new(
                &uses.slug(),
                uses.git_ref.as_deref().unwrap_or(DEFAULT_REF),
                uses.subpath.as_deref().unwrap_or_default(),
                !same_org || safe,
            ))
        }
        Ok(Uses::Docker(_)) => None,
        Err(e) => {
            tracing::debug!("ignoring step: {e}");
            None
        }
    }
}
