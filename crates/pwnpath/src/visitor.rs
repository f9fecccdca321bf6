//! Visitors that walk the paths [`TaggedGraph::dfs_to_tag`] yields and
//! turn them into findings.

use std::{
    collections::{BTreeSet, HashMap},
    ops::ControlFlow,
};

use github_actions_expressions::Expr;
use indexmap::IndexMap;
use petgraph::graph::NodeIndex;

use crate::{
    api::ActionsApi,
    cache::Cache,
    classify::{Patterns, is_static_context},
    finding::{Confidence, Details, Finding, Findings, Implicated, Source, path_entries},
    graph::{Node, TaggedGraph},
    utils::{context_tokens, extract_expressions},
};

pub(crate) mod injection;
pub(crate) mod pwn_request;
pub(crate) mod resolve;

/// Context prefixes whose values are only known at run time.
const OPAQUE_CONTEXTS: &[&str] = &["env.", "inputs.", "needs.", "steps.", "jobs."];

/// Everything a visitor needs besides the graph.
pub(crate) struct Context<'a> {
    pub(crate) api: &'a dyn ActionsApi,
    pub(crate) cache: &'a Cache,
    pub(crate) patterns: &'a Patterns,
}

/// The attacker-controlled contexts a value carries.
type Taint = Vec<String>;

/// State accumulated while walking a single path.
///
/// The lookup tables map names (`env.NAME`, `inputs.NAME` and
/// `needs.JOB.outputs.NAME`) to the attacker-controlled contexts their
/// values carry, resolved in the scope they were defined in.
#[derive(Debug, Default)]
pub(crate) struct PathWalk {
    env_lookup: HashMap<String, Taint>,
    /// The env of the step currently being visited.
    step_env: HashMap<String, Taint>,
    flexible_lookup: HashMap<String, Taint>,
    input_lookup: HashMap<String, Taint>,
    /// A deployment approval or permission check guards the rest of the path.
    pub(crate) approval_gate: bool,
    /// The path went through a soft permission gate.
    pub(crate) soft_gated: bool,
    /// The most recent job on the path.
    pub(crate) job: Option<NodeIndex>,
}

impl PathWalk {
    /// Walks `path` from its start, or returns `None` if something along
    /// it rules the path out entirely.
    pub(crate) async fn walk(
        graph: &TaggedGraph,
        path: &[NodeIndex],
        ctx: &Context<'_>,
    ) -> Option<Self> {
        let mut walk = Self::default();

        for pos in 0..path.len() {
            if walk.visit(graph, path, pos, ctx).await.is_break() {
                return None;
            }
        }

        Some(walk)
    }

    async fn visit(
        &mut self,
        graph: &TaggedGraph,
        path: &[NodeIndex],
        pos: usize,
        ctx: &Context<'_>,
    ) -> ControlFlow<()> {
        let idx = path[pos];
        let prev = pos.checked_sub(1).map(|prev| graph.node(path[prev]));

        match graph.node(idx) {
            Node::Repo(_) => {}
            Node::Workflow(workflow) => {
                if pos == 0
                    && ctx
                        .cache
                        .repository(ctx.api, &workflow.repo)
                        .await
                        .is_some_and(|repo| repo.fork)
                {
                    tracing::debug!("{} is a fork, skipping {}", workflow.repo, workflow.path);
                    return ControlFlow::Break(());
                }

                // A reusable workflow sees its caller's `with:` as inputs,
                // and none of its caller's env.
                if let Some(Node::Job(caller)) = prev {
                    self.input_lookup = self.taint_map(&caller.with);
                    self.env_lookup.clear();
                }

                self.merge_env(&workflow.env);
            }
            Node::Job(job) => {
                self.job = Some(idx);

                if let Some(environment) = &job.environment {
                    let protected = ctx
                        .cache
                        .protected_environments(ctx.api, &job.repo)
                        .await;
                    if protected.iter().any(|env| env == environment) {
                        tracing::debug!("{} deploys to protected `{environment}`", job.name);
                        self.approval_gate = true;
                    }
                }

                // Gates within this job are already accounted for by the
                // traversal when the path continues into its steps. When
                // the path leaves the job instead, any gate in it guards
                // the rest of the path.
                let steps = graph.steps_of(idx).into_iter().collect::<BTreeSet<_>>();
                let enters_steps = path.get(pos + 1).is_some_and(|next| steps.contains(next));
                if !enters_steps {
                    let reaches = |tag: &str| {
                        graph
                            .dfs_to_tag(idx, tag)
                            .iter()
                            .any(|p| p.last().is_some_and(|last| steps.contains(last)))
                    };

                    if reaches("permission_blocker") {
                        tracing::debug!("{} is blocked by a permission check", job.name);
                        return ControlFlow::Break(());
                    }
                    if reaches("permission_check") {
                        self.approval_gate = true;
                    }
                }

                self.merge_env(&job.env);

                for (name, value) in &job.outputs {
                    let taint = self.taint(value);
                    self.flexible_lookup
                        .insert(format!("needs.{}.outputs.{name}", job.job), taint);
                }
            }
            Node::Step(step) => {
                if step.class.soft_gate {
                    self.soft_gated = true;
                }
                self.step_env = step
                    .env
                    .iter()
                    .map(|(name, value)| (name.clone(), self.taint(value)))
                    .collect();
            }
            Node::Action(action) => {
                if let Some(Node::Step(caller)) = prev {
                    self.input_lookup = self.taint_map(&caller.with);
                    self.env_lookup.extend(std::mem::take(&mut self.step_env));
                }

                if !action.initialized {
                    tracing::debug!("walking past unresolved action {}", action.name);
                }
            }
        }

        ControlFlow::Continue(())
    }

    fn merge_env(&mut self, env: &IndexMap<String, String>) {
        for (name, value) in env {
            let taint = self.taint(value);
            self.env_lookup.insert(name.clone(), taint);
        }
    }

    fn taint_map(&self, values: &IndexMap<String, String>) -> HashMap<String, Taint> {
        values
            .iter()
            .map(|(name, value)| (name.clone(), self.taint(value)))
            .collect()
    }

    /// The attacker-controlled contexts interpolated into `text`.
    fn taint(&self, text: &str) -> Taint {
        let mut taint = extract_expressions(text)
            .into_iter()
            .flat_map(|body| self.resolve_body(body))
            .map(|implicated| implicated.token)
            .collect::<Vec<_>>();

        taint.sort();
        taint.dedup();
        taint
    }

    /// Where `token` gets its value from, and which attacker-controlled
    /// contexts that value carries.
    ///
    /// Returns `None` for static contexts, and for names whose values
    /// aren't known along this path.
    fn resolve(&self, token: &str) -> Option<(Source, Taint)> {
        if is_static_context(token) {
            return None;
        }

        let tainted = |taint: Option<&Taint>| taint.filter(|t| !t.is_empty()).cloned();

        let resolved = if let Some(name) = token.strip_prefix("env.") {
            let taint = self
                .step_env
                .get(name)
                .or_else(|| self.env_lookup.get(name));
            tainted(taint).map(|t| (Source::Env, t))
        } else if let Some(name) = token.strip_prefix("inputs.") {
            tainted(self.input_lookup.get(name)).map(|t| (Source::Input, t))
        } else if token.starts_with("needs.") {
            tainted(self.flexible_lookup.get(token)).map(|t| (Source::Output, t))
        } else if OPAQUE_CONTEXTS.iter().any(|prefix| token.starts_with(prefix)) {
            None
        } else {
            Some((Source::Direct, vec![token.into()]))
        };

        if resolved.is_none() {
            tracing::trace!("{token} doesn't resolve to an attacker-controlled context");
        }

        resolved
    }

    /// The attacker-controlled contexts a single `${{ }}` body implicates.
    fn resolve_body(&self, body: &str) -> Vec<Implicated> {
        let tokens = context_tokens(body);

        // Bodies we can't make sense of fail open.
        if tokens.is_empty() && Expr::parse(body).is_err() {
            return vec![Implicated {
                token: body.into(),
                source: Source::Direct,
                via: None,
            }];
        }

        tokens
            .into_iter()
            .filter_map(|token| self.resolve(&token).map(|resolved| (token, resolved)))
            .flat_map(|(token, (source, taint))| {
                taint.into_iter().map(move |origin| Implicated {
                    token: origin,
                    source,
                    via: (source != Source::Direct).then(|| token.clone()),
                })
            })
            .collect()
    }

    /// The attacker-controlled contexts implicated by the given `${{ }}`
    /// bodies, in order of appearance.
    pub(crate) fn implicated(&self, bodies: &[String]) -> Vec<Implicated> {
        let mut implicated: Vec<Implicated> = vec![];

        for found in bodies.iter().flat_map(|body| self.resolve_body(body)) {
            if !implicated.contains(&found) {
                implicated.push(found);
            }
        }

        implicated
    }

    /// Builds a finding for the step that ends `path`.
    pub(crate) fn finding(
        &self,
        graph: &TaggedGraph,
        path: &[NodeIndex],
        confidence: Confidence,
        details: Details,
    ) -> Option<Finding> {
        let (Node::Workflow(entry), Node::Step(step)) =
            (graph.node(*path.first()?), graph.node(*path.last()?))
        else {
            return None;
        };

        let job = self.job.and_then(|idx| match graph.node(idx) {
            Node::Job(job) => Some(job),
            _ => None,
        });

        Some(Finding {
            repo: entry.repo.clone(),
            workflow: entry.path.clone(),
            job: job.map(|job| job.job.clone()),
            step: step.label.clone(),
            step_node: step.name.clone(),
            triggers: entry.triggers.clone(),
            confidence,
            self_hosted: job.is_some_and(|job| job.class.self_hosted),
            path: path_entries(graph, path),
            details,
        })
    }
}

/// Runs both visitors over the graph, first resolving the workflows and
/// actions their entry points can reach.
pub(crate) async fn audit(graph: &mut TaggedGraph, ctx: &Context<'_>) -> Findings {
    let entries = graph.get_nodes_for_tags(
        &[injection::INJECTION_TRIGGERS, pwn_request::PWN_REQUEST_TRIGGERS].concat(),
    );
    resolve::resolve_references(graph, &entries, ctx).await;

    let mut findings = injection::find_injections(graph, ctx).await;
    findings.extend(pwn_request::find_pwn_requests(graph, ctx).await);
    findings
}
