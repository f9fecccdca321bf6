//! Graph node kinds.
//!
//! Every node has a globally unique name derived from the
//! `repo:ref:path[:job[:step]]` tuple it was built from. A node's
//! identity is its [`NodeKey`]: two nodes with the same kind and name
//! are the same node, regardless of the rest of their contents.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
    sync::{LazyLock, OnceLock},
};

use github_actions_expressions::{Environment, Satisfiability};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    classify::{JobClassification, Patterns, StepClassification, classify_job, classify_step},
    models::{Document, JobDef, StepDef},
};

static ATTACKER: LazyLock<Environment> = LazyLock::new(Environment::attacker);

pub(crate) const UNINITIALIZED: &str = "uninitialized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum NodeKind {
    Repo,
    Workflow,
    Job,
    Step,
    Action,
}

impl NodeKind {
    /// The tag every node of this kind carries.
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            NodeKind::Repo => "RepoNode",
            NodeKind::Workflow => "WorkflowNode",
            NodeKind::Job => "JobNode",
            NodeKind::Step => "StepNode",
            NodeKind::Action => "ActionNode",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            NodeKind::Repo => "repo",
            NodeKind::Workflow => "workflow",
            NodeKind::Job => "job",
            NodeKind::Step => "step",
            NodeKind::Action => "action",
        };
        f.write_str(kind)
    }
}

/// A node's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeKey {
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
}

impl NodeKey {
    pub(crate) fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

pub(crate) fn workflow_name(repo: &str, git_ref: &str, path: &str) -> String {
    format!("{repo}:{git_ref}:{path}")
}

pub(crate) fn job_name(parent: &str, job: &str) -> String {
    format!("{parent}:{job}")
}

pub(crate) fn step_name(job: &str, index: usize) -> String {
    format!("{job}:{index}")
}

/// A lazily evaluated `if:` condition.
///
/// The first evaluation is cached as `EVALUATED:<raw>` when an attacker
/// could satisfy the condition, or `RESTRICTED:<raw>` when they couldn't.
#[derive(Debug, Clone, Default)]
pub(crate) struct Condition {
    raw: Option<String>,
    evaluated: OnceLock<String>,
}

impl Condition {
    pub(crate) fn new(raw: Option<String>) -> Self {
        Self {
            raw: raw.filter(|r| !r.trim().is_empty()),
            evaluated: OnceLock::new(),
        }
    }

    /// Returns the cached evaluation, or `None` when there's no condition.
    pub(crate) fn evaluated(&self) -> Option<&str> {
        let raw = self.raw.as_deref()?;

        Some(self.evaluated.get_or_init(|| {
            if Satisfiability::of(raw, &ATTACKER).is_reachable() {
                format!("EVALUATED:{raw}")
            } else {
                tracing::debug!("condition `{raw}` is not attacker-satisfiable");
                format!("RESTRICTED:{raw}")
            }
        }))
    }

    pub(crate) fn is_restricted(&self) -> bool {
        self.evaluated()
            .is_some_and(|e| e.starts_with("RESTRICTED:"))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RepoNode {
    pub(crate) name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct WorkflowNode {
    pub(crate) name: String,
    pub(crate) repo: String,
    pub(crate) git_ref: String,
    pub(crate) path: String,
    pub(crate) display_name: Option<String>,
    pub(crate) initialized: bool,
    pub(crate) triggers: Vec<String>,
    pub(crate) env: IndexMap<String, String>,
}

impl WorkflowNode {
    /// A workflow that's referenced but not yet parsed, e.g. the callee
    /// of a reusable workflow call.
    pub(crate) fn uninitialized(repo: &str, git_ref: &str, path: &str) -> Self {
        Self {
            name: workflow_name(repo, git_ref, path),
            repo: repo.into(),
            git_ref: git_ref.into(),
            path: path.into(),
            display_name: None,
            initialized: false,
            triggers: vec![],
            env: IndexMap::new(),
        }
    }

    pub(crate) fn from_document(doc: &Document) -> Self {
        Self {
            display_name: Some(doc.display_name().into()),
            initialized: true,
            triggers: doc.triggers(),
            env: doc.env(),
            ..Self::uninitialized(&doc.repo, &doc.git_ref, &doc.path)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JobNode {
    pub(crate) name: String,
    pub(crate) repo: String,
    /// The job's ID within its workflow.
    pub(crate) job: String,
    pub(crate) uses: Option<String>,
    pub(crate) env: IndexMap<String, String>,
    pub(crate) with: IndexMap<String, String>,
    pub(crate) outputs: IndexMap<String, String>,
    pub(crate) environment: Option<String>,
    pub(crate) permissions: Option<String>,
    pub(crate) condition: Condition,
    pub(crate) class: JobClassification,
}

impl JobNode {
    pub(crate) fn new(workflow: &WorkflowNode, job: &JobDef<'_>) -> Self {
        let permissions = job.permissions().and_then(|perms| {
            serde_yaml::to_string(perms)
                .ok()
                .map(|p| p.trim().replace('\n', ", "))
        });

        Self {
            name: job_name(&workflow.name, job.name),
            repo: workflow.repo.clone(),
            job: job.name.into(),
            uses: job.uses().map(Into::into),
            env: job.env(),
            with: job.with(),
            outputs: job.outputs(),
            environment: job.environment(),
            permissions,
            condition: Condition::new(job.condition()),
            class: classify_job(job),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StepNode {
    pub(crate) name: String,
    pub(crate) repo: String,
    /// The ID of the job this step belongs to.
    pub(crate) job: String,
    pub(crate) index: usize,
    pub(crate) label: String,
    pub(crate) uses: Option<String>,
    pub(crate) env: IndexMap<String, String>,
    pub(crate) with: IndexMap<String, String>,
    pub(crate) condition: Condition,
    pub(crate) class: StepClassification,
}

impl StepNode {
    /// Builds a step under `parent`, which is either a job node's name or,
    /// for composite action steps, `<action>:composite`.
    pub(crate) fn new(
        parent: &str,
        repo: &str,
        job: &str,
        step: &StepDef<'_>,
        patterns: &Patterns,
    ) -> Self {
        Self {
            name: step_name(parent, step.index),
            repo: repo.into(),
            job: job.into(),
            index: step.index,
            label: step.label(),
            uses: step.uses().map(Into::into),
            env: step.env(),
            with: step.with(),
            condition: Condition::new(step.condition()),
            class: classify_step(step, patterns),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ActionNode {
    pub(crate) name: String,
    /// The `owner/repo` the action lives in.
    pub(crate) repo: String,
    pub(crate) git_ref: String,
    /// The action's directory within `repo`, empty for the root.
    pub(crate) path: String,
    pub(crate) initialized: bool,
}

impl ActionNode {
    pub(crate) fn new(repo: &str, git_ref: &str, path: &str, initialized: bool) -> Self {
        Self {
            name: workflow_name(repo, git_ref, path),
            repo: repo.into(),
            git_ref: git_ref.into(),
            path: path.into(),
            initialized,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Repo(RepoNode),
    Workflow(WorkflowNode),
    Job(JobNode),
    Step(StepNode),
    Action(ActionNode),
}

impl Node {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Node::Repo(_) => NodeKind::Repo,
            Node::Workflow(_) => NodeKind::Workflow,
            Node::Job(_) => NodeKind::Job,
            Node::Step(_) => NodeKind::Step,
            Node::Action(_) => NodeKind::Action,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Node::Repo(n) => &n.name,
            Node::Workflow(n) => &n.name,
            Node::Job(n) => &n.name,
            Node::Step(n) => &n.name,
            Node::Action(n) => &n.name,
        }
    }

    /// The `owner/repo` this node belongs to.
    pub(crate) fn repo(&self) -> &str {
        match self {
            Node::Repo(n) => &n.name,
            Node::Workflow(n) => &n.repo,
            Node::Job(n) => &n.repo,
            Node::Step(n) => &n.repo,
            Node::Action(n) => &n.repo,
        }
    }

    pub(crate) fn key(&self) -> NodeKey {
        NodeKey::new(self.kind(), self.name())
    }

    /// Whether this node's contents are populated. Only workflows and
    /// actions can be referenced before they're parsed.
    pub(crate) fn is_initialized(&self) -> bool {
        match self {
            Node::Workflow(n) => n.initialized,
            Node::Action(n) => n.initialized,
            _ => true,
        }
    }

    pub(crate) fn condition(&self) -> Option<&Condition> {
        match self {
            Node::Job(n) => Some(&n.condition),
            Node::Step(n) => Some(&n.condition),
            _ => None,
        }
    }

    /// Whether traversal may enter this node at all.
    pub(crate) fn is_restricted(&self) -> bool {
        self.condition().is_some_and(Condition::is_restricted)
    }

    pub(crate) fn as_step(&self) -> Option<&StepNode> {
        match self {
            Node::Step(step) => Some(step),
            _ => None,
        }
    }

    pub(crate) fn tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::from([self.kind().tag().to_string()]);

        if !self.is_initialized() {
            tags.insert(UNINITIALIZED.into());
        }

        match self {
            Node::Workflow(workflow) => tags.extend(workflow.triggers.iter().cloned()),
            Node::Job(job) if job.class.self_hosted => {
                tags.insert("self-hosted".into());
            }
            Node::Step(step) => {
                let class = &step.class;
                for (set, tag) in [
                    (class.is_checkout, "checkout"),
                    (class.is_sink, "sink"),
                    (class.injectable, "injectable"),
                    (class.is_gate, "permission_check"),
                    (class.hard_gate, "permission_blocker"),
                ] {
                    if set {
                        tags.insert(tag.into());
                    }
                }
            }
            _ => {}
        }

        tags
    }

    /// A flat attribute map, for graph-level storage and reporting.
    pub(crate) fn attrs(&self) -> BTreeMap<&'static str, String> {
        let mut attrs = BTreeMap::from([
            ("kind", self.kind().to_string()),
            ("name", self.name().to_string()),
            ("repo", self.repo().to_string()),
        ]);

        if let Some(evaluated) = self.condition().and_then(Condition::evaluated) {
            attrs.insert("if", evaluated.into());
        }

        match self {
            Node::Repo(_) => {}
            Node::Workflow(workflow) => {
                attrs.insert("ref", workflow.git_ref.clone());
                attrs.insert("path", workflow.path.clone());
                attrs.insert("initialized", workflow.initialized.to_string());
                attrs.insert("triggers", workflow.triggers.join(","));
                if let Some(display_name) = &workflow.display_name {
                    attrs.insert("display_name", display_name.clone());
                }
            }
            Node::Job(job) => {
                attrs.insert("job", job.job.clone());
                attrs.insert("self_hosted", job.class.self_hosted.to_string());
                if let Some(environment) = &job.environment {
                    attrs.insert("environment", environment.clone());
                }
                if let Some(permissions) = &job.permissions {
                    attrs.insert("permissions", permissions.clone());
                }
                if let Some(uses) = &job.uses {
                    attrs.insert("uses", uses.clone());
                }
            }
            Node::Step(step) => {
                let class = &step.class;
                attrs.insert("job", step.job.clone());
                attrs.insert("label", step.label.clone());
                if let Some(uses) = &step.uses {
                    attrs.insert("uses", uses.clone());
                }
                attrs.insert("is_checkout", class.is_checkout.to_string());
                attrs.insert("is_sink", class.is_sink.to_string());
                attrs.insert("injectable", class.injectable.to_string());
                attrs.insert("is_hard_gate", class.hard_gate.to_string());
                attrs.insert("is_soft_gate", class.soft_gate.to_string());
                if let Some(checkout_ref) = &class.checkout_ref {
                    attrs.insert("checkout_ref", checkout_ref.clone());
                    attrs.insert("mutable_ref", class.mutable_ref.to_string());
                }
                if !class.contexts.is_empty() {
                    attrs.insert("contexts", class.contexts.join(","));
                }
            }
            Node::Action(action) => {
                attrs.insert("ref", action.git_ref.clone());
                attrs.insert("path", action.path.clone());
                attrs.insert("initialized", action.initialized.to_string());
            }
        }

        attrs
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.name() == other.name()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.name().hash(state);
    }
}
