//! Findings and their aggregation.

use std::collections::BTreeMap;

use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::graph::{NodeKind, TaggedGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub(crate) enum Confidence {
    Medium,
    High,
}

/// A node on a finding's path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PathEntry {
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
}

/// Where an implicated context reached the script from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Source {
    /// Interpolated into the script as-is.
    Direct,
    /// Through an `env:` variable.
    Env,
    /// Through a reusable workflow's or composite action's `inputs`.
    Input,
    /// Through another job's `outputs`.
    Output,
}

/// An attacker-controlled context implicated in an injection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Implicated {
    /// The attacker-controlled context, e.g. `github.event.issue.title`.
    pub(crate) token: String,
    pub(crate) source: Source,
    /// The name the script refers to it by, when not [`Source::Direct`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) via: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Details {
    Injection {
        contexts: Vec<Implicated>,
    },
    PwnRequest {
        checkout_ref: String,
        mutable: bool,
        /// The label of the first sink at or after the checkout.
        #[serde(skip_serializing_if = "Option::is_none")]
        sink: Option<String>,
        toctou: bool,
    },
}

impl Details {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Details::Injection { .. } => "injection",
            Details::PwnRequest { .. } => "pwn_request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Finding {
    pub(crate) repo: String,
    /// The path of the workflow the attack enters through.
    pub(crate) workflow: String,
    /// The ID of the job the implicated step runs in.
    pub(crate) job: Option<String>,
    /// The implicated step's label.
    pub(crate) step: String,
    #[serde(skip)]
    pub(crate) step_node: String,
    pub(crate) triggers: Vec<String>,
    pub(crate) confidence: Confidence,
    pub(crate) self_hosted: bool,
    pub(crate) path: Vec<PathEntry>,
    #[serde(flatten)]
    pub(crate) details: Details,
}

impl Finding {
    pub(crate) fn kind(&self) -> &'static str {
        self.details.kind()
    }
}

pub(crate) fn path_entries(graph: &TaggedGraph, path: &[NodeIndex]) -> Vec<PathEntry> {
    path.iter()
        .map(|idx| {
            let node = graph.node(*idx);
            PathEntry {
                kind: node.kind(),
                name: node.name().into(),
            }
        })
        .collect()
}

/// Findings grouped by repository.
///
/// A step is reported at most once per kind of finding; when several
/// paths lead to it, the most confident one wins.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub(crate) struct Findings(BTreeMap<String, Vec<Finding>>);

impl Findings {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, finding: Finding) {
        let findings = self.0.entry(finding.repo.clone()).or_default();

        match findings
            .iter_mut()
            .find(|f| f.kind() == finding.kind() && f.step_node == finding.step_node)
        {
            Some(existing) if finding.confidence > existing.confidence => *existing = finding,
            Some(_) => {}
            None => findings.push(finding),
        }
    }

    pub(crate) fn extend(&mut self, other: Findings) {
        for finding in other.0.into_values().flatten() {
            self.push(finding);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Finding>)> {
        self.0.iter()
    }

    pub(crate) fn count_by_confidence(&self, confidence: Confidence) -> usize {
        self.0
            .values()
            .flatten()
            .filter(|f| f.confidence == confidence)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{Confidence, Details, Finding, Findings, Implicated, PathEntry, Source};
    use crate::graph::NodeKind;

    fn injection(repo: &str, step: &str, confidence: Confidence) -> Finding {
        Finding {
            repo: repo.into(),
            workflow: ".github/workflows/greet.yml".into(),
            job: Some("greet".into()),
            step: "echo".into(),
            step_node: step.into(),
            triggers: vec!["issues".into()],
            confidence,
            self_hosted: false,
            path: vec![PathEntry {
                kind: NodeKind::Workflow,
                name: "acme/widgets:HEAD:.github/workflows/greet.yml".into(),
            }],
            details: Details::Injection {
                contexts: vec![Implicated {
                    token: "github.event.issue.title".into(),
                    source: Source::Env,
                    via: Some("env.TITLE".into()),
                }],
            },
        }
    }

    #[test]
    fn test_dedupe_keeps_most_confident() {
        let mut findings = Findings::new();
        findings.push(injection("acme/widgets", "a", Confidence::Medium));
        findings.push(injection("acme/widgets", "a", Confidence::High));
        findings.push(injection("acme/widgets", "a", Confidence::Medium));
        findings.push(injection("acme/widgets", "b", Confidence::Medium));
        findings.push(injection("acme/gadgets", "a", Confidence::Medium));

        assert_eq!(findings.len(), 3);
        assert_eq!(findings.count_by_confidence(Confidence::High), 1);
        assert_eq!(
            findings.iter().map(|(repo, _)| repo.as_str()).collect::<Vec<_>>(),
            vec!["acme/gadgets", "acme/widgets"]
        );
    }

    #[test]
    fn test_serialization() -> anyhow::Result<()> {
        let mut findings = Findings::new();
        findings.push(injection("acme/widgets", "a", Confidence::High));

        assert_eq!(
            serde_json::to_value(&findings)?,
            json!({
                "acme/widgets": [{
                    "repo": "acme/widgets",
                    "workflow": ".github/workflows/greet.yml",
                    "job": "greet",
                    "step": "echo",
                    "triggers": ["issues"],
                    "confidence": "High",
                    "self_hosted": false,
                    "path": [{
                        "kind": "workflow",
                        "name": "acme/widgets:HEAD:.github/workflows/greet.yml",
                    }],
                    "kind": "injection",
                    "contexts": [{
                        "token": "github.event.issue.title",
                        "source": "env",
                        "via": "env.TITLE",
                    }],
                }],
            })
        );

        Ok(())
    }
}
