//! Lenient views over workflow and composite action YAML.
//!
//! Unlike a schema-validated model, a [`Document`] accepts anything that
//! parses as a YAML mapping and exposes only the fields the analysis
//! needs. Documents that fail to parse are kept but marked invalid, and
//! every consumer skips them.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

/// The pseudo-job name given to a composite action's `runs.steps`.
pub(crate) const COMPOSITE_JOB: &str = "composite";

/// A parsed workflow or action definition.
#[derive(Debug)]
pub(crate) struct Document {
    /// The `owner/repo` this document belongs to.
    pub(crate) repo: String,
    /// The git ref the document was read at.
    pub(crate) git_ref: String,
    /// The document's path within `repo`.
    pub(crate) path: String,
    /// The top-level mapping, or `None` if the document is invalid.
    mapping: Option<Mapping>,
}

impl Document {
    /// Parses `raw` into a document. Never fails; unparseable input or a
    /// non-mapping top level produces an invalid document instead.
    pub(crate) fn parse(
        raw: impl Into<String>,
        repo: impl Into<String>,
        git_ref: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let raw = raw.into().replace('\t', "  ");
        let repo = repo.into();
        let path = path.into();

        let mapping = match serde_yaml::from_str::<Value>(&raw) {
            Ok(Value::Mapping(mapping)) => Some(stringify_bool_keys(mapping)),
            Ok(_) => {
                tracing::warn!("{repo}:{path}: top level is not a mapping");
                None
            }
            Err(e) => {
                tracing::warn!("{repo}:{path}: invalid YAML: {e}");
                None
            }
        };

        Self {
            repo,
            git_ref: git_ref.into(),
            path,
            mapping,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.mapping.is_some()
    }

    #[cfg(test)]
    pub(crate) fn mapping(&self) -> Option<&Mapping> {
        self.mapping.as_ref()
    }

    /// Returns true iff this document is a composite action,
    /// i.e. `runs.using` is `composite`.
    pub(crate) fn is_composite(&self) -> bool {
        self.runs()
            .and_then(|runs| str_field(runs, "using"))
            .is_some_and(|using| using == "composite")
    }

    fn runs(&self) -> Option<&Mapping> {
        self.mapping.as_ref()?.get("runs")?.as_mapping()
    }

    /// Returns the workflow's name, or its path if unnamed.
    pub(crate) fn display_name(&self) -> &str {
        self.mapping
            .as_ref()
            .and_then(|m| str_field(m, "name"))
            .unwrap_or(&self.path)
    }

    /// Returns the triggers this workflow runs on.
    ///
    /// A `pull_request_target` trigger limited to exactly `types: [labeled]`
    /// is reported as `pull_request_target:labeled`.
    pub(crate) fn triggers(&self) -> Vec<String> {
        let Some(on) = self.mapping.as_ref().and_then(|m| m.get("on")) else {
            return vec![];
        };

        match on {
            Value::String(trigger) => vec![trigger.clone()],
            Value::Sequence(triggers) => triggers
                .iter()
                .filter_map(Value::as_str)
                .map(Into::into)
                .collect(),
            Value::Mapping(triggers) => triggers
                .iter()
                .filter_map(|(name, config)| {
                    let name = name.as_str()?;
                    if name == "pull_request_target" && labeled_only(config) {
                        Some("pull_request_target:labeled".into())
                    } else {
                        Some(name.into())
                    }
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Returns the workflow-level `env:` block.
    pub(crate) fn env(&self) -> IndexMap<String, String> {
        self.mapping
            .as_ref()
            .map(|m| string_map(m.get("env")))
            .unwrap_or_default()
    }

    /// Returns the document's jobs, in declaration order.
    ///
    /// A composite action has a single pseudo-job named
    /// [`COMPOSITE_JOB`] holding its `runs.steps`.
    pub(crate) fn jobs(&self) -> Vec<JobDef<'_>> {
        if self.is_composite() {
            return self
                .runs()
                .map(|runs| JobDef {
                    name: COMPOSITE_JOB,
                    body: runs,
                })
                .into_iter()
                .collect();
        }

        let Some(jobs) = self
            .mapping
            .as_ref()
            .and_then(|m| m.get("jobs"))
            .and_then(Value::as_mapping)
        else {
            return vec![];
        };

        jobs.iter()
            .filter_map(|(name, body)| {
                Some(JobDef {
                    name: name.as_str()?,
                    body: body.as_mapping()?,
                })
            })
            .collect()
    }
}

fn labeled_only(config: &Value) -> bool {
    let Some(types) = config.get("types") else {
        return false;
    };

    match types {
        Value::String(t) => t == "labeled",
        Value::Sequence(ts) => ts.len() == 1 && ts[0].as_str() == Some("labeled"),
        _ => false,
    }
}

/// Rewrites boolean mapping keys (`true:`, `False:`) into string keys,
/// recursively. Workflow keys are always strings.
fn stringify_bool_keys(mapping: Mapping) -> Mapping {
    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                Value::Bool(b) => Value::String(b.to_string()),
                other => other,
            };
            (key, stringify_value(value))
        })
        .collect()
}

fn stringify_value(value: Value) -> Value {
    match value {
        Value::Mapping(m) => Value::Mapping(stringify_bool_keys(m)),
        Value::Sequence(s) => Value::Sequence(s.into_iter().map(stringify_value).collect()),
        other => other,
    }
}

/// Renders a scalar YAML value as a string.
pub(crate) fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a str> {
    mapping.get(key).and_then(Value::as_str)
}

/// Reads a `key: scalar` mapping, e.g. `env:` or `with:`.
fn string_map(value: Option<&Value>) -> IndexMap<String, String> {
    let Some(Value::Mapping(mapping)) = value else {
        return IndexMap::new();
    };

    mapping
        .iter()
        .filter_map(|(k, v)| Some((scalar(k)?, scalar(v)?)))
        .collect()
}

/// A single job, or a composite action's pseudo-job.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JobDef<'doc> {
    pub(crate) name: &'doc str,
    body: &'doc Mapping,
}

impl<'doc> JobDef<'doc> {
    /// The job's `uses:`, if it calls a reusable workflow.
    pub(crate) fn uses(&self) -> Option<&'doc str> {
        str_field(self.body, "uses")
    }

    /// The jobs this job `needs:`.
    pub(crate) fn needs(&self) -> Vec<&'doc str> {
        match self.body.get("needs") {
            Some(Value::String(need)) => vec![need.as_str()],
            Some(Value::Sequence(needs)) => needs.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        }
    }

    pub(crate) fn steps(&self) -> Vec<StepDef<'doc>> {
        let Some(Value::Sequence(steps)) = self.body.get("steps") else {
            return vec![];
        };

        steps
            .iter()
            .filter_map(Value::as_mapping)
            .enumerate()
            .map(|(index, body)| StepDef { index, body })
            .collect()
    }

    pub(crate) fn env(&self) -> IndexMap<String, String> {
        string_map(self.body.get("env"))
    }

    /// The `with:` block passed to a called reusable workflow.
    pub(crate) fn with(&self) -> IndexMap<String, String> {
        string_map(self.body.get("with"))
    }

    pub(crate) fn outputs(&self) -> IndexMap<String, String> {
        string_map(self.body.get("outputs"))
    }

    pub(crate) fn condition(&self) -> Option<String> {
        self.body.get("if").and_then(scalar)
    }

    /// The deployment environment's name, from either
    /// `environment: name` or `environment: { name: ... }`.
    pub(crate) fn environment(&self) -> Option<String> {
        match self.body.get("environment")? {
            Value::Mapping(env) => env.get("name").and_then(scalar),
            other => scalar(other),
        }
    }

    pub(crate) fn permissions(&self) -> Option<&'doc Value> {
        self.body.get("permissions")
    }

    pub(crate) fn runs_on(&self) -> Option<&'doc Value> {
        self.body.get("runs-on")
    }

    pub(crate) fn matrix(&self) -> Option<&'doc Value> {
        self.body.get("strategy")?.get("matrix")
    }
}

/// A single step within a job.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepDef<'doc> {
    /// The step's position within its job.
    pub(crate) index: usize,
    body: &'doc Mapping,
}

impl<'doc> StepDef<'doc> {
    pub(crate) fn name(&self) -> Option<&'doc str> {
        str_field(self.body, "name")
    }

    pub(crate) fn id(&self) -> Option<&'doc str> {
        str_field(self.body, "id")
    }

    pub(crate) fn uses(&self) -> Option<&'doc str> {
        str_field(self.body, "uses")
    }

    pub(crate) fn run(&self) -> Option<&'doc str> {
        str_field(self.body, "run")
    }

    pub(crate) fn with(&self) -> IndexMap<String, String> {
        string_map(self.body.get("with"))
    }

    pub(crate) fn env(&self) -> IndexMap<String, String> {
        string_map(self.body.get("env"))
    }

    pub(crate) fn condition(&self) -> Option<String> {
        self.body.get("if").and_then(scalar)
    }

    /// A human-readable label: the step's name, id, `uses:`, or index.
    pub(crate) fn label(&self) -> String {
        self.name()
            .or(self.id())
            .or(self.uses())
            .map(Into::into)
            .unwrap_or_else(|| format!("step {}", self.index))
    }
}
