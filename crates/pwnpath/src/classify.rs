//! Static classification of steps and jobs.
//!
//! Classification is a pure function of a step or job definition and the
//! active [`Patterns`]: it runs once, at graph construction time, and
//! produces an immutable record.

use std::sync::LazyLock;

use github_actions_expressions::{Expr, context::ContextPattern};
use indexmap::IndexMap;
use regex::Regex;
use serde_yaml::Value;

use crate::{
    config::Config,
    models::{JobDef, RepositoryUses, RepositoryUsesPattern, StepDef, Uses},
    utils::{context_tokens, extract_expressions},
};

/// Substrings that mark a script as executing attacker-reachable code.
const DEFAULT_SINK_PATTERNS: &[&str] = &[
    "npm install",
    "npm ci",
    "npm run",
    "npm test",
    "npx ",
    "yarn ",
    "pnpm ",
    "pip install",
    "poetry install",
    "python setup.py",
    "pytest",
    "tox ",
    "make ",
    "cmake ",
    "cargo build",
    "cargo test",
    "cargo run",
    "go build",
    "go run",
    "go test",
    "go generate",
    "mvn ",
    "gradle ",
    "./gradlew",
    "bundle install",
    "bundle exec",
    "rake ",
    "composer install",
    "dotnet build",
    "dotnet test",
    "docker build",
    "pre-commit run",
    "eval ",
    "source ",
];

/// Line prefixes that mark a script as executing attacker-reachable code.
const DEFAULT_SINK_PREFIXES: &[&str] = &[
    "./", "bash ", "sh ", "python ", "python3 ", "node ", "ruby ", "perl ", "make", ". ",
];

const DEFAULT_PERMISSION_CHECK_PATTERNS: &[&str] = &[
    "getCollaboratorPermissionLevel",
    "checkCollaborator",
    "getMembershipForUserInOrg",
    "/collaborators/",
];

const DEFAULT_PERMISSION_CHECK_ACTIONS: &[&str] = &[
    "sushichop/action-repository-permission",
    "prince-chrismc/check-actor-permissions-action",
    "lannonbr/repo-permission-check-action",
    "actions-cool/check-user-permission",
    "TheModdingInquisition/actions-team-membership",
    "morfien101/actions-authorized-user",
];

/// Permission-check actions that fail the job on their own.
const FAILING_PERMISSION_CHECK_ACTIONS: &[&str] = &[
    "sushichop/action-repository-permission",
    "prince-chrismc/check-actor-permissions-action",
    "lannonbr/repo-permission-check-action",
    "morfien101/actions-authorized-user",
];

/// Actions that are never fetched and analyzed, even within the same org.
const DEFAULT_SAFE_ACTIONS: &[&str] = &[
    "actions/*",
    "github/*",
    "Azure/*",
    "aws-actions/*",
    "docker/*",
    "google-github-actions/*",
    "hashicorp/*",
];

/// Script fragments that fail a job.
const FAILURE_MARKERS: &[&str] = &[
    "core.setFailed",
    "exit 1",
    "process.exit(1)",
    "throw new Error",
    "throw ",
    "Write-Error",
];

/// Script fragments that compare the PR head repository with the base.
const FORK_CHECK_MARKERS: &[&str] = &[
    "head.repo.full_name",
    "head.repo.fork",
    "isCrossRepository",
];

/// Actions that execute one of their inputs as a script.
const SCRIPT_ACTIONS: &[(&str, &str)] = &[
    ("actions/github-script", "script"),
    ("amadevus/pwsh-script", "script"),
    ("jannekem/run-python-script-action", "script"),
    ("cardinalby/js-eval-action", "expression"),
];

/// Contexts whose values an external attacker can't influence.
const STATIC_CONTEXTS: &[&str] = &[
    "github.sha",
    "github.ref",
    "github.ref_name",
    "github.ref_type",
    "github.base_ref",
    "github.repository",
    "github.repository_id",
    "github.repository_owner",
    "github.repository_owner_id",
    "github.run_id",
    "github.run_number",
    "github.run_attempt",
    "github.workflow",
    "github.workflow_ref",
    "github.workspace",
    "github.server_url",
    "github.api_url",
    "github.graphql_url",
    "github.token",
    "github.job",
    "github.action_path",
    "github.event_path",
    "github.event_name",
    "github.event.number",
    "github.event.pull_request.number",
    "github.event.issue.number",
    "github.event.pull_request.head.sha",
    "github.event.pull_request.base",
    "github.event.repository",
    "github.event.workflow_run.id",
    "github.event.workflow_run.head_sha",
    "secrets",
    "runner",
    "matrix",
    "vars",
    "job",
    "strategy",
    "steps.*.outcome",
    "steps.*.conclusion",
    "needs.*.result",
];

/// Checkout refs that always resolve to trusted code.
const SAFE_CHECKOUT_REFS: &[&str] = &[
    "github.sha",
    "github.ref",
    "github.ref_name",
    "github.base_ref",
    "github.event.repository.default_branch",
    "github.event.pull_request.base.ref",
    "github.event.pull_request.base.sha",
];

/// Ref fragments that point at a pull request's code.
const PR_REF_MARKERS: &[&str] = &[
    "head_ref",
    "pull_request.head",
    "head.ref",
    "head.sha",
    "head_sha",
    "head_branch",
    "pull_request.number",
    "event.number",
    "issue.number",
    "refs/pull/",
    "pr_number",
    "pull/",
];

static SCRIPT_CHECKOUT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?m)\b(?:git\s+(?:checkout|switch|fetch|pull)|gh\s+pr\s+checkout)\b([^\n;&|]*)")
        .unwrap()
});

static SHA_REF: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)(?:[._]sha\b|\b[0-9a-f]{40}\b)").unwrap()
});

static MATRIX_REF: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^matrix\.([\w-]+)$").unwrap()
});

fn patterns(raw: &[&str]) -> Vec<RepositoryUsesPattern> {
    raw.iter().filter_map(|p| p.parse().ok()).collect()
}

/// The pattern tables that drive classification.
#[derive(Debug, Clone)]
pub(crate) struct Patterns {
    pub(crate) sink_patterns: Vec<String>,
    pub(crate) sink_prefixes: Vec<String>,
    pub(crate) permission_check_patterns: Vec<String>,
    pub(crate) permission_check_actions: Vec<RepositoryUsesPattern>,
    failing_permission_check_actions: Vec<RepositoryUsesPattern>,
    pub(crate) safe_actions: Vec<RepositoryUsesPattern>,
}

impl Default for Patterns {
    fn default() -> Self {
        let strings = |raw: &[&str]| raw.iter().map(|s| s.to_string()).collect();

        Self {
            sink_patterns: strings(DEFAULT_SINK_PATTERNS),
            sink_prefixes: strings(DEFAULT_SINK_PREFIXES),
            permission_check_patterns: strings(DEFAULT_PERMISSION_CHECK_PATTERNS),
            permission_check_actions: patterns(DEFAULT_PERMISSION_CHECK_ACTIONS),
            failing_permission_check_actions: patterns(FAILING_PERMISSION_CHECK_ACTIONS),
            safe_actions: patterns(DEFAULT_SAFE_ACTIONS),
        }
    }
}

impl Patterns {
    /// The default tables, extended with the configuration's.
    pub(crate) fn from_config(config: &Config) -> Self {
        let mut patterns = Self::default();
        patterns
            .sink_patterns
            .extend(config.sink_patterns.iter().cloned());
        patterns
            .sink_prefixes
            .extend(config.sink_prefixes.iter().cloned());
        patterns
            .permission_check_patterns
            .extend(config.permission_check_patterns.iter().cloned());
        patterns
            .permission_check_actions
            .extend(config.permission_check_actions.iter().cloned());
        patterns
            .safe_actions
            .extend(config.safe_actions.iter().cloned());
        patterns
    }

    fn is_sink_script(&self, script: &str) -> bool {
        self.sink_patterns.iter().any(|p| script.contains(p.as_str()))
            || script.lines().map(str::trim_start).any(|line| {
                self.sink_prefixes
                    .iter()
                    .any(|p| starts_with_command(line, p))
            })
    }

    fn is_permission_check_script(&self, script: &str) -> bool {
        self.permission_check_patterns
            .iter()
            .any(|p| script.contains(p.as_str()))
    }
}

/// Everything classification learns about a single step.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StepClassification {
    /// The step checks out pull request code.
    pub(crate) is_checkout: bool,
    /// The ref being checked out, for checkout steps.
    pub(crate) checkout_ref: Option<String>,
    /// The checkout ref can move after the workflow starts (i.e. isn't a SHA).
    pub(crate) mutable_ref: bool,
    /// The step executes code that the checked-out tree controls.
    pub(crate) is_sink: bool,
    /// The step's script interpolates a non-static context.
    pub(crate) injectable: bool,
    /// The step checks the triggering actor's permissions.
    pub(crate) is_gate: bool,
    pub(crate) hard_gate: bool,
    pub(crate) soft_gate: bool,
    /// The `${{ }}` bodies interpolated into the step's script.
    pub(crate) contexts: Vec<String>,
}

impl StepClassification {
    pub(crate) fn is_mutable_checkout(&self) -> bool {
        self.is_checkout && self.mutable_ref
    }
}

/// Returns the script a step executes: its `run:`, or the script input of
/// a known script-executing action.
pub(crate) fn step_script(uses: Option<&Uses>, run: Option<&str>, with: &IndexMap<String, String>) -> Option<String> {
    if let Some(run) = run {
        return Some(run.into());
    }

    let Some(Uses::Repository(uses)) = uses else {
        return None;
    };

    SCRIPT_ACTIONS
        .iter()
        .find(|(action, _)| is_action(uses, action))
        .and_then(|(_, input)| with.get(*input).cloned())
}

/// Whether `line` starts with `prefix`. A prefix ending in a word
/// character must also end a word: `make` matches `make` and `make test`,
/// but not `makensis`.
fn starts_with_command(line: &str, prefix: &str) -> bool {
    let Some(rest) = line.strip_prefix(prefix) else {
        return false;
    };

    let open_ended = !prefix.ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == '-');
    open_ended
        || rest.is_empty()
        || rest.starts_with(char::is_whitespace)
        || rest.starts_with(';')
}

fn is_action(uses: &RepositoryUses, action: &str) -> bool {
    action
        .parse::<RepositoryUsesPattern>()
        .is_ok_and(|pattern| pattern.matches(uses))
}

/// Returns whether the given context is outside of the attacker's reach.
pub(crate) fn is_static_context(ctx: &str) -> bool {
    STATIC_CONTEXTS
        .iter()
        .filter_map(|p| ContextPattern::new(p))
        .any(|p| p.parent_of(ctx))
}

fn is_mutable_ref(git_ref: &str) -> bool {
    !SHA_REF.is_match(git_ref)
}

fn references_pr(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    PR_REF_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Checkout detection for `run:` scripts.
fn script_checkout(script: &str) -> Option<String> {
    for caps in SCRIPT_CHECKOUT.captures_iter(script) {
        let command = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let rest = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();

        if rest.is_empty() {
            continue;
        }

        let pr_checkout = command.trim_start().starts_with("gh");
        if pr_checkout || references_pr(rest) {
            if rest.contains("${{") {
                return Some(rest.to_string());
            }
            let token = rest
                .split_whitespace()
                .find(|t| references_pr(t) || t.starts_with('$'))
                .unwrap_or(rest);
            return Some(token.to_string());
        }
    }

    None
}

/// Checkout detection for `actions/checkout`.
fn action_checkout(with: &IndexMap<String, String>) -> Option<String> {
    let git_ref = with.get("ref")?;

    if !git_ref.contains("${{") || with.contains_key("path") {
        return None;
    }

    let contexts = extract_expressions(git_ref)
        .into_iter()
        .flat_map(context_tokens)
        .collect::<Vec<_>>();

    let all_safe = !contexts.is_empty()
        && contexts.iter().all(|ctx| {
            SAFE_CHECKOUT_REFS
                .iter()
                .any(|safe| ctx.eq_ignore_ascii_case(safe))
        });
    let base_only = git_ref.contains("base") && !references_pr(git_ref);

    (!all_safe && !base_only).then(|| git_ref.clone())
}

/// Classifies a single step.
pub(crate) fn classify_step(step: &StepDef<'_>, patterns: &Patterns) -> StepClassification {
    let uses = step.uses().and_then(|u| Uses::parse(u).ok());
    let with = step.with();
    let script = step_script(uses.as_ref(), step.run(), &with);

    let contexts: Vec<String> = script
        .as_deref()
        .map(extract_expressions)
        .unwrap_or_default()
        .into_iter()
        .map(Into::into)
        .collect();

    let injectable = contexts.iter().any(|body| {
        let tokens = context_tokens(body);
        // Bodies we can't make sense of fail open.
        (tokens.is_empty() && Expr::parse(body).is_err())
            || tokens.iter().any(|t| !is_static_context(t))
    });

    let mut class = StepClassification {
        injectable,
        contexts,
        ..Default::default()
    };

    let checkout_ref = match (&uses, step.run()) {
        (_, Some(run)) => script_checkout(run),
        (Some(Uses::Repository(r)), None) if is_action(r, "actions/checkout") => {
            action_checkout(&with)
        }
        _ => None,
    };
    if let Some(checkout_ref) = checkout_ref {
        class.is_checkout = true;
        class.mutable_ref = is_mutable_ref(&checkout_ref);
        class.checkout_ref = Some(checkout_ref);
    }

    class.is_sink = match (&uses, &script) {
        (Some(Uses::Local(_)), _) => true,
        (Some(Uses::Repository(r)), _) if is_action(r, "ruby/setup-ruby") => {
            with.get("bundler-cache").is_some_and(|v| v == "true")
        }
        (Some(Uses::Repository(r)), _) if is_action(r, "actions/setup-node") => with
            .get("cache")
            .is_some_and(|v| !v.is_empty() && v != "false"),
        // Script actions always execute their script.
        (Some(Uses::Repository(_)), Some(script)) => !script.trim().is_empty(),
        (_, Some(script)) => injectable || patterns.is_sink_script(script),
        _ => false,
    };

    let script_gate = script.as_deref().map(|script| {
        let fails = FAILURE_MARKERS.iter().any(|m| script.contains(m));
        let permission_check = patterns.is_permission_check_script(script);
        let fork_check = FORK_CHECK_MARKERS.iter().any(|m| script.contains(m)) && fails;
        (permission_check || fork_check, fork_check || (permission_check && fails))
    });

    let action_gate = match &uses {
        Some(Uses::Repository(r)) if r.matches_any(&patterns.permission_check_actions) => Some((
            true,
            r.matches_any(&patterns.failing_permission_check_actions),
        )),
        _ => None,
    };

    if let Some((true, hard)) = script_gate.or(action_gate) {
        class.is_gate = true;
        class.hard_gate = hard;
        class.soft_gate = !hard;
    }

    class
}

/// Everything classification learns about a job.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct JobClassification {
    /// Some configuration of the job runs on a self-hosted runner.
    pub(crate) self_hosted: bool,
}

pub(crate) fn classify_job(job: &JobDef<'_>) -> JobClassification {
    JobClassification {
        self_hosted: job
            .runs_on()
            .is_some_and(|runs_on| runs_on_self_hosted(runs_on, job.matrix())),
    }
}

fn is_github_hosted(label: &str) -> bool {
    let label = label.trim().to_ascii_lowercase();
    ["ubuntu-", "windows-", "macos-"]
        .iter()
        .any(|prefix| label.starts_with(prefix))
}

/// Whether any label in a `runs-on:` value could select a self-hosted runner.
fn runs_on_self_hosted(runs_on: &Value, matrix: Option<&Value>) -> bool {
    match runs_on {
        Value::String(label) if label.contains("${{") => extract_expressions(label)
            .into_iter()
            .any(|body| expression_self_hosted(body, matrix)),
        Value::String(label) => !is_github_hosted(label),
        Value::Sequence(labels) => labels.iter().any(|l| runs_on_self_hosted(l, matrix)),
        Value::Mapping(m) => {
            // Runner groups are an organization-level, self-hosted concept.
            m.contains_key("group")
                || m.get("labels")
                    .is_some_and(|labels| runs_on_self_hosted(labels, matrix))
        }
        _ => false,
    }
}

fn expression_self_hosted(body: &str, matrix: Option<&Value>) -> bool {
    let Some(key) = MATRIX_REF.captures(body).and_then(|c| c.get(1)) else {
        // Not backed by the matrix, so we can't tell.
        return false;
    };

    match matrix {
        None => false,
        // `matrix: ${{ fromJSON(...) }}`
        Some(Value::String(_)) => true,
        Some(Value::Mapping(matrix)) => {
            let mut values = vec![];
            if let Some(value) = matrix.get(key.as_str()) {
                values.push(value);
            }

            match matrix.get("include") {
                Some(Value::Sequence(includes)) => {
                    values.extend(includes.iter().filter_map(|i| i.get(key.as_str())));
                }
                Some(Value::String(_)) => return true,
                _ => {}
            }

            values.into_iter().any(matrix_value_self_hosted)
        }
        Some(_) => false,
    }
}

fn matrix_value_self_hosted(value: &Value) -> bool {
    match value {
        // Values sourced from expressions are ambiguous and fail open.
        Value::String(s) if s.contains("${{") => true,
        Value::String(s) => !is_github_hosted(s),
        Value::Sequence(items) => items.iter().any(matrix_value_self_hosted),
        Value::Mapping(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Patterns, classify_job, classify_step, is_static_context};
    use crate::models::Document;

    fn steps_of(raw_steps: &str) -> Document {
        let raw = format!("on: pull_request_target\njobs:\n  test:\n    runs-on: ubuntu-latest\n    steps:\n{raw_steps}");
        Document::parse(raw, "acme/widgets", "main", ".github/workflows/test.yml")
    }

    fn classify(raw_steps: &str) -> Vec<super::StepClassification> {
        let doc = steps_of(raw_steps);
        let patterns = Patterns::default();
        doc.jobs()[0]
            .steps()
            .iter()
            .map(|s| classify_step(s, &patterns))
            .collect()
    }

    #[test]
    fn test_injectable_run_is_sink() {
        let steps = classify("      - run: echo '${{ github.event.pull_request.title }}'\n");
        let step = &steps[0];
        assert!(step.injectable);
        assert!(step.is_sink);
        assert!(!step.is_checkout);
        assert_eq!(step.contexts, vec!["github.event.pull_request.title"]);
    }

    #[test]
    fn test_static_contexts_are_not_injectable() {
        let steps = classify(
            "      - run: echo ${{ github.sha }} ${{ secrets.TOKEN }} ${{ runner.os }} ${{ steps.x.outcome }}\n",
        );
        assert!(!steps[0].injectable);
        assert!(!steps[0].is_sink);
    }

    #[test]
    fn test_static_context_table() {
        for (ctx, expected) in [
            ("github.sha", true),
            ("secrets.GITHUB_TOKEN", true),
            ("github.event.pull_request.base.ref", true),
            ("steps.build.outcome", true),
            ("github.event.pull_request.head.ref", false),
            ("github.head_ref", false),
            ("env.FOO", false),
            ("steps.build.outputs.name", false),
        ] {
            assert_eq!(is_static_context(ctx), expected, "{ctx}");
        }
    }

    #[test]
    fn test_script_action_injection() {
        let steps = classify(
            r#"      - uses: actions/github-script@v7
        with:
          script: |
            console.log("${{ github.event.comment.body }}")
      - uses: actions/github-script@v7
        with:
          script: console.log(context.payload)
"#,
        );
        assert!(steps[0].injectable);
        assert!(steps[0].is_sink);
        assert!(!steps[1].injectable);
        assert!(steps[1].is_sink);
    }

    #[test]
    fn test_checkout_detection() {
        let steps = classify(
            r#"      - uses: actions/checkout@v4
        with:
          ref: ${{ github.event.pull_request.head.sha }}
      - uses: actions/checkout@v4
        with:
          ref: ${{ github.head_ref }}
      - uses: actions/checkout@v4
        with:
          ref: ${{ github.head_ref }}
          path: pr
      - uses: actions/checkout@v4
        with:
          ref: ${{ github.event.pull_request.base.ref }}
      - uses: actions/checkout@v4
      - run: gh pr checkout ${{ github.event.issue.number }}
      - run: git checkout main
      - run: |
          git fetch origin pull/${{ github.event.pull_request.number }}/head:pr
          git checkout pr
"#,
        );

        let checkouts = steps
            .iter()
            .map(|s| (s.is_checkout, s.mutable_ref))
            .collect::<Vec<_>>();

        assert_eq!(
            checkouts,
            vec![
                (true, false),
                (true, true),
                (false, false),
                (false, false),
                (false, false),
                (true, true),
                (false, false),
                (true, true),
            ]
        );
        assert_eq!(
            steps[0].checkout_ref.as_deref(),
            Some("${{ github.event.pull_request.head.sha }}")
        );
    }

    #[test]
    fn test_sink_detection() {
        let steps = classify(
            r#"      - run: npm ci && npm test
      - run: |
          ./build.sh
      - run: echo hello
      - uses: ./.github/actions/setup
      - uses: ruby/setup-ruby@v1
        with:
          bundler-cache: true
      - uses: ruby/setup-ruby@v1
      - uses: actions/setup-node@v4
        with:
          cache: npm
      - uses: actions/upload-artifact@v4
"#,
        );

        let sinks = steps.iter().map(|s| s.is_sink).collect::<Vec<_>>();
        assert_eq!(
            sinks,
            vec![true, true, false, true, true, false, true, false]
        );
    }

    #[test]
    fn test_sink_prefix_ends_a_word() {
        let steps = classify(
            r#"      - run: make
      - run: |
          cd web
          make -j4
      - run: makensis installer.nsi
      - run: make_release.sh
      - run: ./make_release.sh
"#,
        );

        let sinks = steps.iter().map(|s| s.is_sink).collect::<Vec<_>>();
        assert_eq!(sinks, vec![true, true, false, false, true]);
    }

    #[test]
    fn test_gate_detection() {
        let steps = classify(
            r#"      - uses: actions/github-script@v7
        with:
          script: |
            const { data } = await github.rest.repos.getCollaboratorPermissionLevel({ owner, repo, username });
            if (data.permission !== 'admin') { core.setFailed('nope') }
      - uses: actions/github-script@v7
        with:
          script: |
            const { data } = await github.rest.repos.getCollaboratorPermissionLevel({ owner, repo, username });
            core.setOutput('ok', data.permission === 'admin')
      - run: |
          if [ "${{ github.event.pull_request.head.repo.full_name }}" != "${{ github.repository }}" ]; then exit 1; fi
      - uses: actions-cool/check-user-permission@v2
      - uses: sushichop/action-repository-permission@v2
      - run: echo fine
"#,
        );

        let gates = steps
            .iter()
            .map(|s| (s.is_gate, s.hard_gate, s.soft_gate))
            .collect::<Vec<_>>();
        assert_eq!(
            gates,
            vec![
                (true, true, false),
                (true, false, true),
                (true, true, false),
                (true, false, true),
                (true, true, false),
                (false, false, false),
            ]
        );
    }

    #[test]
    fn test_configured_patterns() {
        let mut patterns = Patterns::default();
        patterns.sink_patterns.push("just ".into());
        patterns
            .permission_check_patterns
            .push("isTrustedActor".into());

        let doc = steps_of("      - run: just build\n      - run: isTrustedActor || exit 1\n");
        let steps = doc.jobs()[0].steps();

        assert!(classify_step(&steps[0], &patterns).is_sink);
        let gate = classify_step(&steps[1], &patterns);
        assert!(gate.is_gate && gate.hard_gate);
        assert!(!classify_step(&steps[0], &Patterns::default()).is_sink);
    }

    #[test]
    fn test_self_hosted_detection() {
        for (job, expected) in [
            ("runs-on: ubuntu-latest", false),
            ("runs-on: [self-hosted, linux]", true),
            ("runs-on: my-runner", true),
            ("runs-on:\n      group: large", true),
            ("runs-on:\n      labels: [windows-2022]", false),
            ("runs-on: ${{ inputs.runner }}", false),
            (
                "runs-on: ${{ matrix.os }}\n    strategy:\n      matrix:\n        os: [ubuntu-latest, macos-14]",
                false,
            ),
            (
                "runs-on: ${{ matrix.os }}\n    strategy:\n      matrix:\n        os: [ubuntu-latest, gpu-box]",
                true,
            ),
            (
                "runs-on: ${{ matrix.os }}\n    strategy:\n      matrix:\n        os: [ubuntu-latest]\n        include:\n          - os: [self-hosted, arm]",
                true,
            ),
            (
                "runs-on: ${{ matrix.os }}\n    strategy:\n      matrix: ${{ fromJSON(needs.setup.outputs.matrix) }}",
                true,
            ),
            (
                "runs-on: ${{ matrix.os }}\n    strategy:\n      matrix:\n        os: ${{ fromJSON(needs.setup.outputs.oses) }}",
                true,
            ),
        ] {
            let raw = format!("on: push\njobs:\n  test:\n    {job}\n");
            let doc = Document::parse(raw, "acme/widgets", "main", "ci.yml");
            assert_eq!(
                classify_job(&doc.jobs()[0]).self_hosted,
                expected,
                "{job}"
            );
        }
    }
}
