//! Input collection: local files and directories, and remote repository slugs.

use std::{fmt, str::FromStr};

use anyhow::{Context as _, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use tracing::instrument;

use crate::{api::LocalSource, models::Document, tips};

/// The ref local inputs are read at.
pub(crate) const LOCAL_REF: &str = "HEAD";

const WORKFLOWS_DIR: &str = ".github/workflows";

/// A GitHub repository slug, i.e. `owner/repo[@ref]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RepoSlug {
    /// The owner of the repository.
    pub(crate) owner: String,
    /// The name of the repository.
    pub(crate) repo: String,
    /// An optional Git reference, e.g. a branch or tag name.
    pub(crate) git_ref: Option<String>,
}

impl RepoSlug {
    /// `owner/repo`, without the ref.
    pub(crate) fn repo_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoSlug {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, git_ref) = match s.rsplit_once('@') {
            Some((path, git_ref)) => (path, Some(git_ref)),
            None => (s, None),
        };

        let components = path.splitn(2, '/').collect::<Vec<_>>();

        match components.as_slice() {
            [_, repo] if repo.contains('/') => Err(anyhow!(tips(
                format!("invalid repo slug `{s}` (too many parts)"),
                &["pass owner/repo or owner/repo@ref"]
            ))),
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: (*owner).into(),
                repo: (*repo).into(),
                git_ref: git_ref.filter(|r| !r.is_empty()).map(Into::into),
            }),
            _ => Err(anyhow!(tips(
                format!("invalid repo slug `{s}` (too short)"),
                &["pass owner/repo or owner/repo@ref"]
            ))),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.git_ref {
            Some(git_ref) => write!(f, "{}/{}@{git_ref}", self.owner, self.repo),
            None => write!(f, "{}/{}", self.owner, self.repo),
        }
    }
}

/// Everything collected from the command line's inputs.
#[derive(Debug, Default)]
pub(crate) struct Inputs {
    /// Local workflows, in collection order.
    pub(crate) workflows: Vec<Document>,
    /// Every local workflow and action file, for lazy resolution.
    pub(crate) source: LocalSource,
    /// Remote repositories to fetch.
    pub(crate) remote: Vec<RepoSlug>,
}

impl Inputs {
    pub(crate) fn is_empty(&self) -> bool {
        self.workflows.is_empty() && self.remote.is_empty()
    }

    fn add_workflow(&mut self, repo: &str, path: &str, contents: String) {
        self.source.insert(repo, path, contents.clone());
        self.workflows
            .push(Document::parse(contents, repo, LOCAL_REF, path));
    }
}

/// The repository name for a local checkout rooted at `root`.
fn local_repo_name(root: &Utf8Path, repo_name: Option<&str>) -> Result<String> {
    if let Some(name) = repo_name {
        return Ok(name.into());
    }

    let root = root
        .canonicalize_utf8()
        .with_context(|| format!("couldn't resolve {root}"))?;

    Ok(format!("local/{}", root.file_name().unwrap_or("root")))
}

/// Splits a single file input into its checkout root and its path within
/// the checkout.
fn split_file_input(input: &Utf8Path) -> (Utf8PathBuf, Utf8PathBuf) {
    let Some(file_name) = input.file_name() else {
        return (Utf8PathBuf::from("."), input.into());
    };

    let parent = input.parent().unwrap_or(Utf8Path::new(""));
    if parent.ends_with(WORKFLOWS_DIR) {
        let root = parent
            .parent()
            .and_then(Utf8Path::parent)
            .unwrap_or(Utf8Path::new(""));
        (
            non_empty(root),
            Utf8Path::new(WORKFLOWS_DIR).join(file_name),
        )
    } else {
        (non_empty(parent), file_name.into())
    }
}

fn non_empty(path: &Utf8Path) -> Utf8PathBuf {
    if path.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        path.into()
    }
}

#[instrument(skip(inputs))]
fn collect_from_file(input: &Utf8Path, repo_name: Option<&str>, inputs: &mut Inputs) -> Result<()> {
    let (root, path) = split_file_input(input);
    let repo = local_repo_name(&root, repo_name)?;
    let contents = std::fs::read_to_string(input)?;

    match (input.file_stem(), input.extension()) {
        (Some("action"), Some("yml" | "yaml")) => {
            inputs.source.insert(&repo, path.as_str(), contents);
        }
        (Some(_), Some("yml" | "yaml")) => inputs.add_workflow(&repo, path.as_str(), contents),
        _ => return Err(anyhow!("invalid input: {input}")),
    }

    Ok(())
}

#[instrument(skip(inputs))]
fn collect_from_dir(input: &Utf8Path, repo_name: Option<&str>, inputs: &mut Inputs) -> Result<()> {
    let repo = local_repo_name(input, repo_name)?;

    // Start with all filters disabled, then honor `.gitignore` and friends
    // even when there's no `.git/` directory.
    let mut walker = WalkBuilder::new(input);
    walker
        .standard_filters(false)
        .require_git(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true);

    for entry in walker.build() {
        let entry = entry?;
        let entry = <&Utf8Path>::try_from(entry.path())?;

        if !entry.is_file() {
            continue;
        }

        let relative = entry.strip_prefix(input).unwrap_or(entry);

        if matches!(entry.extension(), Some("yml" | "yaml"))
            && entry
                .parent()
                .is_some_and(|dir| dir.ends_with(WORKFLOWS_DIR))
        {
            tracing::debug!("collecting workflow {relative}");
            let contents = std::fs::read_to_string(entry)?;
            inputs.add_workflow(&repo, relative.as_str(), contents);
        } else if matches!(entry.file_name(), Some("action.yml" | "action.yaml")) {
            tracing::debug!("collecting action {relative}");
            let contents = std::fs::read_to_string(entry)?;
            inputs.source.insert(&repo, relative.as_str(), contents);
        }
    }

    Ok(())
}

/// Collects every input. Anything that isn't a file or directory on disk
/// is taken as an `owner/repo[@ref]` slug.
pub(crate) fn collect_inputs(raw_inputs: &[String], repo_name: Option<&str>) -> Result<Inputs> {
    let mut inputs = Inputs::default();

    for input in raw_inputs {
        let input_path = Utf8Path::new(input);
        if input_path.is_file() {
            collect_from_file(input_path, repo_name, &mut inputs)?;
        } else if input_path.is_dir() {
            collect_from_dir(input_path, repo_name, &mut inputs)?;
        } else {
            inputs.remote.push(input.parse()?);
        }
    }

    if inputs.is_empty() {
        return Err(anyhow!(tips(
            "no workflows collected",
            &["pass a workflow file, a repository checkout, or owner/repo[@ref]"]
        )));
    }

    Ok(inputs)
}
