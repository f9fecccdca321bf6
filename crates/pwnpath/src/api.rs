//! The interfaces the analysis consumes from its data sources.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::github::ClientError;

/// Repository metadata.
///
/// This model is intentionally incomplete.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct RepositoryInfo {
    pub(crate) full_name: String,
    #[serde(default)]
    pub(crate) fork: bool,
    #[serde(default)]
    pub(crate) default_branch: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    /// An error from the GitHub API client.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// A repository name that isn't `owner/repo`.
    #[error("malformed repository name: {0}")]
    BadRepo(String),
}

/// A source of workflow and action definitions and repository metadata.
///
/// Absent data is `None` (or empty), never an error; errors are reserved
/// for failures to reach the source at all.
#[async_trait]
pub(crate) trait ActionsApi: Send + Sync {
    async fn get_workflow_yaml(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, ApiError>;

    /// Returns the `action.yml` (or `action.yaml`) in the `path` directory.
    async fn get_action_definition(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, ApiError>;

    /// Returns the names of the repository's environments that require
    /// a reviewer's approval.
    async fn get_environment_protection_rules(&self, repo: &str) -> Result<Vec<String>, ApiError>;

    async fn get_repository(&self, repo: &str) -> Result<Option<RepositoryInfo>, ApiError>;
}

/// The candidate paths for the action definition in `dir`.
pub(crate) fn action_paths(dir: &str) -> [String; 2] {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        ["action.yml".into(), "action.yaml".into()]
    } else {
        [format!("{dir}/action.yml"), format!("{dir}/action.yaml")]
    }
}

/// An offline source that serves files collected from local inputs.
///
/// Refs are ignored: a local checkout has exactly one. Repositories are
/// never forks and have no protected environments.
#[derive(Debug, Default)]
pub(crate) struct LocalSource {
    files: HashMap<(String, String), String>,
    forks: HashSet<String>,
    protected: HashMap<String, Vec<String>>,
}

impl LocalSource {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, repo: &str, path: &str, contents: String) {
        self.files
            .insert((repo.to_string(), path.trim_start_matches("./").to_string()), contents);
    }

    /// Whether any collected file belongs to `repo`.
    pub(crate) fn contains_repo(&self, repo: &str) -> bool {
        self.files.keys().any(|(r, _)| r == repo)
    }

    fn get(&self, repo: &str, path: &str) -> Option<String> {
        self.files
            .get(&(repo.to_string(), path.trim_start_matches("./").to_string()))
            .cloned()
    }

    #[cfg(test)]
    pub(crate) fn mark_fork(&mut self, repo: &str) {
        self.forks.insert(repo.into());
    }

    #[cfg(test)]
    pub(crate) fn protect_environment(&mut self, repo: &str, environment: &str) {
        self.protected
            .entry(repo.into())
            .or_default()
            .push(environment.into());
    }
}

#[async_trait]
impl ActionsApi for LocalSource {
    async fn get_workflow_yaml(
        &self,
        repo: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>, ApiError> {
        Ok(self.get(repo, path))
    }

    async fn get_action_definition(
        &self,
        repo: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>, ApiError> {
        Ok(action_paths(path)
            .iter()
            .find_map(|candidate| self.get(repo, candidate)))
    }

    async fn get_environment_protection_rules(&self, repo: &str) -> Result<Vec<String>, ApiError> {
        Ok(self.protected.get(repo).cloned().unwrap_or_default())
    }

    async fn get_repository(&self, repo: &str) -> Result<Option<RepositoryInfo>, ApiError> {
        Ok(Some(RepositoryInfo {
            full_name: repo.into(),
            fork: self.forks.contains(repo),
            default_branch: None,
        }))
    }
}

/// Local files first, then an optional remote source.
///
/// Repositories that were collected locally are answered by the local
/// source alone, so that a checkout is never mixed with whatever the
/// remote has at some other ref.
pub(crate) struct Sources<'a> {
    pub(crate) local: &'a LocalSource,
    pub(crate) remote: Option<&'a dyn ActionsApi>,
}

impl Sources<'_> {
    fn pick(&self, repo: &str) -> Option<&dyn ActionsApi> {
        if self.local.contains_repo(repo) {
            Some(self.local as &dyn ActionsApi)
        } else {
            self.remote
        }
    }
}

#[async_trait]
impl ActionsApi for Sources<'_> {
    async fn get_workflow_yaml(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, ApiError> {
        match self.pick(repo) {
            Some(api) => api.get_workflow_yaml(repo, path, git_ref).await,
            None => Ok(None),
        }
    }

    async fn get_action_definition(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, ApiError> {
        match self.pick(repo) {
            Some(api) => api.get_action_definition(repo, path, git_ref).await,
            None => Ok(None),
        }
    }

    async fn get_environment_protection_rules(&self, repo: &str) -> Result<Vec<String>, ApiError> {
        match self.pick(repo) {
            Some(api) => api.get_environment_protection_rules(repo).await,
            None => Ok(vec![]),
        }
    }

    async fn get_repository(&self, repo: &str) -> Result<Option<RepositoryInfo>, ApiError> {
        // Without a remote, everything is treated like a local repository.
        self.pick(repo)
            .unwrap_or(self.local)
            .get_repository(repo)
            .await
    }
}
