//! In-memory caches in front of an [`ActionsApi`].
//!
//! Lookups that fail are logged and treated as absent, and aren't
//! cached, so that a later lookup can try again.

use std::sync::Arc;

use moka::sync::Cache as MokaCache;

use crate::{
    api::{ActionsApi, RepositoryInfo},
    models::Document,
};

/// `(repo, ref, path)`.
type DocumentKey = (String, String, String);

const CAPACITY: u64 = 4096;

pub(crate) struct Cache {
    repos: MokaCache<String, Option<RepositoryInfo>>,
    workflows: MokaCache<DocumentKey, Option<Arc<Document>>>,
    actions: MokaCache<DocumentKey, Option<Arc<Document>>>,
    environments: MokaCache<String, Arc<Vec<String>>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self {
            repos: MokaCache::new(CAPACITY),
            workflows: MokaCache::new(CAPACITY),
            actions: MokaCache::new(CAPACITY),
            environments: MokaCache::new(CAPACITY),
        }
    }

    fn key(repo: &str, git_ref: &str, path: &str) -> DocumentKey {
        (repo.into(), git_ref.into(), path.trim_start_matches("./").into())
    }

    /// Records a workflow that was fetched or read during ingestion.
    pub(crate) fn insert_workflow(&self, doc: Arc<Document>) {
        self.workflows
            .insert(Self::key(&doc.repo, &doc.git_ref, &doc.path), Some(doc));
    }

    pub(crate) async fn repository(
        &self,
        api: &dyn ActionsApi,
        repo: &str,
    ) -> Option<RepositoryInfo> {
        if let Some(info) = self.repos.get(repo) {
            return info;
        }

        match api.get_repository(repo).await {
            Ok(info) => {
                self.repos.insert(repo.into(), info.clone());
                info
            }
            Err(e) => {
                tracing::warn!("couldn't fetch repository metadata for {repo}: {e}");
                None
            }
        }
    }

    /// The repository's environments that require a reviewer's approval.
    pub(crate) async fn protected_environments(
        &self,
        api: &dyn ActionsApi,
        repo: &str,
    ) -> Arc<Vec<String>> {
        if let Some(envs) = self.environments.get(repo) {
            return envs;
        }

        match api.get_environment_protection_rules(repo).await {
            Ok(envs) => {
                let envs = Arc::new(envs);
                self.environments.insert(repo.into(), envs.clone());
                envs
            }
            Err(e) => {
                tracing::warn!("couldn't fetch environments for {repo}: {e}");
                Arc::default()
            }
        }
    }

    pub(crate) async fn workflow(
        &self,
        api: &dyn ActionsApi,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Option<Arc<Document>> {
        let key = Self::key(repo, git_ref, path);
        if let Some(doc) = self.workflows.get(&key) {
            return doc;
        }

        match api.get_workflow_yaml(repo, &key.2, git_ref).await {
            Ok(raw) => {
                let doc = raw.map(|raw| Arc::new(Document::parse(raw, repo, git_ref, &key.2)));
                self.workflows.insert(key, doc.clone());
                doc
            }
            Err(e) => {
                tracing::warn!("couldn't fetch workflow {repo}@{git_ref}:{path}: {e}");
                None
            }
        }
    }

    /// The action definition in `path` (a directory) of `repo`.
    pub(crate) async fn action(
        &self,
        api: &dyn ActionsApi,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Option<Arc<Document>> {
        let key = Self::key(repo, git_ref, path);
        if let Some(doc) = self.actions.get(&key) {
            return doc;
        }

        match api.get_action_definition(repo, &key.2, git_ref).await {
            Ok(raw) => {
                let doc = raw.map(|raw| Arc::new(Document::parse(raw, repo, git_ref, &key.2)));
                self.actions.insert(key, doc.clone());
                doc
            }
            Err(e) => {
                tracing::warn!("couldn't fetch action {repo}@{git_ref}:{path}: {e}");
                None
            }
        }
    }
}
