//! GitHub REST API client and related types.

use std::{fmt::Display, str::FromStr};

use async_trait::async_trait;
use reqwest::{
    StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue},
    retry,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::{
    api::{ActionsApi, ApiError, RepositoryInfo, action_paths},
    input::RepoSlug,
    utils::{PWNPATH_AGENT, PipeSelf},
};

/// Represents different types of GitHub hosts.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GitHubHost {
    Enterprise(String),
    Standard(String),
}

impl GitHubHost {
    pub(crate) fn new(hostname: &str) -> Result<Self, String> {
        let normalized = hostname.to_lowercase();

        // NOTE: This only catches the most likely kind of confusion,
        // i.e. supplying a URL instead of a bare domain name.
        if normalized.starts_with("https://") || normalized.starts_with("http://") {
            return Err("must be a domain name, not a URL".into());
        }

        if normalized.eq_ignore_ascii_case("github.com") || normalized.ends_with(".ghe.com") {
            Ok(Self::Standard(hostname.into()))
        } else {
            Ok(Self::Enterprise(hostname.into()))
        }
    }

    fn to_api_host(&self) -> String {
        match self {
            Self::Enterprise(host) => host.clone(),
            Self::Standard(host) => format!("api.{host}"),
        }
    }

    fn to_api_url(&self) -> String {
        match self {
            Self::Enterprise(_) => format!("https://{host}/api/v3", host = self.to_api_host()),
            Self::Standard(_) => format!("https://{host}", host = self.to_api_host()),
        }
    }
}

impl Default for GitHubHost {
    fn default() -> Self {
        Self::Standard("github.com".into())
    }
}

impl Display for GitHubHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enterprise(host) => write!(f, "{host}"),
            Self::Standard(host) => write!(f, "{host}"),
        }
    }
}

impl FromStr for GitHubHost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A sanitized GitHub access token.
#[derive(Clone)]
pub(crate) struct GitHubToken(String);

impl GitHubToken {
    pub(crate) fn new(token: &str) -> Result<Self, String> {
        let token = token.trim();
        if token.is_empty() {
            return Err("GitHub token cannot be empty".into());
        }
        Ok(Self(token.to_owned()))
    }

    fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", self.0))
    }
}

impl FromStr for GitHubToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur while using the GitHub API client.
#[derive(Debug, Error)]
pub(crate) enum ClientError {
    /// An error originating from the underlying HTTP client.
    #[error("request error while accessing GitHub API")]
    Request(#[from] reqwest::Error),
    /// We couldn't turn the user's token into a valid header value.
    #[error("invalid token header")]
    InvalidTokenHeader(#[from] InvalidHeaderValue),
    /// We couldn't fetch a single file because it disappeared
    /// between listing and fetching it.
    #[error("couldn't fetch file {file} from {slug}: is the branch/tag being modified?")]
    FileTOCTOU { file: String, slug: String },
}

#[derive(Clone)]
pub(crate) struct Client {
    api_base: String,
    api_client: reqwest::Client,
}

impl Client {
    pub(crate) fn new(host: &GitHubHost, token: &GitHubToken) -> Result<Self, ClientError> {
        Self::with_api_base(host.to_api_url(), host.to_api_host(), token)
    }

    pub(crate) fn with_api_base(
        api_base: String,
        api_host: String,
        token: &GitHubToken,
    ) -> Result<Self, ClientError> {
        let mut api_client_headers = HeaderMap::new();
        api_client_headers.insert(AUTHORIZATION, token.to_header_value()?);
        api_client_headers.insert("X-GitHub-Api-Version", "2022-11-28".parse()?);
        api_client_headers.insert(ACCEPT, "application/vnd.github+json".parse()?);

        let api_client = reqwest::Client::builder()
            .user_agent(PWNPATH_AGENT)
            .default_headers(api_client_headers)
            .retry(
                retry::for_host(api_host)
                    .max_retries_per_request(3)
                    .no_budget()
                    .classify_fn(|req_rep| match req_rep.status() {
                        // NOTE: We only send GETs, so retries are always safe.
                        // In the retry classifier, "success" means "don't retry".
                        Some(status)
                            if status.is_server_error()
                                || status == StatusCode::TOO_MANY_REQUESTS
                                || status == StatusCode::FORBIDDEN =>
                        {
                            req_rep.retryable()
                        }
                        _ => req_rep.success(),
                    }),
            )
            .build()?;

        Ok(Self {
            api_base,
            api_client,
        })
    }

    /// GETs `url` and decodes its JSON body, or returns `None` on a 404.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ClientError> {
        let resp = self.api_client.get(url).send().await?;

        match resp.error_for_status() {
            Ok(resp) => Ok(Some(resp.json().await?)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a single file from the given repository.
    ///
    /// Returns the file contents as a `String` if the file exists,
    /// or `None` if the request produces a 404.
    #[instrument(skip(self))]
    pub(crate) async fn fetch_single_file(
        &self,
        repo: &str,
        file: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>, ClientError> {
        tracing::debug!("fetching {file} from {repo}");

        let url = format!(
            "{api_base}/repos/{repo}/contents/{file}",
            api_base = self.api_base,
            file = file.trim_start_matches("./"),
        );

        let resp = self
            .api_client
            .get(&url)
            .header(ACCEPT, "application/vnd.github.raw+json")
            .pipe(|req| match git_ref {
                Some(g) => req.query(&[("ref", g)]),
                None => req,
            })
            .send()
            .await?;

        match resp.error_for_status() {
            Ok(resp) => Ok(Some(resp.text().await?)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub(crate) async fn repository(&self, repo: &str) -> Result<Option<RepositoryInfo>, ClientError> {
        let url = format!("{api_base}/repos/{repo}", api_base = self.api_base);
        self.get_json(&url).await
    }

    /// Returns the names of the repository's environments that have a
    /// `required_reviewers` protection rule.
    #[instrument(skip(self))]
    pub(crate) async fn protected_environments(&self, repo: &str) -> Result<Vec<String>, ClientError> {
        // TODO: Follow `Link` headers past the first page of environments.
        let url = format!("{api_base}/repos/{repo}/environments", api_base = self.api_base);

        let environments: Option<Environments> = self.get_json(&url).await?;

        Ok(environments
            .map(|envs| envs.environments)
            .unwrap_or_default()
            .into_iter()
            .filter(|env| {
                env.protection_rules
                    .iter()
                    .any(|rule| rule.kind == "required_reviewers")
            })
            .map(|env| env.name)
            .collect())
    }

    /// Collect all workflows defined in the given repository slug, as
    /// `(path, contents)` pairs.
    ///
    /// A repository without a `.github/workflows` directory has no
    /// workflows.
    #[instrument(skip(self), fields(slug = %slug))]
    pub(crate) async fn fetch_workflows(
        &self,
        slug: &RepoSlug,
    ) -> Result<Vec<(String, String)>, ClientError> {
        let repo = slug.repo_name();
        let git_ref = slug.git_ref.as_deref();

        tracing::debug!("fetching workflows for {slug}");

        // The contents API doesn't return file contents with a directory
        // listing, so this is `N+1` calls: one to list the workflows
        // directory, and `N` for the constituent workflow files.
        let url = format!(
            "{api_base}/repos/{repo}/contents/.github/workflows",
            api_base = self.api_base
        );
        let resp = self
            .api_client
            .get(&url)
            .pipe(|req| match git_ref {
                Some(g) => req.query(&[("ref", g)]),
                None => req,
            })
            .send()
            .await?;

        let files: Vec<File> = match resp.error_for_status() {
            Ok(resp) => resp.json().await?,
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                tracing::warn!("{slug} has no workflows");
                return Ok(vec![]);
            }
            Err(e) => return Err(e.into()),
        };

        let mut workflows = vec![];
        for file in files
            .into_iter()
            .filter(|file| file.name.ends_with(".yml") || file.name.ends_with(".yaml"))
        {
            let Some(contents) = self.fetch_single_file(&repo, &file.path, git_ref).await? else {
                // Only possible if the file was deleted between the
                // listing and this fetch.
                return Err(ClientError::FileTOCTOU {
                    file: file.path,
                    slug: slug.to_string(),
                });
            };

            workflows.push((file.path, contents));
        }

        Ok(workflows)
    }
}

fn check_repo(repo: &str) -> Result<(), ApiError> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(ApiError::BadRepo(repo.into())),
    }
}

#[async_trait]
impl ActionsApi for Client {
    async fn get_workflow_yaml(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, ApiError> {
        check_repo(repo)?;
        Ok(self.fetch_single_file(repo, path, Some(git_ref)).await?)
    }

    async fn get_action_definition(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, ApiError> {
        check_repo(repo)?;
        for candidate in action_paths(path) {
            if let Some(contents) = self.fetch_single_file(repo, &candidate, Some(git_ref)).await? {
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }

    async fn get_environment_protection_rules(&self, repo: &str) -> Result<Vec<String>, ApiError> {
        check_repo(repo)?;
        Ok(self.protected_environments(repo).await?)
    }

    async fn get_repository(&self, repo: &str) -> Result<Option<RepositoryInfo>, ApiError> {
        check_repo(repo)?;
        Ok(self.repository(repo).await?)
    }
}

/// Represents a file listing from GitHub's contents API.
#[derive(Deserialize)]
struct File {
    name: String,
    path: String,
}

/// The response from GitHub's environments API.
///
/// This model is intentionally incomplete.
///
/// See <https://docs.github.com/en/rest/deployments/environments?apiVersion=2022-11-28>.
#[derive(Deserialize)]
struct Environments {
    environments: Vec<Environment>,
}

#[derive(Deserialize)]
struct Environment {
    name: String,
    #[serde(default)]
    protection_rules: Vec<ProtectionRule>,
}

#[derive(Deserialize)]
struct ProtectionRule {
    #[serde(rename = "type")]
    kind: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::{Client, GitHubHost, GitHubToken};
    use crate::api::ActionsApi;

    async fn client(server: &MockServer) -> Client {
        let token = GitHubToken::new("gho_testtest").unwrap();
        Client::with_api_base(server.uri(), "127.0.0.1".into(), &token).unwrap()
    }

    #[test]
    fn test_github_host() {
        for (host, expected) in [
            ("github.com", "https://api.github.com"),
            ("something.ghe.com", "https://api.something.ghe.com"),
            (
                "selfhosted.example.com",
                "https://selfhosted.example.com/api/v3",
            ),
        ] {
            assert_eq!(GitHubHost::new(host).unwrap().to_api_url(), expected);
        }

        assert!(GitHubHost::new("https://github.com").is_err());
    }

    #[test]
    fn test_github_token() {
        for (token, expected) in [
            ("gha_testtest\n", "gha_testtest"),
            ("  gha_testtest  ", "gha_testtest"),
            ("gho_testtest", "gho_testtest"),
        ] {
            assert_eq!(GitHubToken::new(token).unwrap().0, expected);
        }

        for token in ["", " ", "\r", "\n", "\t"] {
            assert!(GitHubToken::new(token).is_err());
        }
    }

    #[tokio::test]
    async fn test_get_workflow_yaml() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/.github/workflows/ci.yml"))
            .and(query_param("ref", "main"))
            .and(header("authorization", "Bearer gho_testtest"))
            .and(header("x-github-api-version", "2022-11-28"))
            .respond_with(ResponseTemplate::new(200).set_body_string("on: push\n"))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(
            client
                .get_workflow_yaml("acme/widgets", ".github/workflows/ci.yml", "main")
                .await?
                .as_deref(),
            Some("on: push\n")
        );
        assert_eq!(
            client
                .get_workflow_yaml("acme/widgets", ".github/workflows/missing.yml", "main")
                .await?,
            None
        );
        assert!(
            client
                .get_workflow_yaml("not-a-repo", "ci.yml", "main")
                .await
                .is_err()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_get_action_definition_falls_back_to_yaml() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/actions/contents/setup/action.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("runs: {}\n"))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(
            client
                .get_action_definition("acme/actions", "setup", "v1")
                .await?
                .as_deref(),
            Some("runs: {}\n")
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_get_repository() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/someone/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "someone/widgets",
                "fork": true,
                "default_branch": "trunk",
                "stargazers_count": 3,
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let repo = client.get_repository("someone/widgets").await?.unwrap();
        assert!(repo.fork);
        assert_eq!(repo.default_branch.as_deref(), Some("trunk"));

        assert_eq!(client.get_repository("someone/missing").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_get_environment_protection_rules() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/environments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 3,
                "environments": [
                    {
                        "name": "production",
                        "protection_rules": [
                            { "id": 1, "type": "wait_timer", "wait_timer": 30 },
                            { "id": 2, "type": "required_reviewers", "reviewers": [] },
                        ],
                    },
                    {
                        "name": "staging",
                        "protection_rules": [{ "id": 3, "type": "branch_policy" }],
                    },
                    { "name": "preview" },
                ],
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(
            client
                .get_environment_protection_rules("acme/widgets")
                .await?,
            vec!["production"]
        );
        assert!(
            client
                .get_environment_protection_rules("acme/empty")
                .await?
                .is_empty()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_workflows() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/.github/workflows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "ci.yml", "path": ".github/workflows/ci.yml" },
                { "name": "README.md", "path": ".github/workflows/README.md" },
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/.github/workflows/ci.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("on: push\n"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server).await;
        let workflows = client.fetch_workflows(&"acme/widgets".parse()?).await?;
        assert_eq!(
            workflows,
            vec![(".github/workflows/ci.yml".to_string(), "on: push\n".to_string())]
        );

        // No workflows directory means no workflows.
        assert!(client.fetch_workflows(&"acme/empty".parse()?).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_server_errors_surface() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert!(client.get_repository("acme/widgets").await.is_err());

        Ok(())
    }
}
