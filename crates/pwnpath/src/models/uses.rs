//! `uses:` clauses and patterns for matching them.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::Deserialize;

/// Matches `owner/repo[/subpath][@ref]` patterns, where `repo` and
/// `subpath` may be `*`.
static REPOSITORY_USES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r#"(?xi)                    # verbose, case-insensitive
        ^
        ([\w-]+)                    # (1) owner
        /
        ([\w\.-]+|\*)               # (2) repo or *
        (?:/([^@\*\s]+|\*))?        # (3) optional subpath or *
        (?:@([^\*\s]+))?            # (4) optional git ref
        $
        "#,
    )
    .unwrap()
});

#[derive(Debug, thiserror::Error)]
#[error("malformed `uses:` clause: {0}")]
pub(crate) struct UsesError(String);

/// A parsed `uses:` clause.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Uses {
    /// `uses: ./path/to/action` or `uses: ./.github/workflows/foo.yml`.
    Local(String),
    /// `uses: owner/repo[/subpath]@ref`.
    Repository(RepositoryUses),
    /// `uses: docker://image`.
    Docker(String),
}

impl Uses {
    pub(crate) fn parse(uses: &str) -> Result<Self, UsesError> {
        let uses = uses.trim();

        if let Some(path) = uses.strip_prefix("./") {
            Ok(Uses::Local(path.trim_end_matches('/').into()))
        } else if let Some(image) = uses.strip_prefix("docker://") {
            Ok(Uses::Docker(image.into()))
        } else {
            uses.parse().map(Uses::Repository)
        }
    }
}

/// A `uses: owner/repo[/subpath][@ref]` clause.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RepositoryUses {
    pub(crate) owner: String,
    pub(crate) repo: String,
    pub(crate) subpath: Option<String>,
    pub(crate) git_ref: Option<String>,
}

impl RepositoryUses {
    /// Returns the `owner/repo` slug.
    pub(crate) fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Returns whether this clause matches any of the given patterns.
    pub(crate) fn matches_any(&self, patterns: &[RepositoryUsesPattern]) -> bool {
        patterns.iter().any(|p| p.matches(self))
    }
}

impl FromStr for RepositoryUses {
    type Err = UsesError;

    fn from_str(uses: &str) -> Result<Self, Self::Err> {
        // Both refs and paths can contain `@`, but GitHub refuses
        // clauses with more than one.
        let (path, git_ref) = match uses.rsplit_once('@') {
            Some((path, git_ref)) => (path, Some(git_ref.to_string())),
            None => (uses, None),
        };

        let mut components = path.splitn(3, '/');
        match (components.next(), components.next()) {
            (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: owner.into(),
                repo: repo.into(),
                subpath: components
                    .next()
                    .map(|s| s.trim_matches('/').to_string())
                    .filter(|s| !s.is_empty()),
                git_ref,
            }),
            _ => Err(UsesError(uses.into())),
        }
    }
}

impl fmt::Display for RepositoryUses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(subpath) = &self.subpath {
            write!(f, "/{subpath}")?;
        }
        if let Some(git_ref) = &self.git_ref {
            write!(f, "@{git_ref}")?;
        }
        Ok(())
    }
}

/// A pattern for matching repository `uses:` clauses, as used in
/// configuration (`safe-actions`, `permission-check-actions`).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) enum RepositoryUsesPattern {
    /// Matches exactly `owner/repo/subpath@ref`.
    ExactWithRef {
        owner: String,
        repo: String,
        subpath: Option<String>,
        git_ref: String,
    },
    /// Matches exactly `owner/repo/subpath`, at any ref.
    ExactPath {
        owner: String,
        repo: String,
        subpath: String,
    },
    /// Matches exactly `owner/repo`, at any ref.
    ExactRepo { owner: String, repo: String },
    /// Matches `owner/repo/*`, i.e. any subpath including none.
    InRepo { owner: String, repo: String },
    /// Matches `owner/*`.
    InOwner(String),
    /// Matches anything.
    Any,
}

impl RepositoryUsesPattern {
    pub(crate) fn matches(&self, uses: &RepositoryUses) -> bool {
        let same_repo = |owner: &str, repo: &str| {
            uses.owner.eq_ignore_ascii_case(owner) && uses.repo.eq_ignore_ascii_case(repo)
        };

        match self {
            RepositoryUsesPattern::ExactWithRef {
                owner,
                repo,
                subpath,
                git_ref,
            } => {
                same_repo(owner, repo)
                    && uses.subpath == *subpath
                    && uses.git_ref.as_deref() == Some(git_ref.as_str())
            }
            RepositoryUsesPattern::ExactPath {
                owner,
                repo,
                subpath,
            } => same_repo(owner, repo) && uses.subpath.as_deref() == Some(subpath.as_str()),
            RepositoryUsesPattern::ExactRepo { owner, repo } => {
                same_repo(owner, repo) && uses.subpath.is_none()
            }
            RepositoryUsesPattern::InRepo { owner, repo } => same_repo(owner, repo),
            RepositoryUsesPattern::InOwner(owner) => uses.owner.eq_ignore_ascii_case(owner),
            RepositoryUsesPattern::Any => true,
        }
    }
}

impl FromStr for RepositoryUsesPattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(RepositoryUsesPattern::Any);
        }

        let caps = REPOSITORY_USES_PATTERN
            .captures(s)
            .ok_or_else(|| anyhow::anyhow!("invalid pattern: {s}"))?;

        let owner = caps[1].to_string();
        let repo = caps[2].to_string();
        let subpath = caps.get(3).map(|m| m.as_str());
        let git_ref = caps.get(4).map(|m| m.as_str().to_string());

        match (repo.as_str(), subpath, git_ref) {
            ("*", None, None) => Ok(RepositoryUsesPattern::InOwner(owner)),
            ("*", _, _) => Err(anyhow::anyhow!("invalid pattern: {s}")),
            (_, None, None) => Ok(RepositoryUsesPattern::ExactRepo { owner, repo }),
            (_, Some("*"), None) => Ok(RepositoryUsesPattern::InRepo { owner, repo }),
            (_, Some("*"), Some(_)) => Err(anyhow::anyhow!("invalid pattern: {s}")),
            (_, Some(subpath), None) => Ok(RepositoryUsesPattern::ExactPath {
                owner,
                repo,
                subpath: subpath.into(),
            }),
            (_, subpath, Some(git_ref)) => Ok(RepositoryUsesPattern::ExactWithRef {
                owner,
                repo,
                subpath: subpath.map(Into::into),
                git_ref,
            }),
        }
    }
}

impl<'de> Deserialize<'de> for RepositoryUsesPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RepositoryUsesPattern::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::{RepositoryUses, RepositoryUsesPattern, Uses};

    #[test]
    fn test_uses_parse() {
        assert_eq!(
            Uses::parse("./.github/actions/setup").unwrap(),
            Uses::Local(".github/actions/setup".into())
        );
        assert_eq!(
            Uses::parse("docker://alpine:3").unwrap(),
            Uses::Docker("alpine:3".into())
        );
        assert_eq!(
            Uses::parse("acme/tools/.github/workflows/build.yml@main").unwrap(),
            Uses::Repository(RepositoryUses {
                owner: "acme".into(),
                repo: "tools".into(),
                subpath: Some(".github/workflows/build.yml".into()),
                git_ref: Some("main".into()),
            })
        );
        assert_eq!(
            Uses::parse("actions/checkout@v4").unwrap(),
            Uses::Repository(RepositoryUses {
                owner: "actions".into(),
                repo: "checkout".into(),
                subpath: None,
                git_ref: Some("v4".into()),
            })
        );
        assert!(Uses::parse("checkout@v4").is_err());
        assert!(Uses::parse("/checkout@v4").is_err());
    }

    #[test]
    fn test_repositoryusespattern_parse() {
        for (pattern, expected) in [
            ("", None),
            ("owner", None),
            ("**", None),
            ("*", Some(RepositoryUsesPattern::Any)),
            ("owner/*", Some(RepositoryUsesPattern::InOwner("owner".into()))),
            ("owner/*/foo", None),
            (
                "owner/repo/*",
                Some(RepositoryUsesPattern::InRepo {
                    owner: "owner".into(),
                    repo: "repo".into(),
                }),
            ),
            (
                "owner/repo",
                Some(RepositoryUsesPattern::ExactRepo {
                    owner: "owner".into(),
                    repo: "repo".into(),
                }),
            ),
            (
                "owner/repo/sub/path",
                Some(RepositoryUsesPattern::ExactPath {
                    owner: "owner".into(),
                    repo: "repo".into(),
                    subpath: "sub/path".into(),
                }),
            ),
            (
                "owner/repo@v1",
                Some(RepositoryUsesPattern::ExactWithRef {
                    owner: "owner".into(),
                    repo: "repo".into(),
                    subpath: None,
                    git_ref: "v1".into(),
                }),
            ),
            ("owner/repo/*@v1", None),
        ] {
            assert_eq!(RepositoryUsesPattern::from_str(pattern).ok(), expected, "{pattern}");
        }
    }

    #[test]
    fn test_repositoryusespattern_matches() {
        for (uses, pattern, matches) in [
            ("actions/checkout@v4", "actions/*", true),
            ("Actions/Checkout@v4", "actions/checkout", true),
            ("actions/checkout@v4", "actions/checkout@v4", true),
            ("actions/checkout@v3", "actions/checkout@v4", false),
            ("github/codeql-action/init@v3", "github/codeql-action", false),
            ("github/codeql-action/init@v3", "github/codeql-action/*", true),
            ("github/codeql-action/init@v3", "github/codeql-action/init", true),
            ("acme/tools@main", "*", true),
            ("acme/tools@main", "other/*", false),
        ] {
            let uses = RepositoryUses::from_str(uses).unwrap();
            let pattern = RepositoryUsesPattern::from_str(pattern).unwrap();
            assert_eq!(pattern.matches(&uses), matches, "{uses} / {pattern:?}");
        }
    }
}
