use std::{fs, num::NonZeroUsize};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use crate::{App, models::RepositoryUsesPattern};

const CONFIG_CANDIDATES: &[&str] = &[
    ".github/pwnpath.yml",
    ".github/pwnpath.yaml",
    "pwnpath.yml",
    "pwnpath.yaml",
];

#[derive(Error, Debug)]
#[error("configuration error in {path}")]
pub(crate) struct ConfigError {
    /// The path to the configuration file that caused this error.
    path: String,
    /// The source of this error.
    pub(crate) source: ConfigErrorInner,
}

#[derive(Error, Debug)]
pub(crate) enum ConfigErrorInner {
    /// An I/O error occurred while loading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is syntactically invalid.
    #[error("invalid configuration syntax")]
    Syntax(#[source] serde_yaml::Error),
}

fn default_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN)
}

/// The on-disk configuration format.
///
/// Every pattern table extends, rather than replaces, the built-in defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) sink_patterns: Vec<String>,
    #[serde(default)]
    pub(crate) sink_prefixes: Vec<String>,
    #[serde(default)]
    pub(crate) permission_check_patterns: Vec<String>,
    #[serde(default)]
    pub(crate) permission_check_actions: Vec<RepositoryUsesPattern>,
    #[serde(default)]
    pub(crate) safe_actions: Vec<RepositoryUsesPattern>,
    /// The number of repositories ingested concurrently.
    #[serde(default = "default_concurrency")]
    pub(crate) concurrency: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sink_patterns: vec![],
            sink_prefixes: vec![],
            permission_check_patterns: vec![],
            permission_check_actions: vec![],
            safe_actions: vec![],
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    /// Loads a [`Config`] from the given contents.
    fn load(contents: &str) -> Result<Self, ConfigErrorInner> {
        // An empty file is a valid (empty) configuration.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(contents).map_err(ConfigErrorInner::Syntax)
    }

    fn load_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        tracing::debug!("loading config from `{path}`");

        fs::read_to_string(path)
            .map_err(ConfigErrorInner::Io)
            .and_then(|contents| Self::load(&contents))
            .map_err(|source| ConfigError {
                path: path.to_string(),
                source,
            })
    }

    /// Discover a [`Config`] in the given directory, trying each
    /// candidate filename in order.
    fn discover_in_dir(dir: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        for candidate in CONFIG_CANDIDATES {
            let candidate_path = dir.join(candidate);
            if candidate_path.is_file() {
                tracing::debug!("found config candidate at `{candidate_path}`");
                return Self::load_path(&candidate_path).map(Some);
            }
        }

        Ok(None)
    }

    /// Loads the [`Config`] for the given [`App`].
    ///
    /// This function models pwnpath's precedence rules for
    /// configuration discovery:
    /// 1. `--no-config` disables all config loading.
    /// 2. `--config <file>` (or `PWNPATH_CONFIG`) uses the given file.
    /// 3. Otherwise, the working directory is searched for a candidate.
    pub(crate) fn global(app: &App) -> Result<Self, ConfigError> {
        if app.no_config {
            tracing::debug!("skipping config discovery: explicitly disabled");
            Ok(Self::default())
        } else if let Some(path) = &app.config {
            Self::load_path(path)
        } else {
            let cwd = std::env::current_dir()
                .map_err(ConfigErrorInner::Io)
                .and_then(|cwd| {
                    Utf8PathBuf::try_from(cwd).map_err(|e| ConfigErrorInner::Io(e.into_io_error()))
                })
                .map_err(|source| ConfigError {
                    path: ".".into(),
                    source,
                })?;

            Self::discover_in_dir(&cwd).map(Option::unwrap_or_default)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use camino::Utf8Path;
    use pretty_assertions::assert_eq;

    use super::{Config, ConfigErrorInner};

    #[test]
    fn test_load_empty() -> anyhow::Result<()> {
        assert_eq!(Config::load("")?, Config::default());
        assert_eq!(Config::load("{}")?, Config::default());
        assert_eq!(Config::default().concurrency.get(), 8);
        Ok(())
    }

    #[test]
    fn test_load_full() -> anyhow::Result<()> {
        let config = Config::load(
            r#"
sink-patterns: ["just "]
sink-prefixes: ["./ci/"]
permission-check-patterns: [isTrustedActor]
permission-check-actions: [acme/check-actor]
safe-actions: ["acme/*"]
concurrency: 2
"#,
        )?;

        assert_eq!(config.sink_patterns, vec!["just "]);
        assert_eq!(config.sink_prefixes, vec!["./ci/"]);
        assert_eq!(config.permission_check_patterns, vec!["isTrustedActor"]);
        assert_eq!(config.permission_check_actions, vec!["acme/check-actor".parse()?]);
        assert_eq!(config.safe_actions, vec!["acme/*".parse()?]);
        assert_eq!(config.concurrency, NonZeroUsize::new(2).unwrap());

        Ok(())
    }

    #[test]
    fn test_load_invalid() {
        for raw in [
            "unknown-key: true",
            "concurrency: 0",
            "safe-actions: [not-a-pattern]",
            "sink-patterns: {}",
        ] {
            assert!(
                matches!(Config::load(raw), Err(ConfigErrorInner::Syntax(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_discover_in_dir() -> anyhow::Result<()> {
        let dir =
            Utf8Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/integration/test-data/config");
        let config = Config::discover_in_dir(&dir)?.expect("missing config");
        assert_eq!(config.sink_patterns, vec!["just "]);

        let empty = Utf8Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        assert_eq!(Config::discover_in_dir(&empty)?, None);

        Ok(())
    }
}
