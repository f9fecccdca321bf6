#![warn(clippy::all, clippy::dbg_macro)]

use std::{
    io::{Write, stdout},
    process::ExitCode,
    sync::Arc,
};

use annotate_snippets::{Group, Level, Renderer};
use anstream::{eprintln, stream::IsTerminal};
use anyhow::{Result, anyhow, bail};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::InfoLevel;
use owo_colors::OwoColorize;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::{
    api::{ActionsApi, Sources},
    cache::Cache,
    classify::Patterns,
    config::Config,
    github::{Client, GitHubHost, GitHubToken},
    graph::{TaggedGraph, builder::build_graph_from_yaml},
    visitor::Context,
};

mod api;
mod cache;
mod classify;
mod config;
mod finding;
mod github;
mod graph;
mod ingest;
mod input;
mod models;
mod output;
mod utils;
mod visitor;

/// Finds injection and pwn-request paths in GitHub Actions workflows.
#[derive(Parser)]
#[command(about, version)]
struct App {
    /// Perform only offline operations.
    ///
    /// Remote repositories can't be audited, and references to other
    /// repositories are left unresolved.
    #[arg(short, long, env = "PWNPATH_OFFLINE")]
    offline: bool,

    /// The GitHub API token to use.
    #[arg(long, env, hide_env_values = true, value_parser = GitHubToken::new)]
    gh_token: Option<GitHubToken>,

    /// The GitHub Server Hostname. Defaults to github.com
    #[arg(long, env = "GH_HOST", default_value = "github.com", value_parser = GitHubHost::new)]
    gh_hostname: GitHubHost,

    /// The repository name local inputs belong to.
    ///
    /// Defaults to `local/<directory name>`.
    #[arg(long, value_name = "OWNER/REPO")]
    repo_name: Option<String>,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<InfoLevel>,

    /// Don't show progress bars, even if the terminal supports them.
    #[arg(long)]
    no_progress: bool,

    /// The output format to emit. By default, cargo-style diagnostics will be emitted.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Control the use of color in output.
    #[arg(long, value_enum, value_name = "MODE")]
    color: Option<ColorMode>,

    /// The configuration file to load. By default, any config will be
    /// discovered relative to $CWD.
    #[arg(short, long, env = "PWNPATH_CONFIG", group = "conf")]
    config: Option<Utf8PathBuf>,

    /// Disable all configuration loading.
    #[arg(long, group = "conf")]
    no_config: bool,

    /// Disable all error codes besides success and tool failure.
    #[arg(long)]
    no_exit_codes: bool,

    /// The inputs to audit.
    ///
    /// These can be individual workflow filenames, entire directories,
    /// or a `user/repo` slug for a GitHub repository. In the latter case,
    /// a `@ref` can be appended to audit the repository at a particular
    /// git reference state.
    #[arg(required = true)]
    inputs: Vec<String>,
}

#[derive(Debug, Default, Copy, Clone, ValueEnum)]
pub(crate) enum OutputFormat {
    /// cargo-style output.
    #[default]
    Plain,
    /// JSON-formatted output, grouped by repository.
    Json,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub(crate) enum ColorMode {
    /// Use color output if the output supports it.
    Auto,
    /// Force color output, even if the output isn't a terminal.
    Always,
    /// Disable color output, even if the output is a compatible terminal.
    Never,
}

impl ColorMode {
    /// Returns a concrete (i.e. non-auto) `anstream::ColorChoice` for the given terminal.
    ///
    /// This is useful for passing to `anstream::AutoStream` when the underlying
    /// stream is something that is a terminal or should be treated as such,
    /// but can't be inferred due to type erasure (e.g. `Box<dyn Write>`).
    fn color_choice_for_terminal(&self, io: impl IsTerminal) -> anstream::ColorChoice {
        match self {
            ColorMode::Auto => {
                if io.is_terminal() {
                    anstream::ColorChoice::Always
                } else {
                    anstream::ColorChoice::Never
                }
            }
            ColorMode::Always => anstream::ColorChoice::Always,
            ColorMode::Never => anstream::ColorChoice::Never,
        }
    }
}

impl From<ColorMode> for anstream::ColorChoice {
    fn from(value: ColorMode) -> Self {
        match value {
            ColorMode::Auto => Self::Auto,
            ColorMode::Always => Self::Always,
            ColorMode::Never => Self::Never,
        }
    }
}

/// Exit code for a run that produced findings.
const FINDINGS_EXIT: u8 = 14;

pub(crate) fn tips(err: impl AsRef<str>, tips: &[impl AsRef<str>]) -> String {
    let group = tips.iter().fold(
        Group::with_title(Level::ERROR.primary_title(err.as_ref())),
        |group, tip| group.element(Level::NOTE.message(tip.as_ref())),
    );

    let renderer = Renderer::styled();
    renderer.render(&[group])
}

#[tokio::main]
async fn run() -> Result<ExitCode> {
    human_panic::setup_panic!();

    let mut app = App::parse();

    let color_mode = match app.color {
        Some(color_mode) => color_mode,
        None => {
            // If `--color` wasn't specified, we first check a handful
            // of common environment variables, and then fall
            // back to `anstream`'s auto detection.
            if std::env::var("NO_COLOR").is_ok() {
                ColorMode::Never
            } else if std::env::var("FORCE_COLOR").is_ok()
                || std::env::var("CLICOLOR_FORCE").is_ok()
            {
                ColorMode::Always
            } else {
                ColorMode::Auto
            }
        }
    };

    anstream::ColorChoice::write_global(color_mode.into());

    // `anstream` strips the escapes `tracing_indicatif` needs for line
    // control, so there are no progress bars without color.
    if matches!(color_mode, ColorMode::Never) {
        app.no_progress = true;
    }

    // Unset the GitHub token if we're in offline mode, so that `GH_TOKEN`
    // can stay in the environment.
    if app.offline {
        app.gh_token = None;
    }

    let indicatif_layer = IndicatifLayer::new();

    let writer = std::sync::Mutex::new(anstream::AutoStream::new(
        Box::new(indicatif_layer.get_stderr_writer()) as Box<dyn Write + Send>,
        color_mode.color_choice_for_terminal(std::io::stderr()),
    ));

    let filter = EnvFilter::builder()
        .with_default_directive(app.verbose.tracing_level_filter().into())
        .from_env()?;

    let reg = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(writer),
        )
        .with(filter);

    if app.no_progress {
        reg.init();
    } else {
        reg.with(indicatif_layer).init();
    }

    let config = Config::global(&app).map_err(|e| {
        anyhow!(tips(
            format!("failed to load config: {e:#}"),
            &[
                "check your configuration file for errors",
                "pass --no-config to ignore it",
            ]
        ))
    })?;
    let patterns = Patterns::from_config(&config);

    let inputs = input::collect_inputs(&app.inputs, app.repo_name.as_deref())?;

    let client = match &app.gh_token {
        Some(token) => Some(Client::new(&app.gh_hostname, token)?),
        None => None,
    };

    if !inputs.remote.is_empty() && client.is_none() {
        let slugs = inputs.remote.iter().map(ToString::to_string).collect::<Vec<_>>();
        bail!(tips(
            format!("can't audit {} without GitHub access", slugs.join(", ")),
            if app.offline {
                &["remove --offline to audit remote repositories"]
            } else {
                &["pass --gh-token or set GH_TOKEN"]
            }
        ));
    }

    let cache = Cache::new();
    let mut graph = TaggedGraph::new();

    for doc in inputs.workflows {
        let doc = Arc::new(doc);
        build_graph_from_yaml(&mut graph, &doc, &patterns);
        cache.insert_workflow(doc);
    }

    if let Some(client) = &client
        && !inputs.remote.is_empty()
    {
        let ingested = ingest::ingest_remote(
            client,
            &inputs.remote,
            config.concurrency,
            &mut graph,
            &cache,
            &patterns,
        )
        .await;
        tracing::debug!("ingested {ingested} remote workflows");
    }

    let sources = Sources {
        local: &inputs.source,
        remote: client.as_ref().map(|client| client as &dyn ActionsApi),
    };
    let ctx = Context {
        api: &sources,
        cache: &cache,
        patterns: &patterns,
    };

    tracing::debug!(
        "auditing {nodes} nodes and {edges} edges",
        nodes = graph.node_count(),
        edges = graph.edge_count()
    );
    let findings = visitor::audit(&mut graph, &ctx).await;

    match app.format {
        OutputFormat::Plain => output::plain::render_findings(&findings),
        OutputFormat::Json => output::json::output(stdout(), &findings)?,
    }

    if app.no_exit_codes || findings.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(FINDINGS_EXIT))
    }
}

fn main() -> ExitCode {
    // This is a little silly, but returning an ExitCode like this ensures
    // we always exit cleanly, rather than performing a hard process exit.
    match run() {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!(
                "{fatal}: no audit was performed",
                fatal = "fatal".red().bold()
            );
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
