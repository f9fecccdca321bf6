//! Ingestion of remote repositories into the graph.
//!
//! Repositories are fetched concurrently, but only the loop driving the
//! fetches touches the graph.

use std::{num::NonZeroUsize, sync::Arc};

use anyhow::{Context as _, Result};
use futures::{StreamExt as _, stream};
use indicatif::ProgressStyle;
use owo_colors::OwoColorize;
use tracing::{Instrument as _, Span, info_span, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::{
    cache::Cache,
    classify::Patterns,
    github::Client,
    graph::{TaggedGraph, builder::build_graph_from_yaml},
    input::{LOCAL_REF, RepoSlug},
    models::Document,
};

/// Fetches every workflow in `slug`, at its ref or the repository's
/// default branch.
#[instrument(skip(client, cache), fields(slug = %slug))]
async fn fetch_repo(client: &Client, cache: &Cache, slug: &RepoSlug) -> Result<Vec<Arc<Document>>> {
    let repo = slug.repo_name();

    let git_ref = match &slug.git_ref {
        Some(git_ref) => git_ref.clone(),
        None => cache
            .repository(client, &repo)
            .await
            .and_then(|info| info.default_branch)
            .unwrap_or_else(|| LOCAL_REF.into()),
    };

    let pinned = RepoSlug {
        git_ref: Some(git_ref.clone()),
        ..slug.clone()
    };
    let workflows = client
        .fetch_workflows(&pinned)
        .await
        .with_context(|| format!("couldn't fetch workflows for {pinned}"))?;

    Ok(workflows
        .into_iter()
        .map(|(path, contents)| Arc::new(Document::parse(contents, &repo, &git_ref, path)))
        .collect())
}

/// Fetches `slugs` with at most `concurrency` repositories in flight,
/// graphing each workflow as it arrives.
///
/// Ctrl-C stops the ingestion; whatever was graphed by then stays in
/// `graph`. Returns the number of workflows ingested.
pub(crate) async fn ingest_remote(
    client: &Client,
    slugs: &[RepoSlug],
    concurrency: NonZeroUsize,
    graph: &mut TaggedGraph,
    cache: &Cache,
    patterns: &Patterns,
) -> usize {
    let span = info_span!("ingest");
    span.pb_set_length(slugs.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:!30.cyan/blue} {msg}")
    {
        span.pb_set_style(&style);
    }

    let ingest = async {
        let mut fetches = stream::iter(slugs)
            .map(|slug| async move { (slug, fetch_repo(client, cache, slug).await) })
            .buffer_unordered(concurrency.get());

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut ingested = 0;
        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::warn!("interrupted: analyzing the {ingested} workflows ingested so far");
                    break;
                }
                next = fetches.next() => {
                    let Some((slug, fetched)) = next else {
                        break;
                    };

                    match fetched {
                        Ok(docs) => {
                            for doc in docs {
                                if build_graph_from_yaml(graph, &doc, patterns).is_some() {
                                    ingested += 1;
                                }
                                cache.insert_workflow(doc);
                            }
                            tracing::info!("🌈 {completed} {slug}", completed = "ingested".green());
                        }
                        Err(e) => tracing::warn!("{e:#}"),
                    }

                    Span::current().pb_inc(1);
                }
            }
        }

        ingested
    };

    ingest.instrument(span).await
}
