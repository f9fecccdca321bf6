//! The attacker's view of the `github` context.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};

use crate::{Evaluation, FlexibleAction, Wildcard};

/// Events an external attacker can cause a workflow to run on.
const EVENT_NAMES: &[&str] = &[
    "pull_request_target",
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
    "issue_comment",
    "issues",
    "discussion",
    "discussion_comment",
    "workflow_run",
    "fork",
    "watch",
];

const EVENT_ACTIONS: &[&str] = &[
    "opened",
    "edited",
    "created",
    "reopened",
    "synchronize",
    "labeled",
    "unlabeled",
    "submitted",
    "requested",
    "completed",
    "closed",
];

/// Associations an outsider can hold.
const AUTHOR_ASSOCIATIONS: &[&str] = &["NONE", "CONTRIBUTOR", "FIRST_TIME_CONTRIBUTOR", "FIRST_TIMER"];

/// Upstream events an attacker can use to kick off a `workflow_run`.
const WORKFLOW_RUN_EVENTS: &[&str] = &[
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
    "issue_comment",
    "issues",
];

const WORKFLOW_RUN_CONCLUSIONS: &[&str] = &["success", "failure"];

/// Logins that resolve to the attacker themselves.
const ACTOR_CONTEXTS: &[&str] = &[
    "github.actor",
    "github.triggering_actor",
    "github.event.sender.login",
    "github.event.pull_request.user.login",
    "github.event.pull_request.head.user.login",
    "github.event.issue.user.login",
    "github.event.comment.user.login",
    "github.event.review.user.login",
    "github.event.discussion.user.login",
    "github.event.workflow_run.actor.login",
    "github.event.workflow_run.triggering_actor.login",
];

const ASSOCIATION_CONTEXTS: &[&str] = &[
    "github.event.comment.author_association",
    "github.event.issue.author_association",
    "github.event.pull_request.author_association",
    "github.event.review.author_association",
    "github.event.discussion.author_association",
];

/// Free-form fields the attacker writes directly.
const FREEFORM_CONTEXTS: &[&str] = &[
    "github.head_ref",
    "github.event.comment.body",
    "github.event.issue.title",
    "github.event.issue.body",
    "github.event.issue.pull_request",
    "github.event.pull_request.title",
    "github.event.pull_request.body",
    "github.event.pull_request.head.ref",
    "github.event.pull_request.head.label",
    "github.event.review.body",
    "github.event.review_comment.body",
    "github.event.discussion.title",
    "github.event.discussion.body",
    "github.event.head_commit.message",
    "github.event.workflow_run.head_branch",
    "github.event.workflow_run.display_title",
    "github.event.label.name",
];

/// A set of bindings from lowercased `github.*` contexts to values.
///
/// Lookups are case-insensitive. Contexts without a binding are left to
/// the evaluator, which treats them as attacker-controlled.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Evaluation>,
}

impl Environment {
    /// An environment with no bindings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The environment an external attacker controls: a pull request or
    /// comment from a fork, by a user with no association to the
    /// repository.
    pub fn attacker() -> Self {
        let mut env = Self::empty();

        // The attacker's login is unpredictable but consistent everywhere.
        let login = format!("{:016x}", RandomState::new().hash_one("attacker"));
        for ctx in ACTOR_CONTEXTS {
            env.bind(ctx, Evaluation::String(login.clone()));
        }

        for ctx in ASSOCIATION_CONTEXTS {
            env.bind(
                ctx,
                Evaluation::Flexible(FlexibleAction::strings(AUTHOR_ASSOCIATIONS)),
            );
        }

        for ctx in FREEFORM_CONTEXTS {
            env.bind(ctx, Evaluation::Wildcard(Wildcard::new(*ctx)));
        }

        for ctx in [
            "github.event.pull_request.head.repo.fork",
            "github.event.workflow_run.head_repository.fork",
        ] {
            env.bind(ctx, Evaluation::Boolean(true));
        }

        env.bind(
            "github.event_name",
            Evaluation::Flexible(FlexibleAction::strings(EVENT_NAMES)),
        );
        env.bind(
            "github.event.action",
            Evaluation::Flexible(FlexibleAction::strings(EVENT_ACTIONS)),
        );
        env.bind(
            "github.event.workflow_run.event",
            Evaluation::Flexible(FlexibleAction::strings(WORKFLOW_RUN_EVENTS)),
        );
        env.bind(
            "github.event.workflow_run.conclusion",
            Evaluation::Flexible(FlexibleAction::strings(WORKFLOW_RUN_CONCLUSIONS)),
        );

        for ctx in [
            "github.event.pull_request.merged",
            "github.event.pull_request.draft",
        ] {
            env.bind(ctx, Evaluation::Flexible(FlexibleAction::either()));
        }

        env
    }

    /// Binds `context` to `value`, replacing any previous binding.
    pub fn bind(&mut self, context: &str, value: Evaluation) {
        self.bindings.insert(context.to_ascii_lowercase(), value);
    }

    /// Looks up a context's binding.
    pub fn lookup(&self, context: &str) -> Option<Evaluation> {
        self.bindings.get(&context.to_ascii_lowercase()).cloned()
    }
}
