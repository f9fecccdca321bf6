//! Lenient models of GitHub Actions workflows, actions and `uses:` clauses.

pub(crate) mod document;
pub(crate) mod uses;

pub(crate) use document::{Document, JobDef, StepDef};
pub(crate) use uses::{RepositoryUses, RepositoryUsesPattern, Uses};
