/// CLI behavior: flags, configuration and failure modes.
mod cli;
/// Helpers.
mod common;
/// End-to-end audits of the test-data repositories.
mod e2e;
