//! JSON output.
//!
//! The output is a single object mapping each repository to its
//! findings, in the same shape as [`Findings`] serializes to.

use std::io;

use crate::finding::Findings;

pub(crate) fn output(sink: impl io::Write, findings: &Findings) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(sink, findings)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::visitor::testing::audit_workflow;

    use super::output;

    #[tokio::test]
    async fn test_output() -> anyhow::Result<()> {
        let findings = audit_workflow(
            r#"
on: issues
jobs:
  greet:
    runs-on: ubuntu-latest
    steps:
      - run: echo '${{ github.event.issue.title }}'
"#,
        )
        .await;

        let mut sink = vec![];
        output(&mut sink, &findings)?;

        let value: serde_json::Value = serde_json::from_slice(&sink)?;
        let found = &value["acme/widgets"][0];
        assert_eq!(found["kind"], "injection");
        assert_eq!(found["confidence"], "High");
        assert_eq!(found["contexts"][0]["token"], "github.event.issue.title");

        Ok(())
    }
}
