//! "plain" (i.e. cargo-style) output.

use annotate_snippets::{Group, Level, Renderer};
use anstream::{print, println};
use itertools::Itertools as _;
use owo_colors::OwoColorize;

use crate::finding::{Confidence, Details, Finding, Findings};

impl From<Confidence> for Level<'_> {
    fn from(confidence: Confidence) -> Self {
        match confidence {
            Confidence::Medium => Level::WARNING,
            Confidence::High => Level::ERROR,
        }
    }
}

fn title(finding: &Finding) -> String {
    match &finding.details {
        Details::Injection { .. } => format!("script injection in `{}`", finding.step),
        Details::PwnRequest { checkout_ref, .. } => format!(
            "`{}` checks out `{checkout_ref}` in a privileged context",
            finding.step
        ),
    }
}

fn notes(finding: &Finding) -> Vec<String> {
    let mut notes = vec![format!(
        "{workflow}{job}, triggered by {triggers}",
        workflow = finding.workflow,
        job = finding
            .job
            .as_ref()
            .map(|job| format!(" (job `{job}`)"))
            .unwrap_or_default(),
        triggers = finding.triggers.join(", "),
    )];

    match &finding.details {
        Details::Injection { contexts } => {
            for context in contexts {
                notes.push(match &context.via {
                    Some(via) => format!("`{}` reaches the script via `{via}`", context.token),
                    None => format!("`{}` is interpolated directly", context.token),
                });
            }
        }
        Details::PwnRequest {
            mutable,
            sink,
            toctou,
            ..
        } => {
            match sink {
                Some(sink) => notes.push(format!("`{sink}` runs the checked out code")),
                None => notes.push("no known sink runs the checked out code".into()),
            }
            if *mutable {
                notes.push("the checked out ref is mutable".into());
            }
            if *toctou {
                notes.push("the gate can be raced by pushing after approval".into());
            }
        }
    }

    if finding.self_hosted {
        notes.push("the job runs on a self-hosted runner".into());
    }

    notes.push(format!(
        "path: {}",
        finding.path.iter().map(|entry| &entry.name).join(" → ")
    ));
    notes.push(format!("confidence: {:?}", finding.confidence));

    notes
}

fn render_finding(finding: &Finding) -> String {
    let title = title(finding);
    let notes = notes(finding);

    let group = notes.iter().fold(
        Group::with_title(
            Level::from(finding.confidence)
                .primary_title(&title)
                .id(finding.kind()),
        ),
        |group, note| group.element(Level::NOTE.message(note)),
    );

    let renderer = Renderer::styled();
    renderer.render(&[group])
}

pub(crate) fn render_findings(findings: &Findings) {
    for (repo, findings) in findings.iter() {
        println!("{}", repo.bold());
        for finding in findings {
            println!("{}", render_finding(finding));
            println!();
        }
    }

    if findings.is_empty() {
        println!("{}", "No findings to report. Good job!".green());
    } else {
        let nfindings = findings.len();
        print!(
            "{nfindings} finding{s}: ",
            nfindings = nfindings.green(),
            s = if nfindings == 1 { "" } else { "s" },
        );

        println!(
            "{nmedium} medium, {nhigh} high",
            nmedium = findings.count_by_confidence(Confidence::Medium).yellow(),
            nhigh = findings.count_by_confidence(Confidence::High).red(),
        );
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::notes;
    use crate::{finding::Finding, visitor::testing::audit_workflow};

    async fn first(workflow: &str) -> Finding {
        let findings = audit_workflow(workflow).await;
        findings
            .iter()
            .flat_map(|(_, findings)| findings)
            .next()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_injection_notes() {
        let finding = first(
            r#"
on: issues
env:
  TITLE: ${{ github.event.issue.title }}
jobs:
  greet:
    runs-on: self-hosted
    steps:
      - name: echo
        run: echo "${{ env.TITLE }}"
"#,
        )
        .await;

        let notes = notes(&finding);
        assert_eq!(
            notes[..3].to_vec(),
            vec![
                ".github/workflows/ci.yml (job `greet`), triggered by issues",
                "`github.event.issue.title` reaches the script via `env.TITLE`",
                "the job runs on a self-hosted runner",
            ]
        );
        assert!(notes[3].starts_with("path: acme/widgets:HEAD:.github/workflows/ci.yml → "));
        assert_eq!(notes[4], "confidence: Medium");
    }

    #[tokio::test]
    async fn test_pwn_request_notes() {
        let finding = first(
            r#"
on: pull_request_target
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
        with:
          ref: ${{ github.head_ref }}
      - name: test
        run: npm test
"#,
        )
        .await;

        let notes = notes(&finding);
        assert_eq!(
            notes[1..3].to_vec(),
            vec![
                "`test` runs the checked out code",
                "the checked out ref is mutable",
            ]
        );
        assert_eq!(notes.last().map(String::as_str), Some("confidence: High"));
    }
}
