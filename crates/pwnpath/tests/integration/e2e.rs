//! End-to-end integration tests.

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{FINDINGS, input_under_test, pwnpath};

#[test]
fn injection() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json"])
        .input(input_under_test("injection"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let findings = run.json()?;
    let found = &findings["local/injection"];
    assert_eq!(found.as_array().map(Vec::len), Some(1));
    assert_eq!(found[0]["kind"], "injection");
    assert_eq!(found[0]["workflow"], ".github/workflows/greet.yml");
    assert_eq!(found[0]["job"], "greet");
    assert_eq!(found[0]["step"], "say hello");
    assert_eq!(found[0]["confidence"], "High");
    assert_eq!(found[0]["triggers"], json!(["pull_request_target"]));
    assert_eq!(
        found[0]["contexts"],
        json!([{ "token": "github.event.pull_request.title", "source": "direct" }])
    );
    assert_eq!(
        found[0]["path"]
            .as_array()
            .map(|path| path.iter().map(|p| p["kind"].clone()).collect::<Vec<_>>()),
        Some(vec![json!("workflow"), json!("job"), json!("step")])
    );

    Ok(())
}

#[test]
fn injection_single_file() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json", "--repo-name", "acme/greeter"])
        .input(input_under_test("injection/.github/workflows/greet.yml"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let findings = run.json()?;
    assert_eq!(findings["acme/greeter"][0]["kind"], "injection");

    Ok(())
}

#[test]
fn composite_action_inputs() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json"])
        .input(input_under_test("composite"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let findings = run.json()?;
    let found = &findings["local/composite"];
    assert_eq!(found.as_array().map(Vec::len), Some(1));
    assert_eq!(found[0]["step"], "apply label");
    assert_eq!(found[0]["job"], "triage");
    assert_eq!(found[0]["confidence"], "Medium");
    assert_eq!(
        found[0]["contexts"],
        json!([{
            "token": "github.event.issue.title",
            "source": "input",
            "via": "inputs.title",
        }])
    );

    Ok(())
}

#[test]
fn pwn_request() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json"])
        .input(input_under_test("pwn-request"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let findings = run.json()?;
    let found = &findings["local/pwn-request"];
    assert_eq!(found.as_array().map(Vec::len), Some(1));
    assert_eq!(found[0]["kind"], "pwn_request");
    assert_eq!(found[0]["step"], "actions/checkout@v4");
    assert_eq!(found[0]["confidence"], "High");
    assert_eq!(found[0]["self_hosted"], true);
    assert_eq!(
        found[0]["checkout_ref"],
        "${{ github.event.pull_request.head.ref }}"
    );
    assert_eq!(found[0]["mutable"], true);
    assert_eq!(found[0]["sink"], "install");
    assert_eq!(found[0]["toctou"], false);

    Ok(())
}

#[test]
fn label_toctou() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json"])
        .input(input_under_test("label-toctou"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let findings = run.json()?;
    let found = &findings["local/label-toctou"][0];
    assert_eq!(found["triggers"], json!(["pull_request_target:labeled"]));
    assert_eq!(found["sink"], "run e2e");
    assert_eq!(found["toctou"], true);

    Ok(())
}

#[test]
fn gated() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json"])
        .input(input_under_test("gated"))
        .run()?;
    assert_eq!(run.code, Some(0));
    assert_eq!(run.json()?, json!({}));

    Ok(())
}

#[test]
fn many_inputs() -> Result<()> {
    let run = pwnpath()
        .args(["--format", "json"])
        .input(input_under_test("clean"))
        .input(input_under_test("injection"))
        .input(input_under_test("pwn-request"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let findings = run.json()?;
    assert_eq!(
        findings
            .as_object()
            .map(|repos| repos.keys().cloned().collect::<Vec<_>>()),
        Some(vec!["local/injection".into(), "local/pwn-request".into()])
    );

    Ok(())
}

#[test]
fn plain_clean() -> Result<()> {
    let run = pwnpath().input(input_under_test("clean")).run()?;
    assert_eq!(run.code, Some(0));

    insta::assert_snapshot!(run.output, @"No findings to report. Good job!");

    Ok(())
}

#[test]
fn plain_findings() -> Result<()> {
    let run = pwnpath()
        .args(["--color", "never"])
        .input(input_under_test("injection"))
        .run()?;
    assert_eq!(run.code, Some(FINDINGS));

    let mut lines = run.output.lines();
    assert_eq!(lines.next(), Some("local/injection"));
    assert!(run.output.contains("script injection in `say hello`"));
    assert!(
        run.output
            .contains("`github.event.pull_request.title` is interpolated directly")
    );
    assert_eq!(run.output.lines().last(), Some("1 finding: 0 medium, 1 high"));

    Ok(())
}
