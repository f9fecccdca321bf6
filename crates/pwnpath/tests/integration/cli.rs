//! Command-line behavior.

use anyhow::Result;
use pretty_assertions::assert_eq;

use crate::common::{FINDINGS, OutputMode, input_under_test, pwnpath};

#[test]
fn no_exit_codes() -> Result<()> {
    for (args, expected) in [
        (vec![], FINDINGS),
        (vec!["--no-exit-codes"], 0),
    ] {
        let run = pwnpath()
            .args(args.iter().copied())
            .input(input_under_test("injection"))
            .run()?;

        assert_eq!(run.code, Some(expected), "{args:?}");
    }

    Ok(())
}

#[test]
fn explicit_config() -> Result<()> {
    let run = pwnpath()
        .config(input_under_test("config/.github/pwnpath.yml"))
        .input(input_under_test("clean"))
        .run()?;
    assert_eq!(run.code, Some(0));

    let run = pwnpath()
        .output(OutputMode::Both)
        .config(input_under_test("bad-config/pwnpath.yml"))
        .input(input_under_test("clean"))
        .run()?;
    assert_eq!(run.code, Some(1));
    assert!(run.output.contains("failed to load config"));
    assert!(run.output.contains("no audit was performed"));

    Ok(())
}

#[test]
fn remote_inputs_need_github() -> Result<()> {
    for (offline, tip) in [
        (true, "remove --offline"),
        (false, "pass --gh-token or set GH_TOKEN"),
    ] {
        let run = pwnpath()
            .offline(offline)
            .no_config(true)
            .output(OutputMode::Both)
            .input("acme/widgets@main")
            .run()?;

        assert_eq!(run.code, Some(1));
        assert!(
            run.output
                .contains("can't audit acme/widgets@main without GitHub access")
        );
        assert!(run.output.contains(tip), "{tip}");
    }

    Ok(())
}

#[test]
fn offline_from_env() -> Result<()> {
    let run = pwnpath()
        .offline(false)
        .setenv("PWNPATH_OFFLINE", "true")
        .setenv("GH_TOKEN", "gho_unused")
        .output(OutputMode::Both)
        .input("acme/widgets")
        .run()?;

    assert_eq!(run.code, Some(1));
    assert!(run.output.contains("remove --offline"));

    Ok(())
}

#[test]
fn nothing_to_audit() -> Result<()> {
    let run = pwnpath()
        .output(OutputMode::Both)
        .input(input_under_test("config"))
        .run()?;

    assert_eq!(run.code, Some(1));
    assert!(run.output.contains("no workflows collected"));

    Ok(())
}
