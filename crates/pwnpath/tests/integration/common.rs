use std::{env::current_dir, sync::LazyLock};

use anyhow::Result;
use assert_cmd::{Command, cargo};
use camino::Utf8PathBuf;

/// The exit code for a run with findings.
pub const FINDINGS: i32 = 14;

static TEST_PREFIX: LazyLock<Utf8PathBuf> = LazyLock::new(|| {
    let current_dir = current_dir().expect("Cannot figure out current directory");

    let file_path = current_dir
        .join("tests")
        .join("integration")
        .join("test-data");

    if !file_path.exists() {
        panic!("Cannot find test data directory: {}", file_path.display());
    }

    Utf8PathBuf::try_from(file_path).expect("Cannot create UTF-8 path from test data directory")
});

pub fn input_under_test(name: &str) -> String {
    let file_path = TEST_PREFIX.join(name);

    if !file_path.exists() {
        panic!("Cannot find input under test: {file_path}");
    }

    file_path.to_string()
}

pub enum OutputMode {
    Stdout,
    Both,
}

/// The outcome of a single `pwnpath` run.
pub struct Run {
    pub code: Option<i32>,
    pub output: String,
}

impl Run {
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.output)?)
    }
}

pub struct Pwnpath {
    cmd: Command,
    offline: bool,
    inputs: Vec<String>,
    config: Option<String>,
    no_config: bool,
    output: OutputMode,
}

impl Pwnpath {
    /// Create a new pwnpath runner.
    pub fn new() -> Self {
        let mut cmd = Command::new(cargo::cargo_bin!());

        // The child process starts with a clean environment, so that
        // `GH_TOKEN` and friends never leak into a run.
        cmd.env_clear();

        Self {
            cmd,
            offline: true,
            inputs: vec![],
            config: None,
            no_config: false,
            output: OutputMode::Stdout,
        }
    }

    pub fn args<'a>(mut self, args: impl IntoIterator<Item = &'a str>) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn setenv(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn no_config(mut self, flag: bool) -> Self {
        self.no_config = flag;
        self
    }

    pub fn offline(mut self, flag: bool) -> Self {
        self.offline = flag;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn run(mut self) -> Result<Run> {
        if self.offline {
            self.cmd.arg("--offline");
        }

        if self.no_config && self.config.is_some() {
            anyhow::bail!("API misuse: cannot set both --no-config and --config");
        }

        if self.no_config {
            self.cmd.arg("--no-config");
        }

        if let Some(config) = &self.config {
            self.cmd.arg("--config").arg(config);
        }

        // Progress bars need a terminal.
        self.cmd.arg("--no-progress");

        for input in &self.inputs {
            self.cmd.arg(input);
        }

        let output = self.cmd.output()?;

        let mut raw = String::from_utf8(match self.output {
            OutputMode::Stdout => output.stdout,
            OutputMode::Both => [output.stderr, output.stdout].concat(),
        })?;

        let test_prefix_placeholder = "@@TEST_PREFIX@@";
        raw = raw.replace(TEST_PREFIX.as_str(), test_prefix_placeholder);

        Ok(Run {
            code: output.status.code(),
            output: raw,
        })
    }
}

pub fn pwnpath() -> Pwnpath {
    Pwnpath::new()
}
