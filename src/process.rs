//! External process seam.
//!
//! Every command the engine runs goes through a [`CommandRunner`], so tests
//! can record invocations instead of touching real tools.

use crate::error::PatchsetError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A program plus arguments, optionally run from a specific directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Shell-like rendering used in logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', "'\\''"))
    }
}

/// Result of a finished process. `exit_code` is `None` when killed by a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait CommandRunner {
    /// Run to completion, capturing output. Only a failure to spawn is an error.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PatchsetError>;
}

/// Runs commands with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PatchsetError> {
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = invocation.cwd() {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| PatchsetError::CommandSpawn {
            command: invocation.command_line(),
            source,
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Records invocations and replays queued outputs; succeeds once the queue
/// is empty.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    invocations: RefCell<Vec<Invocation>>,
    outputs: RefCell<VecDeque<CommandOutput>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, output: CommandOutput) {
        self.outputs.borrow_mut().push_back(output);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }

    /// Invocations of `program`, probes excluded.
    pub fn invocations_of(&self, program: &str) -> Vec<Invocation> {
        self.invocations
            .borrow()
            .iter()
            .filter(|i| i.program() == program)
            .cloned()
            .collect()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PatchsetError> {
        self.invocations.borrow_mut().push(invocation.clone());
        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(CommandOutput::success))
    }
}
