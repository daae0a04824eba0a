//! Subprocess seam for everything that shells out (`useradd`, `visudo`,
//! `ip`, `restorecon`).

use std::process::Command;

use crate::error::ReconcileError;

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// `Err(ReconcileError::Command)` unless the command exited zero.
    pub fn check(self, program: &str, args: &[String]) -> Result<Self, ReconcileError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ReconcileError::Command {
                command: render_command(program, args),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs a program to completion and captures its output.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ReconcileError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ReconcileError> {
        (**self).run(program, args)
    }
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommands;

impl CommandRunner for SystemCommands {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ReconcileError> {
        tracing::debug!("running: {}", render_command(program, args));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ReconcileError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(CommandOutput {
            // Killed by a signal: no exit code.
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub(crate) fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
