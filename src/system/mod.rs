//! Host collaborators: ownership changes, service control, kernel modules.
//!
//! Each collaborator is a narrow trait so the bootstrap pipeline can run
//! against fakes. The production implementations shell out through a
//! [`CommandRunner`] and turn a non-zero exit into [`AppError::Command`]
//! carrying the combined stdout/stderr.

pub mod modules;
pub mod ownership;
pub mod services;

use std::process::Command;

use tracing::debug;

use crate::error::AppError;

pub use modules::{ModuleLoader, Modprobe};
pub use ownership::{Chown, OwnershipChanger};
pub use services::{ServiceAction, ServiceController, Systemctl};

/// Result of a finished external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Human-readable exit status (`exit status: 1`, `signal: 9`, ...).
    pub status: String,
    /// stdout followed by stderr.
    pub combined: String,
}

/// Runs a program to completion and captures its output.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            combined: combined.trim_end().to_string(),
        })
    }
}

/// Run `program args…`, failing on spawn errors and non-zero exits.
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: Vec<String>,
) -> Result<CommandOutput, AppError> {
    debug!(%program, ?args, "running");
    let output = runner.run(program, &args).map_err(|e| AppError::Command {
        program: program.to_string(),
        args: args.clone(),
        status: "not started".into(),
        output: e.to_string(),
    })?;
    if !output.combined.is_empty() {
        debug!(%program, output = %output.combined, "command output");
    }
    if !output.success {
        return Err(AppError::Command {
            program: program.to_string(),
            args,
            status: output.status,
            output: output.combined,
        });
    }
    Ok(output)
}
