//! Shell execution of resolved command templates.

use std::io::ErrorKind;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Exit status `sh` reports when it cannot find the program.
const SHELL_NOT_FOUND: i32 = 127;

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    /// Trimmed standard output, kept for parsing even when `message` fell
    /// back to the success phrase.
    #[serde(skip)]
    pub output: String,
}

impl CommandOutcome {
    pub fn ok(output: impl Into<String>, success_phrase: &str) -> Self {
        let output = output.into();
        let message = if output.is_empty() {
            success_phrase.to_string()
        } else {
            output.clone()
        };
        Self {
            success: true,
            message,
            output,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            message: msg.into(),
            output: String::new(),
        }
    }
}

/// Runs a command line and reports the outcome. Never fails outright.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor: Send + Sync {
    fn run(&self, template: &str, param: Option<i64>, success_phrase: &str) -> CommandOutcome;
}

/// Fill the single `{}` placeholder, if both it and a parameter are present.
pub fn substitute(template: &str, param: Option<i64>) -> String {
    match param {
        Some(value) if template.contains("{}") => template.replacen("{}", &value.to_string(), 1),
        _ => template.to_string(),
    }
}

fn program_name(template: &str) -> &str {
    template.split_whitespace().next().unwrap_or(template)
}

/// Executes templates through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different POSIX shell binary.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl CommandExecutor for ShellExecutor {
    fn run(&self, template: &str, param: Option<i64>, success_phrase: &str) -> CommandOutcome {
        let command_line = substitute(template, param);
        debug!(command = %command_line, "executing");

        let output = match Command::new(&self.shell).arg("-c").arg(&command_line).output() {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(command = %command_line, "executable not found");
                return CommandOutcome::err(format!(
                    "Command not found for: '{}'.",
                    program_name(template)
                ));
            }
            Err(e) => {
                warn!(command = %command_line, error = %e, "failed to execute");
                return CommandOutcome::err(format!("An unexpected error occurred: {e}"));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            info!(command = %command_line, "command succeeded");
            if !stderr.is_empty() {
                debug!(stderr = %stderr, "command wrote to stderr");
            }
            return CommandOutcome::ok(stdout, success_phrase);
        }

        let code = output.status.code().unwrap_or(-1);
        warn!(command = %command_line, code, stderr = %stderr, "command failed");
        if !stderr.is_empty() {
            // On 127 the shell names the program it could not find.
            return CommandOutcome::err(stderr);
        }
        if code == SHELL_NOT_FOUND {
            CommandOutcome::err(format!(
                "Command not found for: '{}'.",
                program_name(template)
            ))
        } else {
            CommandOutcome::err(format!(
                "Command '{command_line}' failed with exit code {code}."
            ))
        }
    }
}
