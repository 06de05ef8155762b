//! Command execution with sticky-error chaining
//!
//! A [`Transport`] knows how to run one command somewhere (this machine, or a
//! server over SSH). A [`Chain`] wraps a transport and latches the first
//! failure so a sequence of dependent steps can be written without checking
//! after every call.

pub mod chain;
pub mod local;
pub mod quote;

use std::fmt;

use async_trait::async_trait;

use crate::errors::CapstanError;

pub use chain::Chain;
pub use local::{LocalCmd, LocalTransport};

/// One command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A program with discrete arguments, quoted when rendered for a shell
    Program { program: String, args: Vec<String> },

    /// A complete shell line (pipes, redirections, conditionals)
    Shell(String),
}

impl Invocation {
    pub fn program<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        Invocation::Program {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    pub fn shell(line: impl Into<String>) -> Self {
        Invocation::Shell(line.into())
    }

    /// Short name used in error messages
    pub fn name(&self) -> &str {
        match self {
            Invocation::Program { program, .. } => program,
            Invocation::Shell(line) => line.split_whitespace().next().unwrap_or("sh"),
        }
    }

    /// The invocation rendered as a single shell line
    pub fn to_line(&self) -> String {
        match self {
            Invocation::Program { program, args } => quote::join_command(program, args),
            Invocation::Shell(line) => line.clone(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Captured result of one command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Error text for a failed command: its stderr, trimmed of trailing
    /// whitespace, or the exit status when stderr is empty.
    pub fn failure_message(&self, invocation: &Invocation) -> String {
        let stderr = chomp(&self.stderr);
        if stderr.is_empty() {
            format!("{} exited with status {}", invocation.name(), self.exit_code)
        } else {
            stderr
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(out: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }
    }
}

/// Trim trailing whitespace and newlines
pub fn chomp(s: &str) -> String {
    s.trim_end().to_string()
}

/// Somewhere commands can run
#[async_trait]
pub trait Transport: Send + Sync {
    /// Host label used in log lines
    fn host(&self) -> &str;

    /// Run one command to completion.
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`]; an
    /// `Err` means the command could not be run at all.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CapstanError>;

    /// Release any connection held by the transport
    async fn close(&self) -> Result<(), CapstanError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn host(&self) -> &str {
        (**self).host()
    }

    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CapstanError> {
        (**self).execute(invocation).await
    }

    async fn close(&self) -> Result<(), CapstanError> {
        (**self).close().await
    }
}
