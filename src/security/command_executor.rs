//! SafeCommandExecutor: allow-listed process execution with line streaming
//!
//! # Security Features
//!
//! - **Allow-list validation**: only the CLIs a publish run needs can execute
//! - **Injection prevention**: uses `tokio::process::Command`, arguments are
//!   passed as a vector and never interpolated into a shell string
//! - **Working directory validation**: checked before every spawn
//! - **Timeout control**: a hanging `git push` or `npm publish` is killed
//!
//! # Example
//!
//! ```rust,no_run
//! use mirror_publisher::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor
//!     .execute("git", &["--version"], |line| println!("{line}"))
//!     .await?;
//! assert!(output.success());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::core::traits::{CommandOutput, CommandRunner};

/// Programs a publish run shells out to.
const ALLOWED_COMMANDS: &[&str] = &["npm", "git", "curl", "tar"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed list
    #[error("Command '{0}' is not in the allowed list")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command execution failed (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    /// Default working directory
    working_dir: PathBuf,
    /// Optional timeout for command execution
    timeout: Option<Duration>,
    /// Programs allowed on top of [`ALLOWED_COMMANDS`]
    extra_allowed: Vec<String>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
            extra_allowed: Vec::new(),
        })
    }

    /// Set command execution timeout.
    ///
    /// Commands exceeding this duration are killed.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Permit one more program besides the built-in list
    pub fn allow(&mut self, program: impl Into<String>) {
        self.extra_allowed.push(program.into());
    }

    fn is_allowed(&self, program: &str) -> bool {
        ALLOWED_COMMANDS.contains(&program) || self.extra_allowed.iter().any(|p| p == program)
    }

    /// Execute a command in the default working directory.
    pub async fn execute<F>(
        &self,
        command: &str,
        args: &[&str],
        on_line: F,
    ) -> Result<CommandOutput, CommandError>
    where
        F: FnMut(&str) + Send,
    {
        self.execute_in(&self.working_dir, command, args, on_line)
            .await
    }

    /// Execute a command in `cwd`, reporting every stdout and stderr line to
    /// `on_line` as it arrives.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - command not in the allowed list
    /// - `CommandError::InvalidWorkingDirectory` - `cwd` is not a directory
    /// - `CommandError::ExecutionFailed` - binary not found or I/O error
    /// - `CommandError::Timeout` - the configured timeout elapsed
    pub async fn execute_in<F>(
        &self,
        cwd: &Path,
        command: &str,
        args: &[&str],
        mut on_line: F,
    ) -> Result<CommandOutput, CommandError>
    where
        F: FnMut(&str) + Send,
    {
        if !self.is_allowed(command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        if !cwd.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(cwd.to_path_buf()));
        }

        // npm ships as a .cmd shim on Windows
        #[cfg(target_os = "windows")]
        let command_name = if command == "npm" {
            format!("{}.cmd", command)
        } else {
            command.to_string()
        };

        #[cfg(not(target_os = "windows"))]
        let command_name = command.to_string();

        let mut child = Command::new(&command_name)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CommandError::ExecutionFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CommandError::ExecutionFailed("stderr not captured".to_string()))?;

        let collect = async {
            let mut out_lines = BufReader::new(stdout).lines();
            let mut err_lines = BufReader::new(stderr).lines();
            let mut output = CommandOutput::default();
            let mut out_done = false;
            let mut err_done = false;

            while !(out_done && err_done) {
                tokio::select! {
                    line = out_lines.next_line(), if !out_done => match line? {
                        Some(line) => {
                            on_line(&line);
                            output.stdout.push_str(&line);
                            output.stdout.push('\n');
                        }
                        None => out_done = true,
                    },
                    line = err_lines.next_line(), if !err_done => match line? {
                        Some(line) => {
                            on_line(&line);
                            output.stderr.push_str(&line);
                            output.stderr.push('\n');
                        }
                        None => err_done = true,
                    },
                }
            }

            output.code = child.wait().await?.code();
            Ok::<_, std::io::Error>(output)
        };

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, collect)
                .await
                .map_err(|_| CommandError::Timeout(limit))?,
            None => collect.await,
        };

        result.map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", command, e)))
    }
}

#[async_trait]
impl CommandRunner for SafeCommandExecutor {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, CommandError> {
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(cwd = %cwd.display(), "$ {} {}", program, argv.join(" "));

        self.execute_in(cwd, program, &argv, |line| {
            tracing::debug!(target: "mirror_publisher::process", "[{}] {}", program, line);
        })
        .await
    }
}
