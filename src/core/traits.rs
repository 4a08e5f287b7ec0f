//! Core traits and types for package publishing
//!
//! The sequencer talks to the outside world through two seams: a
//! [`CommandRunner`] for the `npm`, `curl`, `tar` and `git` CLIs, and a
//! [`RegistryClient`] for the tarball existence check. Both are object-safe so
//! tests can swap in scripted fakes.

use async_trait::async_trait;
use std::path::Path;

use crate::core::error::Result;
use crate::security::CommandError;

// ============================================================================
// Process execution
// ============================================================================

/// Captured result of a finished child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }

    /// Last non-empty output line, stderr taking precedence, for error messages
    pub fn summary(&self) -> String {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|l| !l.trim().is_empty())
            .next_back()
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Runs external programs on behalf of the sequencer
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` in `cwd` and capture its output.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`CommandOutput::success`].
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> std::result::Result<CommandOutput, CommandError>;
}

// ============================================================================
// Registry
// ============================================================================

/// Answers whether a published artifact can be fetched from the registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// HTTP status of an existence check against `url`
    async fn artifact_status(&self, package: &str, url: &str) -> Result<u16>;
}
