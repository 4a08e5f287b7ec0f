//! Error handling for package publishing
//!
//! This module provides the error taxonomy for a publish run using the
//! thiserror crate. Every variant is fatal for the run once it reaches the
//! sequencer; `is_recoverable` tells the retry layer which ones are worth
//! another attempt.

use std::path::PathBuf;
use thiserror::Error;

use crate::security::CommandError;

/// Main error type for package publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // Workspace errors
    #[error("failed to read manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("[{package}] invalid version '{version}': {message}")]
    InvalidVersion {
        package: String,
        version: String,
        message: String,
    },

    #[error("missing dependency '{name}' (required by {})", chain.join(" -> "))]
    MissingDependency { name: String, chain: Vec<String> },

    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    // Publishing errors
    #[error("[{package}] publish failed: {message}")]
    PublishFailed { package: String, message: String },

    // Network errors
    #[error("[{package}] registry request failed: {message}")]
    NetworkError { package: String, message: String },

    #[error("[{package}] {url} is not available yet (HTTP {status})")]
    NotAvailable {
        package: String,
        url: String,
        status: u16,
    },

    // Downstream errors
    #[error("[{package}] failed to transplant artifact: {message}")]
    TransplantFailed { package: String, message: String },

    #[error("[{package}] git {operation} failed: {message}")]
    GitFailed {
        package: String,
        operation: String,
        message: String,
    },

    // Command execution errors
    #[error("[{package}] command error: {source}")]
    Command {
        package: String,
        #[source]
        source: CommandError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Check if this error is worth another attempt inside a retry loop
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PublishFailed { .. }
                | Self::NetworkError { .. }
                | Self::NotAvailable { .. }
                | Self::Command {
                    source: CommandError::Timeout(_),
                    ..
                }
        )
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Manifest { .. } => "MANIFEST_ERROR",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::MissingDependency { .. } => "MISSING_DEPENDENCY",
            Self::DependencyCycle { .. } => "DEPENDENCY_CYCLE",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::NetworkError { .. } => "NETWORK_ERROR",
            Self::NotAvailable { .. } => "NOT_AVAILABLE",
            Self::TransplantFailed { .. } => "TRANSPLANT_FAILED",
            Self::GitFailed { .. } => "GIT_FAILED",
            Self::Command { .. } => "COMMAND_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T, E = PublishError> = std::result::Result<T, E>;
