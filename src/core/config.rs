//! Configuration structures and types for mirror-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! [`PublisherConfig`] is the shape of one configuration layer (file, env or
//! CLI), every field optional; [`PublisherSettings`] is the validated result of
//! merging all layers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::retry::RetryOptions;

/// Default npm registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Default directory holding one subdirectory per package
pub const DEFAULT_PACKAGES_DIR: &str = "packages";

/// Root configuration object (one layer)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Registry base URL used for the availability check and tarball download
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,

    /// Package family scope, e.g. `@acme`; dependencies under it are local
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Directory containing the packages, relative to the project path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages_dir: Option<PathBuf>,

    /// Clone URL of the downstream asset repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_repo: Option<String>,

    /// Directory inside the asset repository receiving the package contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_subdir: Option<PathBuf>,

    /// npm access level passed to `npm publish`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<NpmAccess>,

    /// Skip the downstream copy when its branch already exists on the remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_existing_branches: Option<bool>,

    /// Log the plan without running any command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// Kill external commands running longer than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Retry budgets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// npm package access level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NpmAccess {
    #[default]
    Public,
    Restricted,
}

impl NpmAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            NpmAccess::Public => "public",
            NpmAccess::Restricted => "restricted",
        }
    }
}

/// Retry budgets for the two network steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<RetryPolicyConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<RetryPolicyConfig>,
}

/// One retry budget
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl RetryPolicyConfig {
    /// Fill unset fields from `defaults`
    pub fn resolve(&self, defaults: RetryOptions) -> RetryOptions {
        RetryOptions {
            num_attempts: self.num_attempts.unwrap_or(defaults.num_attempts),
            delay: self
                .delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        }
    }
}

/// Fully resolved settings for a publish run
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherSettings {
    pub registry_url: String,
    pub scope: String,
    pub packages_dir: PathBuf,
    pub assets_repo: String,
    pub assets_subdir: Option<PathBuf>,
    pub access: NpmAccess,
    pub skip_existing_branches: bool,
    pub dry_run: bool,
    pub command_timeout: Option<Duration>,
    pub publish_retry: RetryOptions,
    pub availability_retry: RetryOptions,
}

impl PublisherSettings {
    /// Settings with stock defaults for everything but the required fields
    pub fn new(
        scope: impl Into<String>,
        packages_dir: impl Into<PathBuf>,
        assets_repo: impl Into<String>,
    ) -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            scope: scope.into(),
            packages_dir: packages_dir.into(),
            assets_repo: assets_repo.into(),
            assets_subdir: None,
            access: NpmAccess::default(),
            skip_existing_branches: false,
            dry_run: false,
            command_timeout: None,
            publish_retry: RetryOptions::publish(),
            availability_retry: RetryOptions::availability(),
        }
    }
}
