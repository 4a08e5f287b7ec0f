//! npm registry operations
//!
//! This module covers the registry side of a publish cycle:
//! - dist-tag selection from the version's prerelease component
//! - `npm publish` with tolerance for versions that already exist
//! - tarball URL construction and the existence check used to confirm that a
//!   publish has propagated

use async_trait::async_trait;
use semver::Version;
use serde::Serialize;
use std::time::Duration;

use crate::core::config::NpmAccess;
use crate::core::error::{PublishError, Result};
use crate::core::traits::{CommandRunner, RegistryClient};
use crate::workspace::PackageDetails;

/// Output fragments npm prints when the version is already on the registry
const ALREADY_PUBLISHED_MARKERS: &[&str] = &[
    "You cannot publish over the previously published versions",
    "EPUBLISHCONFLICT",
];

/// dist-tag for a version: the first prerelease identifier, else `latest`.
///
/// `1.2.0-canary.8f2c1` publishes under `canary`, `1.2.0` under `latest`.
pub fn prerelease_tag(version: &Version) -> String {
    if version.pre.is_empty() {
        return "latest".to_string();
    }

    version
        .pre
        .as_str()
        .split('.')
        .next()
        .filter(|id| !id.is_empty())
        .unwrap_or("latest")
        .to_string()
}

/// `@scope/name` → `name`; unscoped names are returned unchanged
pub fn unscoped_name(name: &str) -> &str {
    match name.strip_prefix('@') {
        Some(rest) => rest.split_once('/').map(|(_, n)| n).unwrap_or(rest),
        None => name,
    }
}

/// `<registry>/@scope/name/-/name-<version>.tgz`
pub fn tarball_url(registry_url: &str, name: &str, version: &Version) -> String {
    format!(
        "{}/{}/-/{}-{}.tgz",
        registry_url.trim_end_matches('/'),
        name,
        unscoped_name(name),
        version
    )
}

/// Whether captured `npm publish` output says the version already exists
pub fn is_already_published(output: &str) -> bool {
    ALREADY_PUBLISHED_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
}

/// Result of a successful publish step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    Published,
    /// The registry already had this version; treated as success
    AlreadyPublished,
}

/// `npm publish` driver
pub struct NpmRegistry<'a> {
    runner: &'a dyn CommandRunner,
    registry_url: String,
    access: NpmAccess,
}

impl<'a> NpmRegistry<'a> {
    pub fn new(runner: &'a dyn CommandRunner, registry_url: &str, access: NpmAccess) -> Self {
        Self {
            runner,
            registry_url: registry_url.to_string(),
            access,
        }
    }

    pub fn publish_args(&self, details: &PackageDetails) -> Vec<String> {
        vec![
            "publish".to_string(),
            "--tag".to_string(),
            prerelease_tag(&details.version),
            "--access".to_string(),
            self.access.as_str().to_string(),
            "--registry".to_string(),
            self.registry_url.clone(),
        ]
    }

    /// Run `npm publish` in the package directory.
    ///
    /// A failing publish whose output reports an existing version resolves to
    /// [`PublishOutcome::AlreadyPublished`].
    pub async fn publish(&self, details: &PackageDetails) -> Result<PublishOutcome> {
        let args = self.publish_args(details);
        let output = self
            .runner
            .run("npm", &args, &details.dir)
            .await
            .map_err(|source| PublishError::Command {
                package: details.name.clone(),
                source,
            })?;

        if output.success() {
            return Ok(PublishOutcome::Published);
        }

        if is_already_published(&output.combined()) {
            tracing::info!(
                package = %details.name,
                version = %details.version,
                "version already published, continuing"
            );
            return Ok(PublishOutcome::AlreadyPublished);
        }

        Err(PublishError::PublishFailed {
            package: details.name.clone(),
            message: output.summary(),
        })
    }
}

/// Registry client backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("mirror-publisher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn artifact_status(&self, package: &str, url: &str) -> Result<u16> {
        let response =
            self.client
                .head(url)
                .send()
                .await
                .map_err(|e| PublishError::NetworkError {
                    package: package.to_string(),
                    message: e.to_string(),
                })?;

        Ok(response.status().as_u16())
    }
}
