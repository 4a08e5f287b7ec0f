//! Workspace Publisher - entry point for a whole publish run
//!
//! Wires the pieces together:
//! - package discovery under the configured packages directory
//! - dependency ordering
//! - the process executor and registry client used by the sequencer

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::PublisherSettings;
use crate::core::error::{PublishError, Result};
use crate::registry::HttpRegistryClient;
use crate::security::SafeCommandExecutor;
use crate::workspace::{PackageRegistry, topological_order};

use super::sequencer::{PlannedPackage, PublishReport, PublishSequencer, plan_package};

/// Publishes every package of a workspace
pub struct WorkspacePublisher {
    project_path: PathBuf,
    settings: PublisherSettings,
}

impl WorkspacePublisher {
    /// Create a new WorkspacePublisher
    ///
    /// # Arguments
    ///
    /// * `project_path` - Workspace root; external commands default to it
    /// * `settings` - Resolved settings, usually from [`crate::core::ConfigLoader`]
    pub fn new<P: AsRef<Path>>(project_path: P, settings: PublisherSettings) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            settings,
        }
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Discover the publishable packages of the workspace
    pub async fn load_packages(&self) -> Result<PackageRegistry> {
        let registry =
            PackageRegistry::load(&self.settings.packages_dir, &self.settings.scope).await?;
        tracing::info!(
            packages = registry.len(),
            dir = %self.settings.packages_dir.display(),
            scope = %self.settings.scope,
            "discovered packages"
        );
        Ok(registry)
    }

    /// Publish order with tag, tarball URL and branch per package. Runs no
    /// commands.
    pub async fn plan(&self) -> Result<Vec<PlannedPackage>> {
        let registry = self.load_packages().await?;
        let order = topological_order(&registry)?;

        Ok(order
            .into_iter()
            .map(|details| plan_package(&self.settings, details))
            .collect())
    }

    /// Publish every package in dependency order and mirror each into the
    /// asset repository
    pub async fn publish(&self) -> Result<PublishReport> {
        let registry = self.load_packages().await?;
        let order = topological_order(&registry)?;

        let sequencer = self.sequencer()?;
        sequencer.run(&order).await
    }

    fn sequencer(&self) -> Result<PublishSequencer> {
        let mut executor = SafeCommandExecutor::new(&self.project_path).map_err(|e| {
            PublishError::Config(format!("invalid project path: {}", e))
        })?;
        if let Some(timeout) = self.settings.command_timeout {
            executor.set_timeout(timeout);
        }

        let client = HttpRegistryClient::new()?;

        Ok(PublishSequencer::new(
            self.settings.clone(),
            Arc::new(executor),
            Arc::new(client),
        ))
    }
}
