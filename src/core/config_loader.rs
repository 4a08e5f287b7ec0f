//! Configuration file loader for mirror-publisher
//!
//! This module provides configuration loading, merging and validation.

use super::config::*;
use crate::core::error::PublishError;
use crate::core::retry::RetryOptions;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".mirror-publisher.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Explicit config file, replaces `<project>/.mirror-publisher.yaml`
    pub config_file: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PublisherConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (./.mirror-publisher.yaml)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublisherSettings, PublishError> {
        let mut configs: Vec<PublisherConfig> = Vec::new();

        let config_path = options
            .config_file
            .clone()
            .unwrap_or_else(|| options.project_path.join(CONFIG_FILENAME));

        if let Some(file_config) = Self::load_config_file(&config_path).await? {
            tracing::debug!(path = %config_path.display(), "loaded config file");
            configs.push(file_config);
        } else if options.config_file.is_some() {
            return Err(PublishError::Config(format!(
                "config file not found: {}",
                config_path.display()
            )));
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);
        let expanded = Self::expand_env_vars(merged, &options.env)?;

        Self::resolve(expanded, &options.project_path)
    }

    /// Load configuration from a YAML file, `None` if it does not exist
    async fn load_config_file(file_path: &Path) -> Result<Option<PublisherConfig>, PublishError> {
        if !file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(file_path).await.map_err(|e| {
            PublishError::Config(format!(
                "failed to read {}: {}",
                file_path.display(),
                e
            ))
        })?;

        let config: PublisherConfig = serde_yaml::from_str(&content).map_err(|e| {
            PublishError::Config(format!(
                "failed to parse {}: {}",
                file_path.display(),
                e
            ))
        })?;

        Ok(Some(config))
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<PublisherConfig> {
        let mut config = PublisherConfig::default();
        let mut has_changes = false;

        if let Some(registry) = env.get("MIRROR_PUBLISHER_REGISTRY") {
            config.registry_url = Some(registry.clone());
            has_changes = true;
        }

        if let Some(repo) = env.get("MIRROR_PUBLISHER_ASSETS_REPO") {
            config.assets_repo = Some(repo.clone());
            has_changes = true;
        }

        if let Some(scope) = env.get("MIRROR_PUBLISHER_SCOPE") {
            config.scope = Some(scope.clone());
            has_changes = true;
        }

        if let Some(skip) = env.get("MIRROR_PUBLISHER_SKIP_EXISTING_BRANCHES") {
            config.skip_existing_branches = Some(matches!(skip.as_str(), "1" | "true"));
            has_changes = true;
        }

        if has_changes { Some(config) } else { None }
    }

    /// Merge multiple configurations, later ones win
    fn merge_configs(configs: Vec<PublisherConfig>) -> PublisherConfig {
        let mut result = PublisherConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut PublisherConfig, source: PublisherConfig) {
        if source.registry_url.is_some() {
            target.registry_url = source.registry_url;
        }
        if source.scope.is_some() {
            target.scope = source.scope;
        }
        if source.packages_dir.is_some() {
            target.packages_dir = source.packages_dir;
        }
        if source.assets_repo.is_some() {
            target.assets_repo = source.assets_repo;
        }
        if source.assets_subdir.is_some() {
            target.assets_subdir = source.assets_subdir;
        }
        if source.access.is_some() {
            target.access = source.access;
        }
        if source.skip_existing_branches.is_some() {
            target.skip_existing_branches = source.skip_existing_branches;
        }
        if source.dry_run.is_some() {
            target.dry_run = source.dry_run;
        }
        if source.command_timeout_secs.is_some() {
            target.command_timeout_secs = source.command_timeout_secs;
        }

        // Retry budgets merge per field so a layer can override just the delay
        if let Some(source_retry) = source.retry {
            let target_retry = target.retry.get_or_insert_with(RetryConfig::default);
            Self::merge_policy(&mut target_retry.publish, source_retry.publish);
            Self::merge_policy(&mut target_retry.availability, source_retry.availability);
        }
    }

    fn merge_policy(target: &mut Option<RetryPolicyConfig>, source: Option<RetryPolicyConfig>) {
        let Some(source) = source else {
            return;
        };
        let target = target.get_or_insert_with(RetryPolicyConfig::default);
        if source.num_attempts.is_some() {
            target.num_attempts = source.num_attempts;
        }
        if source.delay_ms.is_some() {
            target.delay_ms = source.delay_ms;
        }
    }

    /// Expand `${VAR}` references in the URL fields
    fn expand_env_vars(
        mut config: PublisherConfig,
        env: &HashMap<String, String>,
    ) -> Result<PublisherConfig, PublishError> {
        if let Some(url) = &config.registry_url {
            config.registry_url = Some(Self::expand_string(url, env)?);
        }
        if let Some(repo) = &config.assets_repo {
            config.assets_repo = Some(Self::expand_string(repo, env)?);
        }

        Ok(config)
    }

    /// Expand environment variables in a single string
    fn expand_string(input: &str, env: &HashMap<String, String>) -> Result<String, PublishError> {
        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| PublishError::Config(format!("invalid variable pattern: {}", e)))?;

        let mut result = input.to_string();
        for cap in env_var_regex.captures_iter(input) {
            let var_name = &cap[1];
            let value = env.get(var_name).ok_or_else(|| {
                PublishError::Config(format!(
                    "environment variable {} referenced in config is not set",
                    var_name
                ))
            })?;
            result = result.replace(&cap[0], value);
        }

        Ok(result)
    }

    /// Apply defaults and validate the merged configuration
    fn resolve(
        config: PublisherConfig,
        project_path: &Path,
    ) -> Result<PublisherSettings, PublishError> {
        let registry_url = config
            .registry_url
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());
        if !(registry_url.starts_with("http://") || registry_url.starts_with("https://")) {
            return Err(PublishError::Config(format!(
                "registryUrl must be an http(s) URL, got '{}'",
                registry_url
            )));
        }

        let scope = config
            .scope
            .ok_or_else(|| PublishError::Config("scope is required (e.g. \"@acme\")".into()))?;
        if !scope.starts_with('@') || scope.len() < 2 || scope.contains('/') {
            return Err(PublishError::Config(format!(
                "scope must look like \"@name\", got '{}'",
                scope
            )));
        }

        let assets_repo = config
            .assets_repo
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| PublishError::Config("assetsRepo is required".into()))?;

        let packages_dir = project_path.join(
            config
                .packages_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PACKAGES_DIR)),
        );

        let retry = config.retry.unwrap_or_default();
        let publish_retry = retry
            .publish
            .unwrap_or_default()
            .resolve(RetryOptions::publish());
        let availability_retry = retry
            .availability
            .unwrap_or_default()
            .resolve(RetryOptions::availability());
        if publish_retry.num_attempts == 0 || availability_retry.num_attempts == 0 {
            return Err(PublishError::Config(
                "retry numAttempts must be at least 1".into(),
            ));
        }

        Ok(PublisherSettings {
            registry_url,
            scope,
            packages_dir,
            assets_repo,
            assets_subdir: config.assets_subdir,
            access: config.access.unwrap_or_default(),
            skip_existing_branches: config.skip_existing_branches.unwrap_or(false),
            dry_run: config.dry_run.unwrap_or(false),
            command_timeout: config.command_timeout_secs.map(Duration::from_secs),
            publish_retry,
            availability_retry,
        })
    }
}
