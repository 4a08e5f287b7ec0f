//! Dependency graph for workspace packages

use semver::Version;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::error::{PublishError, Result};

use super::manifest::{MANIFEST_FILENAME, PackageManifest};

/// One publishable package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDetails {
    /// Scoped package name, e.g. `@acme/editor`
    pub name: String,
    /// Package directory
    pub dir: PathBuf,
    pub version: Version,
    /// Direct dependencies on other packages of the same scope
    pub local_deps: BTreeSet<String>,
}

impl PackageDetails {
    /// Name without the `@scope/` prefix
    pub fn unscoped_name(&self) -> &str {
        crate::registry::unscoped_name(&self.name)
    }
}

/// Packages keyed by name, in directory listing order
#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
    packages: Vec<PackageDetails>,
    index: HashMap<String, usize>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from every package directory under `packages_root`.
    ///
    /// Subdirectories without a `package.json` and packages marked private
    /// are skipped. Only dependencies under `scope` are kept as local deps.
    pub async fn load(packages_root: &Path, scope: &str) -> Result<Self> {
        let mut registry = Self::new();

        for entry in WalkDir::new(packages_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                PublishError::Io(std::io::Error::other(format!(
                    "failed to list {}: {}",
                    packages_root.display(),
                    e
                )))
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let Some(details) = Self::load_package(entry.path(), scope).await? else {
                continue;
            };

            tracing::debug!(
                package = %details.name,
                version = %details.version,
                deps = ?details.local_deps,
                "discovered package"
            );
            registry.insert(details);
        }

        Ok(registry)
    }

    async fn load_package(dir: &Path, scope: &str) -> Result<Option<PackageDetails>> {
        let Some(manifest) = PackageManifest::load(dir).await? else {
            return Ok(None);
        };

        if manifest.is_private() {
            tracing::debug!(dir = %dir.display(), name = ?manifest.name, "skipping private package");
            return Ok(None);
        }

        let Some(name) = manifest.name.clone() else {
            return Err(PublishError::Manifest {
                path: dir.join(MANIFEST_FILENAME),
                message: "missing field `name`".to_string(),
            });
        };

        let raw_version = manifest.version.as_deref().unwrap_or_default();
        let version = Version::parse(raw_version).map_err(|e| PublishError::InvalidVersion {
            package: name.clone(),
            version: raw_version.to_string(),
            message: if manifest.version.is_none() {
                "missing field `version`".to_string()
            } else {
                e.to_string()
            },
        })?;

        let local_deps = manifest
            .scoped_dependencies(scope)
            .map(str::to_string)
            .collect();

        Ok(Some(PackageDetails {
            name,
            dir: dir.to_path_buf(),
            version,
            local_deps,
        }))
    }

    /// Insert a package. A package with the same name replaces the earlier
    /// one in place.
    pub fn insert(&mut self, details: PackageDetails) {
        match self.index.get(&details.name) {
            Some(&idx) => self.packages[idx] = details,
            None => {
                self.index.insert(details.name.clone(), self.packages.len());
                self.packages.push(details);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&PackageDetails> {
        self.index.get(name).map(|&idx| &self.packages[idx])
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn by_index(&self, idx: usize) -> &PackageDetails {
        &self.packages[idx]
    }

    /// Packages in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PackageDetails> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl FromIterator<PackageDetails> for PackageRegistry {
    fn from_iter<I: IntoIterator<Item = PackageDetails>>(iter: I) -> Self {
        let mut registry = Self::new();
        for details in iter {
            registry.insert(details);
        }
        registry
    }
}
