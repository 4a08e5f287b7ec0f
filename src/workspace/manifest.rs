//! package.json reading
//!
//! Only the fields needed for ordering and publishing are deserialized; the
//! rest of the document is ignored. `name` and `version` are optional here
//! because private packages may omit them; discovery requires them only for
//! packages it publishes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tokio::fs;

use crate::core::error::{PublishError, Result};

pub const MANIFEST_FILENAME: &str = "package.json";

/// Package.json structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
}

impl PackageManifest {
    /// Load `<dir>/package.json`. Returns `Ok(None)` when the file is absent.
    pub async fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILENAME);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PublishError::Manifest {
                    path,
                    message: e.to_string(),
                });
            }
        };

        let manifest = serde_json::from_str(&content).map_err(|e| PublishError::Manifest {
            path,
            message: e.to_string(),
        })?;

        Ok(Some(manifest))
    }

    pub fn is_private(&self) -> bool {
        self.private == Some(true)
    }

    /// Names of declared dependencies belonging to `scope` (e.g. `@acme`)
    pub fn scoped_dependencies<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.dependencies
            .iter()
            .flat_map(|deps| deps.keys())
            .map(String::as_str)
            .filter(move |name| {
                name.strip_prefix(scope)
                    .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}
