//! Component catalog loading and validation
//!
//! A catalog is a TOML file listing the installable components with their
//! download sources, digests, install actions and dependencies. Loading
//! validates every entry up front so malformed specs surface as
//! configuration errors before any network or filesystem work starts.
//!
//! # Catalog format
//!
//! ```toml
//! [[component]]
//! name = "ripgrep"
//! version = "14.1.0"
//! url = "https://downloads.example.com/ripgrep/ripgrep-14.1.0.tar.gz"
//! mirrors = ["https://mirror-a.example.org/ripgrep/ripgrep-14.1.0.tar.gz"]
//! digest = { algorithm = "sha256", value = "..." }
//! dependencies = ["libc-headers"]
//!
//! [component.install]
//! program = "/usr/bin/tar"
//! args = ["-xzf", "{artifact}", "-C", "/usr/local/bin"]
//! creates = ["/usr/local/bin/rg"]
//! post_conditions = [{ type = "file_exists", path = "/usr/local/bin/rg" }]
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::app::digest::Digest;
use crate::app::models::ComponentSpec;
use crate::errors::{ConfigError, ConfigResult};

/// On-disk catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalog entries in declaration order
    #[serde(rename = "component", default)]
    pub components: Vec<ComponentSpec>,
}

impl Catalog {
    /// Load and validate a catalog from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, malformed, or any entry
    /// fails validation.
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let catalog: Catalog = toml::from_str(&content)?;
        catalog.validate()?;

        info!(
            "Loaded catalog with {} components from {}",
            catalog.components.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse and validate a catalog from a TOML string
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validate every entry of the catalog
    ///
    /// Checks name uniqueness, URL syntax, digest well-formedness, and that
    /// every declared dependency names another catalog entry.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for spec in &self.components {
            if spec.name.is_empty() {
                return Err(ConfigError::InvalidComponent {
                    component: "<unnamed>".to_string(),
                    reason: "component name must not be empty".to_string(),
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::InvalidComponent {
                    component: spec.name.clone(),
                    reason: "duplicate component name in catalog".to_string(),
                });
            }
            if let Err(e) = url::Url::parse(&spec.url) {
                return Err(ConfigError::InvalidComponent {
                    component: spec.name.clone(),
                    reason: format!("invalid primary URL '{}': {}", spec.url, e),
                });
            }
            for mirror in &spec.mirrors {
                if let Err(e) = url::Url::parse(mirror) {
                    return Err(ConfigError::InvalidComponent {
                        component: spec.name.clone(),
                        reason: format!("invalid mirror URL '{}': {}", mirror, e),
                    });
                }
            }
            if let Some(digest) = &spec.digest {
                // Re-validate through the constructor so hand-edited values
                // with the wrong length or characters are rejected here.
                Digest::new(digest.algorithm, &digest.value).map_err(|_| {
                    ConfigError::InvalidDigest {
                        algorithm: digest.algorithm.name().to_string(),
                        value: digest.value.clone(),
                    }
                })?;
            }
            if spec.install.program.is_empty() {
                return Err(ConfigError::InvalidComponent {
                    component: spec.name.clone(),
                    reason: "install action program must not be empty".to_string(),
                });
            }
        }

        // Dependency targets must exist in the catalog
        for spec in &self.components {
            for dep in &spec.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(ConfigError::InvalidComponent {
                        component: spec.name.clone(),
                        reason: format!("dependency '{}' is not in the catalog", dep),
                    });
                }
            }
        }

        Ok(())
    }

    /// Look up a component by name
    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Select the named components plus their transitive dependency closure,
    /// preserving catalog declaration order
    ///
    /// With an empty request, the whole catalog is selected.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ComponentNotFound` for names not in the catalog.
    pub fn select(&self, names: &[String]) -> ConfigResult<Vec<ComponentSpec>> {
        if names.is_empty() {
            return Ok(self.components.clone());
        }

        let by_name: HashMap<&str, &ComponentSpec> = self
            .components
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        let mut wanted: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> = VecDeque::new();
        for name in names {
            let spec = by_name
                .get(name.as_str())
                .ok_or_else(|| ConfigError::ComponentNotFound { name: name.clone() })?;
            if wanted.insert(spec.name.as_str()) {
                frontier.push_back(spec.name.as_str());
            }
        }

        while let Some(current) = frontier.pop_front() {
            // Catalog validation guarantees dependencies resolve
            if let Some(spec) = by_name.get(current) {
                for dep in &spec.dependencies {
                    if wanted.insert(dep.as_str()) {
                        frontier.push_back(dep.as_str());
                    }
                }
            }
        }

        let selected = self
            .components
            .iter()
            .filter(|c| wanted.contains(c.name.as_str()))
            .cloned()
            .collect::<Vec<_>>();

        debug!(
            "Selected {} of {} catalog components (requested {})",
            selected.len(),
            self.components.len(),
            names.len()
        );
        Ok(selected)
    }
}
