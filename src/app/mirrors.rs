//! Mirror resolution for download candidates
//!
//! The resolver turns a component spec into an ordered, de-duplicated list
//! of candidate URLs: the primary first, then manually configured mirrors,
//! then alternates auto-derived by substituting the primary host through a
//! configured mirror map. A host that previously served a verified artifact
//! is promoted to the front of the list for subsequent downloads.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::app::models::ComponentSpec;
use crate::constants::http;
use crate::errors::{ConfigError, ConfigResult};

/// Host substitution table: primary host -> alternate hosts serving the
/// same content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorMap {
    /// Alternate hosts keyed by primary host
    #[serde(default)]
    pub hosts: HashMap<String, Vec<String>>,
}

impl MirrorMap {
    /// Load a mirror map from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed. A
    /// missing file is not an error to callers that treat the map as
    /// optional; they should match on `ConfigError::NotFound`.
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = tokio::fs::read_to_string(path).await?;
        let map: MirrorMap = toml::from_str(&content)?;
        Ok(map)
    }

    /// Alternate hosts configured for the given host
    pub fn alternates(&self, host: &str) -> &[String] {
        self.hosts.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the map has any entries
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Orders candidate URLs for a component download
#[derive(Debug)]
pub struct MirrorResolver {
    mirror_map: MirrorMap,
    /// Host of the most recent verified download, promoted on later calls
    preferred_host: RwLock<Option<String>>,
}

impl MirrorResolver {
    /// Create a resolver with the given mirror map
    ///
    /// An empty map disables auto-derivation; candidates then come from the
    /// primary URL and manual mirrors only.
    pub fn new(mirror_map: MirrorMap) -> Self {
        Self {
            mirror_map,
            preferred_host: RwLock::new(None),
        }
    }

    /// Ordered candidate URLs for a component
    ///
    /// Primary first, then manual mirrors, then auto-derived alternates;
    /// de-duplicated. If a previous download verified successfully from some
    /// host, candidates on that host move to the front.
    pub async fn candidates(&self, spec: &ComponentSpec) -> Vec<Url> {
        let mut ordered: Vec<Url> = Vec::new();

        let primary = match Url::parse(&spec.url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Unparseable primary URL for '{}': {}", spec.name, e);
                return ordered;
            }
        };
        ordered.push(primary.clone());

        for mirror in &spec.mirrors {
            match Url::parse(mirror) {
                Ok(url) => ordered.push(url),
                Err(e) => warn!("Skipping unparseable mirror '{}': {}", mirror, e),
            }
        }

        // Auto-derived alternates: substitute the primary host through the
        // mirror map, keeping path and scheme.
        if let Some(primary_host) = primary.host_str() {
            for alternate in self.mirror_map.alternates(primary_host) {
                let mut derived = primary.clone();
                match derived.set_host(Some(alternate)) {
                    Ok(()) => ordered.push(derived),
                    Err(e) => {
                        warn!("Cannot derive mirror on host '{}': {}", alternate, e)
                    }
                }
            }
        }

        // De-duplicate preserving first occurrence
        let mut seen = std::collections::HashSet::new();
        ordered.retain(|url| seen.insert(url.as_str().to_string()));

        // Promote candidates on the last known-good host
        let preferred = self.preferred_host.read().await.clone();
        if let Some(host) = preferred {
            let (mut front, back): (Vec<Url>, Vec<Url>) = ordered
                .into_iter()
                .partition(|url| url.host_str() == Some(host.as_str()));
            front.extend(back);
            ordered = front;
        }

        debug!(
            "Resolved {} candidate URLs for '{}'",
            ordered.len(),
            spec.name
        );
        ordered
    }

    /// Record the host that served a verified artifact
    ///
    /// Later candidate lists put this host first (best-known-mirror-first).
    pub async fn record_success(&self, url: &Url) {
        if let Some(host) = url.host_str() {
            let mut preferred = self.preferred_host.write().await;
            *preferred = Some(host.to_string());
        }
    }

    /// Probe a URL for reachability with a bounded timeout
    ///
    /// Diagnostics only: a failed probe never removes a candidate, and a
    /// successful one guarantees nothing about the eventual download.
    pub async fn probe(&self, client: &reqwest::Client, url: &Url) -> bool {
        let request = client.head(url.as_str()).send();
        match tokio::time::timeout(http::PROBE_TIMEOUT, request).await {
            Ok(Ok(response)) => {
                let reachable = response.status().is_success() || response.status().is_redirection();
                debug!("Probe {} -> {} ", url, response.status());
                reachable
            }
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
            Err(_) => {
                debug!("Probe {} timed out", url);
                false
            }
        }
    }
}
