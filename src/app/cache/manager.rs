//! Core download cache with index, verified lookup and eviction
//!
//! All index mutations go through a single async `RwLock` writer, and the
//! index file is rewritten after each mutation so an interrupted process
//! leaves a consistent picture on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::app::digest::{ChecksumVerifier, Digest};
use crate::app::models::{ComponentId, ComponentSpec};
use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

use super::config::CacheConfig;

/// One cached, verified artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Component identity this artifact belongs to
    pub identity: ComponentId,
    /// Absolute path of the stored artifact
    pub path: PathBuf,
    /// Digest the artifact verified against when stored
    pub digest: Digest,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Artifact size in bytes
    pub size: u64,
}

/// Aggregate cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Cache root directory
    pub cache_root: PathBuf,
    /// Number of indexed entries
    pub entry_count: usize,
    /// Total bytes across indexed artifacts
    pub total_bytes: u64,
}

/// Result of an eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries removed because they exceeded the age limit
    pub removed_expired: usize,
    /// Entries removed oldest-first to get under the size budget
    pub removed_for_size: usize,
    /// Bytes freed in total
    pub bytes_freed: u64,
}

/// Content-addressed store of verified download artifacts
#[derive(Debug)]
pub struct DownloadCache {
    config: CacheConfigResolved,
    index: RwLock<HashMap<String, CacheEntry>>,
}

#[derive(Debug)]
struct CacheConfigResolved {
    cache_root: PathBuf,
    max_age_hours: u64,
    max_total_bytes: u64,
}

impl DownloadCache {
    /// Create a cache, resolving the root directory and loading the index
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the cache directory cannot be created or the
    /// existing index file is unreadable.
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let cache_root = match &config.cache_root {
            Some(path) => path.clone(),
            None => Self::default_cache_dir()?,
        };

        Self::ensure_directory_exists(&cache_root).await?;
        Self::ensure_directory_exists(&cache_root.join(cache::OBJECTS_DIR)).await?;
        Self::ensure_directory_exists(&cache_root.join(cache::STAGING_DIR)).await?;

        let index = Self::load_index(&cache_root.join(cache::CACHE_INDEX_FILE)).await?;

        info!(
            "Initialized download cache at {} ({} entries)",
            cache_root.display(),
            index.len()
        );

        Ok(Self {
            config: CacheConfigResolved {
                cache_root,
                max_age_hours: config.max_age_hours,
                max_total_bytes: config.max_total_bytes,
            },
            index: RwLock::new(index),
        })
    }

    /// Cache root directory
    pub fn cache_root(&self) -> &Path {
        &self.config.cache_root
    }

    /// Staging directory for in-flight downloads
    ///
    /// On the same filesystem as the object store, so promotion from
    /// staging is a single atomic rename.
    pub fn staging_dir(&self) -> PathBuf {
        self.config.cache_root.join(cache::STAGING_DIR)
    }

    /// Canonical storage path for a component's artifact
    ///
    /// Content-addressed: keyed by digest so distinct content never
    /// collides, with the original file name kept for readability.
    pub fn artifact_path(&self, spec: &ComponentSpec, digest: &Digest) -> PathBuf {
        self.config
            .cache_root
            .join(cache::OBJECTS_DIR)
            .join(&digest.value[..2])
            .join(&digest.value)
            .join(spec.artifact_file_name())
    }

    /// Get the default cache directory for the current OS
    fn default_cache_dir() -> CacheResult<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| CacheError::DirectoryNotAccessible {
                path: PathBuf::from("system cache directory"),
            })?
            .join("devstrap");
        Ok(cache_dir)
    }

    /// Ensure a directory exists, creating it if necessary
    async fn ensure_directory_exists(path: &Path) -> CacheResult<()> {
        if !path.exists() {
            fs::create_dir_all(path).await.map_err(|e| {
                warn!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: path.to_path_buf(),
                }
            })?;
            debug!("Created cache directory: {}", path.display());
        }
        Ok(())
    }

    async fn load_index(path: &Path) -> CacheResult<HashMap<String, CacheEntry>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| CacheError::IndexCorrupted {
            reason: format!(
                "{} is not valid JSON ({}). Clear the cache directory to rebuild",
                path.display(),
                e
            ),
        })
    }

    async fn persist_index(&self, entries: &HashMap<String, CacheEntry>) -> CacheResult<()> {
        let path = self.config.cache_root.join(cache::CACHE_INDEX_FILE);
        let content =
            serde_json::to_string_pretty(entries).map_err(|e| CacheError::InvalidState {
                reason: format!("index serialization failed: {}", e),
            })?;
        fs::write(&path, content).await?;
        Ok(())
    }

    /// Look up a verified artifact for a component
    ///
    /// Revalidates before serving: the stored digest must match the live
    /// spec's digest, and the file on disk must still hash to it. Stale or
    /// mismatched entries are evicted and `None` is returned.
    pub async fn lookup(&self, spec: &ComponentSpec) -> CacheResult<Option<CacheEntry>> {
        let key = spec.id().to_string();

        let entry = {
            let index = self.index.read().await;
            match index.get(&key) {
                Some(entry) => entry.clone(),
                None => return Ok(None),
            }
        };

        let still_valid = match &spec.digest {
            Some(expected) if *expected == entry.digest => {
                entry.path.exists() && ChecksumVerifier::verify(&entry.path, expected).await?
            }
            // Spec digest changed (or vanished): the cached copy no longer
            // answers for this spec.
            _ => false,
        };

        if still_valid {
            debug!("Cache hit for {}", key);
            return Ok(Some(entry));
        }

        warn!("Evicting stale cache entry for {}", key);
        self.remove_entry(&key).await?;
        Ok(None)
    }

    /// Store a verified artifact for a component
    ///
    /// The file is moved into the content-addressed store if it is not
    /// already there, re-verified, and indexed. Returns the new entry.
    pub async fn put(&self, spec: &ComponentSpec, artifact: &Path) -> CacheResult<CacheEntry> {
        let digest = match &spec.digest {
            Some(digest) => digest.clone(),
            None => {
                return Err(CacheError::InvalidState {
                    reason: format!(
                        "refusing to cache '{}' without a declared digest",
                        spec.name
                    ),
                })
            }
        };

        // Trust but verify: only content that hashes correctly is indexed
        if !ChecksumVerifier::verify(artifact, &digest).await? {
            return Err(CacheError::InvalidState {
                reason: format!(
                    "artifact for '{}' does not match its declared digest",
                    spec.name
                ),
            });
        }

        let canonical = self.artifact_path(spec, &digest);
        if artifact != canonical {
            if let Some(parent) = canonical.parent() {
                Self::ensure_directory_exists(parent).await?;
            }
            fs::rename(artifact, &canonical).await?;
        }

        let size = fs::metadata(&canonical).await?.len();
        let entry = CacheEntry {
            identity: spec.id(),
            path: canonical,
            digest,
            created_at: Utc::now(),
            size,
        };

        let mut index = self.index.write().await;
        index.insert(entry.identity.to_string(), entry.clone());
        self.persist_index(&index).await?;
        drop(index);

        debug!("Cached artifact for {}", entry.identity);
        Ok(entry)
    }

    /// Evict entries by age, then oldest-first until under the size budget
    ///
    /// Expired entries (older than `max_age_hours`) go first; if the
    /// remaining total still exceeds `max_total_bytes` (when non-zero),
    /// the oldest entries are removed until the budget holds.
    pub async fn evict(&self, max_age_hours: u64, max_total_bytes: u64) -> CacheResult<EvictionReport> {
        let mut report = EvictionReport::default();
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours as i64);

        let mut index = self.index.write().await;

        // Age pass
        let expired: Vec<String> = index
            .iter()
            .filter(|(_, entry)| entry.created_at < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(entry) = index.remove(&key) {
                report.removed_expired += 1;
                report.bytes_freed += entry.size;
                let _ = fs::remove_file(&entry.path).await;
            }
        }

        // Size pass, oldest first
        if max_total_bytes > 0 {
            let mut total: u64 = index.values().map(|e| e.size).sum();
            while total > max_total_bytes {
                let oldest_key = match index
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(key, _)| key.clone())
                {
                    Some(key) => key,
                    None => break,
                };
                if let Some(entry) = index.remove(&oldest_key) {
                    total = total.saturating_sub(entry.size);
                    report.removed_for_size += 1;
                    report.bytes_freed += entry.size;
                    let _ = fs::remove_file(&entry.path).await;
                }
            }
        }

        self.persist_index(&index).await?;
        drop(index);

        if report.removed_expired > 0 || report.removed_for_size > 0 {
            info!(
                "Evicted {} expired and {} oversized entries ({} bytes freed)",
                report.removed_expired, report.removed_for_size, report.bytes_freed
            );
        }
        Ok(report)
    }

    /// Evict with the configured policy
    pub async fn evict_with_policy(&self) -> CacheResult<EvictionReport> {
        self.evict(self.config.max_age_hours, self.config.max_total_bytes)
            .await
    }

    /// Aggregate statistics over the index
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;
        CacheStats {
            cache_root: self.config.cache_root.clone(),
            entry_count: index.len(),
            total_bytes: index.values().map(|e| e.size).sum(),
        }
    }

    async fn remove_entry(&self, key: &str) -> CacheResult<()> {
        let mut index = self.index.write().await;
        if let Some(entry) = index.remove(key) {
            let _ = fs::remove_file(&entry.path).await;
            self.persist_index(&index).await?;
        }
        Ok(())
    }

    /// Inject an entry with a custom creation time. Test support for
    /// eviction policies; not part of the public surface.
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, entry: CacheEntry) {
        let mut index = self.index.write().await;
        index.insert(entry.identity.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::digest::DigestAlgorithm;
    use crate::app::models::InstallAction;
    use tempfile::TempDir;

    fn spec_named(name: &str, payload: &[u8]) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            version: "1.0".to_string(),
            url: format!("https://downloads.example.com/{}.bin", name),
            mirrors: Vec::new(),
            digest: Some(ChecksumVerifier::compute_bytes(payload, DigestAlgorithm::Sha256)),
            install: InstallAction {
                program: "/bin/true".to_string(),
                args: Vec::new(),
                creates: Vec::new(),
                post_conditions: Vec::new(),
            },
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            size_estimate: None,
        }
    }

    async fn cache_in(temp: &TempDir) -> DownloadCache {
        DownloadCache::new(CacheConfig::with_cache_root(temp.path().to_path_buf()))
            .await
            .unwrap()
    }

    async fn write_artifact(temp: &TempDir, name: &str, payload: &[u8]) -> PathBuf {
        let path = temp.path().join(format!("{}.download", name));
        fs::write(&path, payload).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_put_then_lookup_roundtrip() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;

        let payload = b"cached artifact";
        let spec = spec_named("tool", payload);
        let artifact = write_artifact(&temp, "tool", payload).await;

        let stored = cache.put(&spec, &artifact).await.unwrap();
        let found = cache.lookup(&spec).await.unwrap().expect("entry");

        assert_eq!(found.digest, stored.digest);
        assert_eq!(found.digest, spec.digest.clone().unwrap());
        assert!(found.path.exists());
        assert!(!artifact.exists()); // Moved into the object store
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;
        let spec = spec_named("ghost", b"never stored");
        assert!(cache.lookup(&spec).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_evicts_on_spec_digest_change() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;

        let payload = b"version one";
        let spec_v1 = spec_named("tool", payload);
        let artifact = write_artifact(&temp, "tool", payload).await;
        cache.put(&spec_v1, &artifact).await.unwrap();

        // Same identity, new digest in the live spec
        let mut spec_v2 = spec_v1.clone();
        spec_v2.digest =
            Some(ChecksumVerifier::compute_bytes(b"version two", DigestAlgorithm::Sha256));

        assert!(cache.lookup(&spec_v2).await.unwrap().is_none());
        // Entry is gone for the old spec too - evicted, not retained
        assert!(cache.lookup(&spec_v1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_evicts_on_disk_corruption() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;

        let payload = b"pristine";
        let spec = spec_named("tool", payload);
        let artifact = write_artifact(&temp, "tool", payload).await;
        let entry = cache.put(&spec, &artifact).await.unwrap();

        // Corrupt the stored artifact behind the cache's back
        fs::write(&entry.path, b"bitrot").await.unwrap();

        assert!(cache.lookup(&spec).await.unwrap().is_none());
        assert!(!entry.path.exists());
    }

    #[tokio::test]
    async fn test_put_rejects_mismatched_artifact() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;

        let spec = spec_named("tool", b"declared content");
        let artifact = write_artifact(&temp, "tool", b"different content").await;

        assert!(cache.put(&spec, &artifact).await.is_err());
        assert!(cache.lookup(&spec).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eviction_by_age() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;

        // Entries aged 1h and 30h; with a 24h limit only the 30h one goes
        for (name, age_hours) in [("fresh", 1i64), ("stale", 30i64)] {
            let payload = name.as_bytes().to_vec();
            let spec = spec_named(name, &payload);
            let artifact = write_artifact(&temp, name, &payload).await;
            cache.put(&spec, &artifact).await.unwrap();

            let mut entry = cache.lookup(&spec).await.unwrap().unwrap();
            entry.created_at = Utc::now() - ChronoDuration::hours(age_hours);
            cache.insert_raw(entry).await;
        }

        let report = cache.evict(24, 0).await.unwrap();
        assert_eq!(report.removed_expired, 1);
        assert_eq!(report.removed_for_size, 0);

        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_eviction_by_size_oldest_first() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp).await;

        // Three 8-byte entries, progressively younger
        for (i, name) in ["oldest", "middle", "newest"].iter().enumerate() {
            let payload = format!("{:8}", name).into_bytes()[..8].to_vec();
            let spec = spec_named(name, &payload);
            let artifact = write_artifact(&temp, name, &payload).await;
            cache.put(&spec, &artifact).await.unwrap();

            let mut entry = cache.lookup(&spec).await.unwrap().unwrap();
            entry.created_at = Utc::now() - ChronoDuration::hours(10 - i as i64);
            cache.insert_raw(entry).await;
        }

        // Budget fits two entries: the oldest must go
        let report = cache.evict(1000, 16).await.unwrap();
        assert_eq!(report.removed_expired, 0);
        assert_eq!(report.removed_for_size, 1);

        let remaining = cache.stats().await;
        assert_eq!(remaining.entry_count, 2);
        assert!(cache
            .lookup(&spec_named("oldest", b"oldest  "))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let payload = b"durable";
        let spec = spec_named("tool", payload);

        {
            let cache = cache_in(&temp).await;
            let artifact = write_artifact(&temp, "tool", payload).await;
            cache.put(&spec, &artifact).await.unwrap();
        }

        let reopened = cache_in(&temp).await;
        assert!(reopened.lookup(&spec).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupted_index_is_reported() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(cache::CACHE_INDEX_FILE), b"{not json")
            .await
            .unwrap();

        let err = DownloadCache::new(CacheConfig::with_cache_root(temp.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::IndexCorrupted { .. }));
    }
}
