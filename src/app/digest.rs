//! Content digest types and checksum verification
//!
//! Digests are stored as validated lowercase hex strings tagged with their
//! algorithm. Two interchangeable algorithms are supported (MD5 and SHA-256);
//! an unrecognized algorithm name from a catalog is a configuration error,
//! surfaced before any network activity.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use tokio::fs;

use crate::errors::{CacheError, CacheResult, ConfigError, ConfigResult};

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5 (128-bit, 32 hex chars)
    Md5,
    /// SHA-256 (256-bit, 64 hex chars)
    Sha256,
}

impl DigestAlgorithm {
    /// Expected hex string length for this algorithm
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Algorithm name as it appears in catalogs and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(ConfigError::UnsupportedAlgorithm {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A validated content digest: algorithm plus lowercase hex value
///
/// Construction validates length and characters for the declared algorithm,
/// so a `Digest` in hand is always well-formed. Comparison is case-blind
/// because the hex is normalized on entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    /// Digest algorithm
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex representation
    pub value: String,
}

impl Digest {
    /// Create a digest from an algorithm and hex string
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidDigest` if the hex string has the wrong
    /// length for the algorithm or contains non-hex characters.
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> ConfigResult<Self> {
        let normalized = hex.to_ascii_lowercase();
        if normalized.len() != algorithm.hex_len()
            || !normalized.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ConfigError::InvalidDigest {
                algorithm: algorithm.name().to_string(),
                value: hex.to_string(),
            });
        }
        Ok(Self {
            algorithm,
            value: normalized,
        })
    }

    /// Build a digest from raw hash output bytes
    pub fn from_bytes(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        use std::fmt::Write;
        let value = bytes.iter().fold(
            String::with_capacity(algorithm.hex_len()),
            |mut acc, b| {
                let _ = write!(&mut acc, "{:02x}", b);
                acc
            },
        );
        Self { algorithm, value }
    }

    /// Whether the digest value is empty (possible only via deserialization
    /// of hand-edited state; treated as missing for security purposes)
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Checksum computation and comparison over files on disk
///
/// Pure read operations: the verifier never creates, moves or deletes files.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the digest of a file with the given algorithm
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the file cannot be read.
    pub async fn compute(path: &Path, algorithm: DigestAlgorithm) -> CacheResult<Digest> {
        let content = fs::read(path).await.map_err(|e| CacheError::InvalidState {
            reason: format!("Failed to read file for digest calculation: {}", e),
        })?;
        Ok(Self::compute_bytes(&content, algorithm))
    }

    /// Compute the digest of an in-memory buffer
    pub fn compute_bytes(content: &[u8], algorithm: DigestAlgorithm) -> Digest {
        match algorithm {
            DigestAlgorithm::Md5 => {
                let hash = md5::compute(content);
                Digest::from_bytes(algorithm, &hash.0)
            }
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(content);
                Digest::from_bytes(algorithm, &hasher.finalize())
            }
        }
    }

    /// Verify that a file matches an expected digest
    ///
    /// Uses the expected digest's own algorithm, so mixed-algorithm catalogs
    /// verify each component against what it declared.
    pub async fn verify(path: &Path, expected: &Digest) -> CacheResult<bool> {
        let actual = Self::compute(path, expected.algorithm).await?;
        Ok(actual == *expected)
    }
}

/// An incremental digest computation fed chunk by chunk
///
/// Used by the download engine to hash the stream as it is written, avoiding
/// a second full read of large artifacts after the transfer completes.
pub enum StreamingDigest {
    /// MD5 context
    Md5(md5::Context),
    /// SHA-256 context
    Sha256(Sha256),
}

impl StreamingDigest {
    /// Start a streaming digest for the given algorithm
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    /// Feed a chunk of data
    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(chunk),
            Self::Sha256(hasher) => hasher.update(chunk),
        }
    }

    /// Finish and produce the digest
    pub fn finalize(self) -> Digest {
        match self {
            Self::Md5(ctx) => Digest::from_bytes(DigestAlgorithm::Md5, &ctx.compute().0),
            Self::Sha256(hasher) => {
                Digest::from_bytes(DigestAlgorithm::Sha256, &hasher.finalize())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("md5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!(
            "SHA256".parse::<DigestAlgorithm>().unwrap(),
            DigestAlgorithm::Sha256
        );
        assert_eq!(
            "sha-256".parse::<DigestAlgorithm>().unwrap(),
            DigestAlgorithm::Sha256
        );

        let err = "crc32".parse::<DigestAlgorithm>().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedAlgorithm { .. }));
    }

    #[test]
    fn test_digest_validation() {
        let valid = Digest::new(DigestAlgorithm::Md5, "50C9D1C465F3CBFF652BE1509C2E2A4E");
        assert_eq!(
            valid.unwrap().value,
            "50c9d1c465f3cbff652be1509c2e2a4e" // Normalized to lowercase
        );

        // Wrong length for the algorithm
        assert!(Digest::new(DigestAlgorithm::Sha256, "50c9d1c465f3cbff652be1509c2e2a4e").is_err());
        // Non-hex characters
        assert!(Digest::new(DigestAlgorithm::Md5, "zzc9d1c465f3cbff652be1509c2e2a4e").is_err());
        // Empty
        assert!(Digest::new(DigestAlgorithm::Md5, "").is_err());
    }

    #[test]
    fn test_compute_bytes_known_values() {
        let md5 = ChecksumVerifier::compute_bytes(b"hello world", DigestAlgorithm::Md5);
        assert_eq!(md5.value, "5eb63bbbe01eeed093cb22bb8f5acdc3");

        let sha = ChecksumVerifier::compute_bytes(b"hello world", DigestAlgorithm::Sha256);
        assert_eq!(
            sha.value,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_verify_file_roundtrip() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("artifact.bin");
            tokio::fs::write(&path, b"component payload").await.unwrap();

            let expected =
                ChecksumVerifier::compute_bytes(b"component payload", DigestAlgorithm::Sha256);
            assert!(ChecksumVerifier::verify(&path, &expected).await.unwrap());

            let wrong = ChecksumVerifier::compute_bytes(b"other payload", DigestAlgorithm::Sha256);
            assert!(!ChecksumVerifier::verify(&path, &wrong).await.unwrap());
        });
    }

    #[test]
    fn test_streaming_digest_matches_oneshot() {
        let payload = b"streamed in several chunks";
        for algorithm in [DigestAlgorithm::Md5, DigestAlgorithm::Sha256] {
            let mut streaming = StreamingDigest::new(algorithm);
            for chunk in payload.chunks(7) {
                streaming.update(chunk);
            }
            assert_eq!(
                streaming.finalize(),
                ChecksumVerifier::compute_bytes(payload, algorithm)
            );
        }
    }

    #[test]
    fn test_digest_serde_roundtrip() {
        let digest = Digest::new(DigestAlgorithm::Sha256, &"ab".repeat(32)).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert!(json.contains("\"sha256\""));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_display_format() {
        let digest = Digest::new(DigestAlgorithm::Md5, "50c9d1c465f3cbff652be1509c2e2a4e").unwrap();
        assert_eq!(
            digest.to_string(),
            "md5:50c9d1c465f3cbff652be1509c2e2a4e"
        );
    }
}
