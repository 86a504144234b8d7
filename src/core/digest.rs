use crate::error::DedupError;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Content digest algorithms accepted for exact-duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Number of hex digits in a digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }

    pub fn digest(&self, bytes: &[u8]) -> ContentDigest {
        let hex = match self {
            Self::Md5 => format!("{:x}", md5::compute(bytes)),
            Self::Sha1 => format!("{:x}", Sha1::digest(bytes)),
            Self::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        };
        debug_assert_eq!(hex.len(), self.hex_len());
        ContentDigest(hex)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|alg| alg.name() == wanted)
            .ok_or_else(|| {
                DedupError::validation(format!(
                    "unknown digest algorithm '{}', expected one of md5, sha1, sha256",
                    s
                ))
            })
    }
}

/// Lowercase hex digest of a file's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(pub String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest `bytes` with the algorithm named by `algorithm`.
pub fn digest(bytes: &[u8], algorithm: &str) -> Result<ContentDigest, DedupError> {
    Ok(algorithm.parse::<DigestAlgorithm>()?.digest(bytes))
}
