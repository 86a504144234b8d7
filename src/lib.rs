//! Exact and near-duplicate image detection.
//!
//! Exact duplicates share a content digest. Near duplicates are connected
//! components of the "fingerprint distance <= threshold" graph, so membership
//! is transitive through intermediate images.

pub mod config;
pub mod core;
pub mod error;
pub mod services;

pub use crate::config::{ConfigError, Settings};
pub use crate::core::digest::{digest, ContentDigest, DigestAlgorithm};
pub use crate::core::duplicate::{DuplicateGroup, DuplicateReport};
pub use crate::core::fingerprint::{fingerprint, Fingerprint, FingerprintMethod, Fingerprinter};
pub use crate::core::input::ImageInput;
pub use crate::core::metadata::{ExifData, ImageMetadata, MetadataReport};
pub use crate::core::reference::{ReferenceMatch, ReferenceReport};
pub use crate::core::similar::{group_similar, SimilarityGroup, SimilarityReport};
pub use crate::error::{DedupError, ItemError, ItemErrorKind, Result};
pub use crate::services::{DetectionService, ScanOptions, ScannerService, SimilarityOptions};
