use crate::core::digest::DigestAlgorithm;
use crate::core::fingerprint::FingerprintMethod;
use crate::error::DedupError;
use crate::services::{ScanOptions, SimilarityOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] DedupError),
}

/// Defaults for every command, overridable per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub algorithm: DigestAlgorithm,
    pub width: u32,
    pub threshold: u32,
    pub method: FingerprintMethod,
    /// 0 means one worker per logical CPU.
    pub max_workers: usize,
    pub recursive: bool,
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let similarity = SimilarityOptions::default();
        let scan = ScanOptions::default();
        Self {
            algorithm: DigestAlgorithm::default(),
            width: similarity.width,
            threshold: similarity.threshold,
            method: similarity.method,
            max_workers: 0,
            recursive: scan.recursive,
            extensions: scan.extensions,
        }
    }
}

impl Settings {
    /// `<config_dir>/imgdedup/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("imgdedup").join("config.json"))
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.is_file() => p,
                _ => return Ok(Self::default()),
            },
        };

        let display = path.display().to_string();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display.clone(),
            source,
        })?;
        log::debug!("Loaded settings from {}", display);
        Ok(settings)
    }

    pub fn similarity(&self) -> SimilarityOptions {
        SimilarityOptions {
            width: self.width,
            threshold: self.threshold,
            method: self.method,
        }
    }

    pub fn scan(&self) -> ScanOptions {
        ScanOptions {
            recursive: self.recursive,
            extensions: self
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.similarity().validate()?;
        Ok(())
    }
}
