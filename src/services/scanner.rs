use crate::core::input::ImageInput;
use crate::error::DedupError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Lowercase extensions picked up when walking a directory.
    pub extensions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            extensions: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// A path found while scanning, not yet read.
#[derive(Debug)]
pub enum Discovered {
    File(PathBuf),
    Unreadable { identifier: String, error: io::Error },
}

impl Discovered {
    pub fn identifier(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().to_string(),
            Self::Unreadable { identifier, .. } => identifier.clone(),
        }
    }

    /// Read the file. Failures become pre-failed inputs rather than errors.
    pub fn load(self) -> ImageInput {
        match self {
            Self::File(path) => ImageInput::from_path(&path),
            Self::Unreadable { identifier, error } => {
                ImageInput::failed(identifier, DedupError::Io(error))
            }
        }
    }
}

/// Resolves caller-supplied paths into the files of a batch.
pub struct ScannerService {
    options: ScanOptions,
}

impl ScannerService {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Expand directories and keep explicit files as given.
    ///
    /// Explicit paths are kept whatever their extension, and missing ones are
    /// kept too so that reading them reports the failure. Each path appears once.
    pub fn discover(&self, paths: &[PathBuf]) -> Vec<Discovered> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for root in paths {
            if root.is_dir() {
                self.walk(root, &mut seen, &mut found);
            } else if seen.insert(root.clone()) {
                found.push(Discovered::File(root.clone()));
            }
        }

        log::debug!("Discovered {} path(s)", found.len());
        found
    }

    fn walk(&self, root: &Path, seen: &mut HashSet<PathBuf>, found: &mut Vec<Discovered>) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .max_depth(if self.options.recursive { usize::MAX } else { 1 });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && self.has_image_extension(path)
                        && seen.insert(path.to_path_buf())
                    {
                        found.push(Discovered::File(path.to_path_buf()));
                    }
                }
                Err(e) => {
                    let identifier = e
                        .path()
                        .unwrap_or(root)
                        .to_string_lossy()
                        .to_string();
                    log::warn!("Walk error at {}: {}", identifier, e);
                    found.push(Discovered::Unreadable {
                        identifier,
                        error: e.into(),
                    });
                }
            }
        }
    }

    fn has_image_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.options.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

impl Default for ScannerService {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}
