use crate::error::DedupError;
use std::fs;
use std::path::Path;

/// One image of a batch: a caller-supplied identifier and its raw bytes.
///
/// Inputs whose bytes could not be obtained (unreadable path, failed upload)
/// are carried as pre-failed items so the batch still reports them.
#[derive(Debug)]
pub struct ImageInput {
    identifier: String,
    content: Result<Vec<u8>, DedupError>,
}

impl ImageInput {
    pub fn new(identifier: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            content: Ok(bytes),
        }
    }

    pub fn failed(identifier: impl Into<String>, error: DedupError) -> Self {
        Self {
            identifier: identifier.into(),
            content: Err(error),
        }
    }

    /// Read a file, using its display path as the identifier.
    pub fn from_path(path: &Path) -> Self {
        let identifier = path.to_string_lossy().to_string();
        match fs::read(path) {
            Ok(bytes) => Self::new(identifier, bytes),
            Err(e) => Self::failed(identifier, DedupError::Io(e)),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn bytes(&self) -> Result<&[u8], &DedupError> {
        self.content.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.content.is_err()
    }

    /// Run `f` over the bytes, or replay the pre-failure as an error of the same kind.
    pub(crate) fn process<T>(
        &self,
        f: impl FnOnce(&[u8]) -> Result<T, DedupError>,
    ) -> Result<T, DedupError> {
        match &self.content {
            Ok(bytes) => f(bytes),
            Err(DedupError::Io(e)) => Err(DedupError::Io(std::io::Error::new(
                e.kind(),
                e.to_string(),
            ))),
            Err(DedupError::Decode(m)) => Err(DedupError::Decode(m.clone())),
            Err(DedupError::UnsupportedFormat(m)) => {
                Err(DedupError::UnsupportedFormat(m.clone()))
            }
            Err(DedupError::Validation(m)) => Err(DedupError::Validation(m.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_path_reads_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("a.bin");
        fs::write(&file_path, b"abc").unwrap();

        let input = ImageInput::from_path(&file_path);
        assert_eq!(input.identifier(), file_path.to_string_lossy());
        assert_eq!(input.bytes().unwrap(), b"abc");
        assert!(!input.is_failed());
    }

    #[test]
    fn test_from_missing_path_is_prefailed() {
        let input = ImageInput::from_path(Path::new("/non/existent/file.jpg"));
        assert!(input.is_failed());
        assert!(matches!(input.bytes(), Err(DedupError::Io(_))));

        let replayed = input.process(|b| Ok(b.len()));
        assert!(matches!(replayed, Err(DedupError::Io(_))));
    }
}
