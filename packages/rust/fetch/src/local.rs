//! Directory-backed source for offline runs.

use std::path::PathBuf;

use feedbuilder_shared::{FeedBuilderError, Result};

use crate::RemoteSource;

/// Reads listed documents from a local directory instead of a server.
#[derive(Debug, Clone)]
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RemoteSource for LocalSource {
    fn describe(&self) -> String {
        format!("file://{}", self.dir.display())
    }

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        std::fs::read(&path).map_err(|e| FeedBuilderError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("products-1.xml"), "<products/>").unwrap();

        let mut source = LocalSource::new(dir.path());
        assert_eq!(source.retrieve("products-1.xml").unwrap(), b"<products/>");
        assert!(source.describe().starts_with("file://"));

        let err = source.retrieve("absent.xml").unwrap_err();
        assert!(matches!(err, FeedBuilderError::Io { .. }));
    }
}
