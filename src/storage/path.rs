//! SQLite file location
//!
//! Read-only deployments cannot write next to the install directory, so the
//! bundled `data.db` is seeded into a scratch directory and used from there.
//! The seed copy is a plain `fs::copy`: a crash mid-copy leaves a partial file
//! that later resolutions will pick up as an existing scratch copy.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub const DATABASE_FILE_NAME: &str = "data.db";

/// Where the resolved database file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    /// The install directory copy, used directly
    Base,
    /// A scratch copy left by an earlier resolution
    Scratch,
    /// A scratch copy seeded from the base file during this resolution
    Seeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub source: PathSource,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
    scratch_dir: PathBuf,
    read_only_fallback: bool,
}

impl PathResolver {
    pub fn new(base_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            scratch_dir: scratch_dir.into(),
            read_only_fallback: false,
        }
    }

    pub fn with_read_only_fallback(mut self, enabled: bool) -> Self {
        self.read_only_fallback = enabled;
        self
    }

    pub fn base_path(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE_NAME)
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.scratch_dir.join(DATABASE_FILE_NAME)
    }

    /// Resolve the database file.
    ///
    /// Without the fallback this is always the base path. With it, in order:
    /// an existing scratch copy, else a fresh copy of the base file, else
    /// `DataFileNotFound`.
    pub fn resolve(&self) -> Result<ResolvedPath> {
        let base = self.base_path();
        if !self.read_only_fallback {
            return Ok(ResolvedPath { path: base, source: PathSource::Base });
        }

        let scratch = self.scratch_path();
        if scratch.exists() {
            tracing::debug!("Using existing scratch database {}", scratch.display());
            return Ok(ResolvedPath { path: scratch, source: PathSource::Scratch });
        }

        if base.exists() {
            seed_copy(&base, &scratch)?;
            return Ok(ResolvedPath { path: scratch, source: PathSource::Seeded });
        }

        Err(Error::DataFileNotFound(base))
    }
}

fn seed_copy(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let bytes = std::fs::copy(from, to)?;
    tracing::warn!(
        "Read-only deployment: seeded {} from {} ({} bytes)",
        to.display(),
        from.display(),
        bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dirs() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn test_no_fallback_uses_base_path() {
        let (base, scratch) = dirs();
        let resolver = PathResolver::new(base.path(), scratch.path());

        let resolved = resolver.resolve().unwrap();
        assert_eq!(resolved.path, base.path().join("data.db"));
        assert_eq!(resolved.source, PathSource::Base);
        assert!(!scratch.path().join("data.db").exists());
    }

    #[test]
    fn test_existing_scratch_copy_wins() {
        let (base, scratch) = dirs();
        std::fs::write(base.path().join("data.db"), b"base").unwrap();
        std::fs::write(scratch.path().join("data.db"), b"scratch").unwrap();

        let resolver = PathResolver::new(base.path(), scratch.path()).with_read_only_fallback(true);
        let resolved = resolver.resolve().unwrap();

        assert_eq!(resolved.source, PathSource::Scratch);
        assert_eq!(std::fs::read(&resolved.path).unwrap(), b"scratch");
        assert_eq!(std::fs::read(base.path().join("data.db")).unwrap(), b"base");
    }

    #[test]
    fn test_base_file_is_seeded_into_scratch() {
        let (base, scratch) = dirs();
        let content: Vec<u8> = (0..=255u8).cycle().take(8192).collect();
        std::fs::write(base.path().join("data.db"), &content).unwrap();

        let resolver = PathResolver::new(base.path(), scratch.path()).with_read_only_fallback(true);
        let resolved = resolver.resolve().unwrap();

        assert_eq!(resolved.path, scratch.path().join("data.db"));
        assert_eq!(resolved.source, PathSource::Seeded);
        assert_eq!(std::fs::read(&resolved.path).unwrap(), content);

        // second resolution reuses the copy
        assert_eq!(resolver.resolve().unwrap().source, PathSource::Scratch);
    }

    #[test]
    fn test_missing_seed_file() {
        let (base, scratch) = dirs();
        let resolver = PathResolver::new(base.path(), scratch.path()).with_read_only_fallback(true);

        match resolver.resolve() {
            Err(Error::DataFileNotFound(path)) => assert_eq!(path, base.path().join("data.db")),
            other => panic!("expected DataFileNotFound, got {:?}", other),
        }
        assert!(!scratch.path().join("data.db").exists());
    }
}
