//! Filesystem collaborator
//!
//! The bridge never touches paths directly. Resolving a resource name,
//! finding a writable directory and reading bytes all go through
//! [`FileUtils`], so hosts with packaged assets can plug in their own
//! storage.
//!
//! [`LocalFileUtils`] is the plain-filesystem implementation used by default.

use crate::config::BridgeConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait FileUtils {
    /// Resolve a resource name to a full path
    ///
    /// Names that cannot be resolved are returned unchanged; the caller
    /// finds out when it tries to open them.
    fn full_path_for(&self, name: &str) -> PathBuf;

    /// Directory the bridge may create temporary files in
    fn writable_path(&self) -> PathBuf;

    /// Read an entire file
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Resolves names against an ordered list of resource roots
#[derive(Debug, Clone, Default)]
pub struct LocalFileUtils {
    roots: Vec<PathBuf>,
    writable: Option<PathBuf>,
}

impl LocalFileUtils {
    pub fn new(roots: Vec<PathBuf>, writable: Option<PathBuf>) -> Self {
        Self { roots, writable }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.resource_roots.clone(), Some(config.writable_dir()))
    }
}

impl FileUtils for LocalFileUtils {
    fn full_path_for(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        self.roots
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| path.to_path_buf())
    }

    fn writable_path(&self) -> PathBuf {
        self.writable.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_absolute_paths_pass_through() {
        let utils = LocalFileUtils::default();
        let abs = std::env::temp_dir().join("whatever.zip");
        assert_eq!(utils.full_path_for(abs.to_str().unwrap()), abs);
    }

    #[test]
    fn test_first_matching_root_wins() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(second.path().join("game.zip"), b"x").unwrap();

        let utils = LocalFileUtils::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            None,
        );
        assert_eq!(
            utils.full_path_for("game.zip"),
            second.path().join("game.zip")
        );

        fs::write(first.path().join("game.zip"), b"y").unwrap();
        assert_eq!(utils.full_path_for("game.zip"), first.path().join("game.zip"));
    }

    #[test]
    fn test_unresolved_name_is_unchanged() {
        let root = tempdir().unwrap();
        let utils = LocalFileUtils::new(vec![root.path().to_path_buf()], None);
        assert_eq!(utils.full_path_for("nope.zip"), PathBuf::from("nope.zip"));
    }

    #[test]
    fn test_writable_path_defaults_to_temp() {
        let utils = LocalFileUtils::default();
        assert_eq!(utils.writable_path(), std::env::temp_dir());

        let dir = tempdir().unwrap();
        let utils = LocalFileUtils::new(Vec::new(), Some(dir.path().to_path_buf()));
        assert_eq!(utils.writable_path(), dir.path());
    }

    #[test]
    fn test_from_config_uses_writable_dir() {
        let dir = tempdir().unwrap();
        let config = BridgeConfig::default().with_writable_path(dir.path());
        assert_eq!(LocalFileUtils::from_config(&config).writable_path(), dir.path());

        let fallback = LocalFileUtils::from_config(&BridgeConfig::default());
        assert_eq!(fallback.writable_path(), std::env::temp_dir());
    }

    #[test]
    fn test_read_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, [0u8, 1, 2, 0]).unwrap();

        let utils = LocalFileUtils::default();
        assert_eq!(utils.read_file(&path).unwrap(), vec![0, 1, 2, 0]);
        assert!(utils.read_file(&dir.path().join("missing")).is_err());
    }
}
