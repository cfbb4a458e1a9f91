//! Shared test utilities for vault fixtures

use crate::{config::VaultConfig, vault::VaultIndex};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A throwaway vault directory. The root is canonicalized so paths compare equal to the ones the
/// index records.
pub struct TestVault {
    _dir: TempDir,
    root: PathBuf,
}

impl TestVault {
    pub fn new() -> TestVault {
        init_logging();
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        TestVault { _dir: dir, root }
    }

    /// A vault holding `pages`, given as (relative path, content) pairs.
    pub fn with_pages(pages: &[(&str, &str)]) -> TestVault {
        let vault = TestVault::new();
        for (rel, content) in pages {
            vault.write(rel, content);
        }
        vault
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Write `content` to `rel`, creating parent folders as needed.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn index(&self) -> VaultIndex {
        VaultIndex::build(&self.root, VaultConfig::default()).unwrap()
    }
}
