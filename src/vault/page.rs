use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    codec::{md::RenderedPage, parse_page, MetaMap, Reference},
    error::FolioError,
    paths::{file_stem_string, TitleKey},
};

/// Hex encoded SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Everything the index knows about one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub path: PathBuf,
    /// Display title, the file stem.
    pub title: String,
    pub fingerprint: String,
    pub metadata: MetaMap,
    pub tags: Vec<String>,
    pub references: Vec<Reference>,
    /// Problems found while reading or parsing. A page with errors is still indexed.
    pub errors: Vec<FolioError>,
}

impl PageRecord {
    pub fn from_content(path: &Path, content: &str) -> PageRecord {
        let parsed = parse_page(content);
        PageRecord {
            path: path.to_path_buf(),
            title: file_stem_string(path),
            fingerprint: fingerprint(content.as_bytes()),
            metadata: parsed.metadata,
            tags: parsed.tags,
            references: parsed.references,
            errors: parsed
                .metadata_error
                .map(FolioError::Metadata)
                .into_iter()
                .collect(),
        }
    }

    fn with_error(path: &Path, fingerprint: String, error: FolioError) -> PageRecord {
        PageRecord {
            path: path.to_path_buf(),
            title: file_stem_string(path),
            fingerprint,
            metadata: MetaMap::default(),
            tags: Vec::new(),
            references: Vec::new(),
            errors: vec![error],
        }
    }

    /// Read and parse the page at `path`. Read failures and oversized files become page errors.
    pub fn load(path: &Path, max_file_size: u64) -> PageRecord {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!("Could not stat page {:?}: {}", path, e);
                return PageRecord::with_error(path, String::new(), e.into());
            }
        };
        if size > max_file_size {
            tracing::warn!(
                "Page {:?} is {} bytes, over the {} byte limit; indexing without content",
                path,
                size,
                max_file_size
            );
            return PageRecord::with_error(
                path,
                fingerprint(format!("oversize:{size}").as_bytes()),
                FolioError::FileTooLarge {
                    path: path.to_path_buf(),
                    size,
                    max: max_file_size,
                },
            );
        }
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Could not read page {:?}: {}", path, e);
                return PageRecord::with_error(path, String::new(), e.into());
            }
        };
        match String::from_utf8(bytes) {
            Ok(content) => PageRecord::from_content(path, &content),
            Err(e) => {
                let lossy = String::from_utf8_lossy(e.as_bytes()).to_string();
                let mut record = PageRecord::from_content(path, &lossy);
                record.fingerprint = fingerprint(e.as_bytes());
                record.errors.push(FolioError::Io(format!(
                    "{path:?} is not valid UTF-8: {}",
                    e.utf8_error()
                )));
                record
            }
        }
    }

    pub fn key(&self) -> TitleKey {
        TitleKey::new(&self.title)
    }

    pub fn header(&self) -> PageHeader {
        PageHeader {
            title: self.title.clone(),
            path: self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageHeader {
    pub title: String,
    pub path: PathBuf,
}

/// A page linking to the page being viewed, and how many times it does so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlink {
    pub title: String,
    pub path: PathBuf,
    pub count: usize,
}

/// A reference target with no page, and the pages that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub target: String,
    pub sources: Vec<PageHeader>,
}

/// Everything needed to display one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub path: PathBuf,
    pub title: String,
    pub raw_content: String,
    pub rendered: RenderedPage,
    pub backlinks: Vec<Backlink>,
}

/// Sort key for titles: case-insensitive, then exact.
pub(crate) fn title_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_from_content() {
        let record = PageRecord::from_content(
            Path::new("/vault/Ada Lovelace.md"),
            "---\ntags: [person]\n---\nWorked with [[Babbage]] and [[babbage|Charles]].",
        );
        assert_eq!(record.title, "Ada Lovelace");
        assert_eq!(record.tags, vec!["person"]);
        assert_eq!(record.references.len(), 2);
        assert!(record.errors.is_empty());
        assert_eq!(record.fingerprint.len(), 64);
    }

    #[test]
    fn test_record_keeps_metadata_error() {
        let record = PageRecord::from_content(Path::new("/v/x.md"), "---\nbad: [\n---\n[[Y]]");
        assert!(matches!(record.errors[0], FolioError::Metadata(_)));
        assert_eq!(record.references.len(), 1);
    }

    #[test]
    fn test_oversize_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.md");
        fs::write(&path, "x".repeat(64)).unwrap();
        let record = PageRecord::load(&path, 16);
        assert!(matches!(
            record.errors[0],
            FolioError::FileTooLarge { size: 64, max: 16, .. }
        ));
        assert_eq!(record.title, "big");

        let record = PageRecord::load(&dir.path().join("gone.md"), 1024);
        assert!(matches!(record.errors[0], FolioError::NotFound(_)));
    }

    #[test]
    fn test_fingerprint_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
