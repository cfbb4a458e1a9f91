use std::{io::Write, path::Path};
use tempfile::NamedTempFile;

use crate::error::FolioError;

/// Replace the contents of `path` without ever leaving a partially written file behind.
///
/// The bytes go to a temporary file in the same directory, which is then renamed over `path`.
pub fn atomic_write<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), FolioError> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .ok_or_else(|| FolioError::InvalidPath(path.to_path_buf()))?;
    if !parent.is_dir() {
        return Err(FolioError::NotADirectory(parent.to_path_buf()));
    }
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    tracing::debug!("wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}
