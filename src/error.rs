use std::{fmt, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

/// A malformed metadata block. Positions are 1-based and relative to the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "{} (line {}, column {})", self.message, line, column)
            }
            (Some(line), None) => write!(f, "{} (line {})", self.message, line),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// One dependent page that could not be rewritten during a rename cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeFailure {
    pub path: PathBuf,
    pub error: FolioError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum FolioError {
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Path already exists: {0:?}")]
    AlreadyExists(PathBuf),
    #[error("Path is outside of the vault or malformed: {0:?}")]
    InvalidPath(PathBuf),
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error("File {path:?} is {size} bytes, larger than the {max} byte limit")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("Metadata error: {0}")]
    Metadata(MetadataError),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File watcher error: {0}")]
    Watcher(String),
    #[error("Change event channel overflowed, {0} events dropped")]
    SyncOverflow(usize),
    #[error("Rename committed but {} dependent page(s) could not be rewritten", .0.len())]
    RenameCascade(Vec<CascadeFailure>),
}

impl From<MetadataError> for FolioError {
    fn from(src: MetadataError) -> FolioError {
        FolioError::Metadata(src)
    }
}

impl From<toml::de::Error> for FolioError {
    fn from(src: toml::de::Error) -> FolioError {
        FolioError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for FolioError {
    fn from(src: toml::ser::Error) -> FolioError {
        FolioError::Config(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for FolioError {
    fn from(src: JsonError) -> FolioError {
        FolioError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for FolioError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => FolioError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => FolioError::PermissionDenied,
            _ => FolioError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<tempfile::PersistError> for FolioError {
    fn from(x: tempfile::PersistError) -> Self {
        FolioError::from(x.error)
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for FolioError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => FolioError::Watcher(format!(
                "notify-debouncer: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => FolioError::Watcher(format!(
                "notify-debouncer: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => FolioError::NotFound(format!(
                "notify-debouncer: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => FolioError::NotFound(format!(
                "notify-debouncer: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                FolioError::Watcher("notify-debouncer invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                FolioError::Watcher("notify-debouncer max file watch limit reached".to_string())
            }
        }
    }
}
