use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// A filesystem mutation observed inside the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    /// From path, To path
    Renamed(PathBuf, PathBuf),
}

impl FileEvent {
    /// The path the event is keyed under. Renames are keyed under their destination.
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Created(p) | FileEvent::Modified(p) | FileEvent::Removed(p) => p,
            FileEvent::Renamed(_, to) => to,
        }
    }

    pub fn is_rename(&self) -> bool {
        matches!(self, FileEvent::Renamed(_, _))
    }
}

impl Display for FileEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            FileEvent::Created(p) => write!(f, "Created({p:?})"),
            FileEvent::Modified(p) => write!(f, "Modified({p:?})"),
            FileEvent::Removed(p) => write!(f, "Removed({p:?})"),
            FileEvent::Renamed(from, to) => write!(f, "Renamed({from:?} -> {to:?})"),
        }
    }
}

/// Notifications broadcast to subscribers of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A reindex pass completed and changed the index. Carries no payload; subscribers re-query.
    IndexUpdated,
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Event::IndexUpdated => write!(f, "IndexUpdated"),
        }
    }
}
