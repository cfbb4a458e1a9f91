//! # Watch Service - Keeping a Vault Index Live
//!
//! [`WatchService`] connects a filesystem watcher to a [`VaultService`] so that edits made outside
//! the application (another editor, a sync client, `git checkout`) show up in the index.
//!
//! ## Threading Model
//!
//! 1. **File Watcher Thread** (from `notify-debouncer-full`)
//!    - Monitors the vault root recursively
//!    - Debounces bursts per path over `debounce_ms` (500ms default)
//!    - Ignores hidden entries (`.git`, `.folio.toml`, editor swap files)
//!    - Translates notify events into [`FileEvent`]s and pushes them into the bounded change
//!      channel without blocking
//!
//! 2. **Sync Task** (on the service's own tokio runtime)
//!    - Runs [`run_sync_loop`]: coalesces, applies under the index write lock, broadcasts
//!      [`Event::IndexUpdated`](crate::event::Event::IndexUpdated)
//!
//! A full channel or a watcher error makes the sync task rebuild the index from disk.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_core::{query::VaultService, watch::WatchService};
//!
//! let service = VaultService::open("/path/to/vault")?;
//! let mut updates = service.subscribe();
//! let _watcher = WatchService::new(service.clone())?;
//! while updates.blocking_recv().is_ok() {
//!     println!("{} broken links", service.broken_links_report().len());
//! }
//! # Ok::<(), folio_core::FolioError>(())
//! ```

use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{ModifyKind, RenameMode},
        Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, Debouncer, FileIdMap,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::{runtime::Runtime, task::JoinHandle};

use crate::{
    error::FolioError,
    event::FileEvent,
    paths::has_hidden_component,
    query::VaultService,
    sync::{change_channel, run_sync_loop, ChangeSender, BATCH_WINDOW},
};

/// A file system watcher with debouncing for a vault
type VaultWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

pub struct WatchService {
    service: VaultService,
    root: PathBuf,
    debouncer: Mutex<Option<VaultWatcher>>,
    sync_handle: Mutex<Option<JoinHandle<()>>>,
    runtime: Runtime,
}

impl WatchService {
    /// Start watching the vault behind `service`.
    pub fn new(service: VaultService) -> Result<Self, FolioError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let config = service.config();
        let root = service.root();
        let (sender, receiver) = change_channel(config.event_capacity);
        let sync_handle = runtime.spawn(run_sync_loop(
            service.index_handle(),
            receiver,
            service.event_sender(),
            BATCH_WINDOW,
        ));

        let callback_root = root.clone();
        let mut debouncer = new_debouncer(
            config.debounce(),
            None,
            move |result: DebounceEventResult| {
                tracing::debug!("[Debouncer] processing debounce event");
                match result {
                    Ok(events) => {
                        let mut queued = 0usize;
                        for event in events.iter() {
                            for change in to_file_events(&callback_root, &event.event) {
                                match sender.send(change) {
                                    Ok(()) => queued += 1,
                                    Err(e) => {
                                        tracing::warn!("[Debouncer] {}", e);
                                    }
                                }
                            }
                        }
                        if queued > 0 {
                            tracing::info!("[Debouncer] {} changes queued", queued);
                        }
                    }
                    Err(errors) => {
                        tracing::error!("Notify debouncer returned errors: {:?}", errors);
                        sender.request_rescan();
                    }
                }
            },
        )?;
        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("Watching vault at {:?}", root);

        Ok(WatchService {
            service,
            root,
            debouncer: Mutex::new(Some(debouncer)),
            sync_handle: Mutex::new(Some(sync_handle)),
            runtime,
        })
    }

    pub fn service(&self) -> &VaultService {
        &self.service
    }

    pub fn is_running(&self) -> bool {
        self.debouncer.lock().is_some()
    }

    /// Stop watching. Changes already queued are still applied.
    pub fn stop(&self) -> Result<(), FolioError> {
        if let Some(mut debouncer) = self.debouncer.lock().take() {
            let unwatch_res = debouncer.watcher().unwatch(&self.root);
            tracing::debug!("Unwatch_res(path: {:?}) = {:?}", self.root, unwatch_res);
            // Dropping the debouncer drops the last change sender, which ends the sync loop.
            drop(debouncer);
            unwatch_res?;
        }
        if let Some(handle) = self.sync_handle.lock().take() {
            if let Err(e) = self.runtime.block_on(handle) {
                tracing::warn!("Sync task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.debouncer.lock().take();
        if let Some(handle) = self.sync_handle.lock().take() {
            handle.abort();
        }
    }
}

fn visible(root: &Path, path: &Path) -> bool {
    path.starts_with(root) && !has_hidden_component(root, path)
}

/// Translate one notify event into vault changes. Hidden paths and paths outside `root` are
/// dropped; a rename into or out of a hidden location becomes a creation or a removal.
pub(crate) fn to_file_events(root: &Path, event: &NotifyEvent) -> Vec<FileEvent> {
    let visible_paths = || {
        event
            .paths
            .iter()
            .filter(|p| visible(root, p))
            .cloned()
            .collect::<Vec<PathBuf>>()
    };
    match event.kind {
        EventKind::Create(_) => visible_paths().into_iter().map(FileEvent::Created).collect(),
        EventKind::Remove(_) => visible_paths().into_iter().map(FileEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let (from, to) = (&event.paths[0], &event.paths[1]);
            match (visible(root, from), visible(root, to)) {
                (true, true) => vec![FileEvent::Renamed(from.clone(), to.clone())],
                (true, false) => vec![FileEvent::Removed(from.clone())],
                (false, true) => vec![FileEvent::Created(to.clone())],
                (false, false) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            visible_paths().into_iter().map(FileEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            visible_paths().into_iter().map(FileEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => visible_paths()
            .into_iter()
            .map(|p| {
                if p.exists() {
                    FileEvent::Created(p)
                } else {
                    FileEvent::Removed(p)
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => Vec::new(),
        EventKind::Modify(_) => visible_paths().into_iter().map(FileEvent::Modified).collect(),
        EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_full::notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn root() -> PathBuf {
        PathBuf::from("/vault")
    }

    fn event(kind: EventKind, paths: &[&str]) -> NotifyEvent {
        paths
            .iter()
            .fold(NotifyEvent::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_kind_mapping() {
        let created = event(EventKind::Create(CreateKind::File), &["/vault/a.md"]);
        assert_eq!(
            to_file_events(&root(), &created),
            vec![FileEvent::Created(PathBuf::from("/vault/a.md"))]
        );
        let modified = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/vault/a.md"],
        );
        assert_eq!(
            to_file_events(&root(), &modified),
            vec![FileEvent::Modified(PathBuf::from("/vault/a.md"))]
        );
        let removed = event(EventKind::Remove(RemoveKind::Any), &["/vault/a.md"]);
        assert_eq!(
            to_file_events(&root(), &removed),
            vec![FileEvent::Removed(PathBuf::from("/vault/a.md"))]
        );
        let touched = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            &["/vault/a.md"],
        );
        assert!(to_file_events(&root(), &touched).is_empty());
    }

    #[test]
    fn test_rename_mapping() {
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/vault/a.md", "/vault/b.md"],
        );
        assert_eq!(
            to_file_events(&root(), &renamed),
            vec![FileEvent::Renamed(
                PathBuf::from("/vault/a.md"),
                PathBuf::from("/vault/b.md")
            )]
        );
        let to_trash = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/vault/a.md", "/vault/.trash/a.md"],
        );
        assert_eq!(
            to_file_events(&root(), &to_trash),
            vec![FileEvent::Removed(PathBuf::from("/vault/a.md"))]
        );
    }

    #[test]
    fn test_hidden_and_outside_filtered() {
        let hidden = event(
            EventKind::Create(CreateKind::File),
            &["/vault/.git/index", "/vault/.a.md.swp", "/elsewhere/a.md"],
        );
        assert!(to_file_events(&root(), &hidden).is_empty());
    }
}
