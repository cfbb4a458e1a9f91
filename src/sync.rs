//! Change synchronization: the path from filesystem events to index mutations.
//!
//! Producers (the file watcher, tests, embedding applications) push [`FileEvent`]s through a
//! [`ChangeSender`] into a bounded channel. One task running [`run_sync_loop`] drains the
//! channel, coalesces each burst with [`EventBatch`], and applies the result to the shared
//! [`VaultIndex`] under its write lock. Each pass that changes the index broadcasts a single
//! [`Event::IndexUpdated`].
//!
//! When the channel is full the event is dropped and counted; the next pass discards whatever it
//! collected and rebuilds the index from disk instead. Watcher errors request the same rescan.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
    },
    time::{sleep_until, Instant},
};

use crate::{
    error::FolioError,
    event::{Event, FileEvent},
    vault::VaultIndex,
};

/// How long the sync task keeps collecting after the first event of a burst.
pub const BATCH_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncMessage {
    Change(FileEvent),
    Rescan,
}

/// Per-path coalescing of pending events. Renames are kept in arrival order and end any
/// coalescing for the paths they touch. A removal is never dropped, even after a Created for
/// the same path.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<FileEvent>,
    pending: HashMap<PathBuf, usize>,
}

fn coalesce(old: &FileEvent, new: FileEvent) -> FileEvent {
    use FileEvent::*;
    match (old, new) {
        (Created(p), Created(_) | Modified(_)) => Created(p.clone()),
        (Removed(p), Created(_) | Modified(_)) => Modified(p.clone()),
        (Modified(_), Created(p) | Modified(p)) => Modified(p),
        (_, Removed(p)) => Removed(p),
        (_, other) => other,
    }
}

impl EventBatch {
    pub fn push(&mut self, event: FileEvent) {
        if let FileEvent::Renamed(from, to) = &event {
            self.pending.remove(from);
            self.pending.remove(to);
            self.events.push(event);
            return;
        }
        let path = event.path().to_path_buf();
        match self.pending.get(&path).copied() {
            Some(idx) => {
                self.events[idx] = coalesce(&self.events[idx], event);
            }
            None => {
                self.pending.insert(path, self.events.len());
                self.events.push(event);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.pending.clear();
    }

    /// Take the coalesced events in order, leaving the batch empty.
    pub fn drain(&mut self) -> Vec<FileEvent> {
        self.pending.clear();
        std::mem::take(&mut self.events)
    }
}

/// Producer half of the change channel.
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::Sender<SyncMessage>,
    dropped: Arc<AtomicUsize>,
}

/// Consumer half of the change channel, handed to [`run_sync_loop`].
#[derive(Debug)]
pub struct ChangeReceiver {
    rx: mpsc::Receiver<SyncMessage>,
    dropped: Arc<AtomicUsize>,
}

pub fn change_channel(capacity: usize) -> (ChangeSender, ChangeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicUsize::new(0));
    (
        ChangeSender {
            tx,
            dropped: dropped.clone(),
        },
        ChangeReceiver { rx, dropped },
    )
}

impl ChangeSender {
    /// Queue `event` without blocking. A full channel drops the event, schedules a rescan and
    /// returns [`FolioError::SyncOverflow`].
    pub fn send(&self, event: FileEvent) -> Result<(), FolioError> {
        match self.tx.try_send(SyncMessage::Change(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
                Err(FolioError::SyncOverflow(dropped))
            }
            Err(TrySendError::Closed(_)) => Err(FolioError::Watcher(
                "change channel closed, sync task is gone".to_string(),
            )),
        }
    }

    /// Ask the sync task to rebuild the index from disk on its next pass.
    pub fn request_rescan(&self) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(SyncMessage::Rescan) {
            // A full channel wakes the task anyway; the counter makes it rescan.
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Rebuild the index from disk and swap it in.
///
/// The build runs under an upgradable read guard: readers keep seeing the current index, while
/// every incremental apply waits until the new index is in place and then runs against it. An
/// apply can therefore never be overwritten by a scan that started before it.
pub fn rescan(index: &RwLock<VaultIndex>) -> Result<(), FolioError> {
    let current = index.upgradable_read();
    let fresh = VaultIndex::build(current.root(), current.config().clone())?;
    let mut current = RwLockUpgradableReadGuard::upgrade(current);
    *current = fresh;
    Ok(())
}

fn apply_batch(index: &RwLock<VaultIndex>, events: Vec<FileEvent>, full_rescan: bool) -> bool {
    if full_rescan {
        return match rescan(index) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[sync] rescan failed: {}", e);
                false
            }
        };
    }
    let mut index = index.write();
    let mut changed = false;
    for event in events.iter() {
        let report = index.apply_change(event);
        for failure in report.failures.iter() {
            tracing::warn!(
                "[sync] {} left {:?} unrewritten: {}",
                event,
                failure.path,
                failure.error
            );
        }
        changed |= report.changed;
    }
    changed
}

/// Consume change messages until every [`ChangeSender`] is dropped.
pub async fn run_sync_loop(
    index: Arc<RwLock<VaultIndex>>,
    mut receiver: ChangeReceiver,
    events: broadcast::Sender<Event>,
    window: Duration,
) {
    tracing::info!("[sync] starting change synchronizer");
    let mut batch = EventBatch::default();
    let mut closed = false;
    while !closed {
        let mut rescan_requested = false;
        match receiver.rx.recv().await {
            Some(SyncMessage::Change(event)) => batch.push(event),
            Some(SyncMessage::Rescan) => rescan_requested = true,
            None => break,
        }
        let deadline = Instant::now() + window;
        loop {
            tokio::select! {
                message = receiver.rx.recv() => match message {
                    Some(SyncMessage::Change(event)) => batch.push(event),
                    Some(SyncMessage::Rescan) => rescan_requested = true,
                    None => {
                        closed = true;
                        break;
                    }
                },
                _ = sleep_until(deadline) => break,
            }
        }

        let dropped = receiver.dropped.swap(0, Ordering::SeqCst);
        if dropped > 0 {
            tracing::warn!("[sync] {}; rebuilding index", FolioError::SyncOverflow(dropped));
            rescan_requested = true;
        }
        if rescan_requested {
            batch.clear();
        }
        let pending = batch.drain();
        if pending.is_empty() && !rescan_requested {
            continue;
        }
        tracing::debug!(
            "[sync] applying {} coalesced events (rescan: {})",
            pending.len(),
            rescan_requested
        );
        let shared = index.clone();
        let changed = match tokio::task::spawn_blocking(move || {
            apply_batch(&shared, pending, rescan_requested)
        })
        .await
        {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!("[sync] apply task failed: {}", e);
                false
            }
        };
        if changed {
            // No receivers is fine.
            let _ = events.send(Event::IndexUpdated);
        }
    }
    tracing::info!("[sync] change channel closed, synchronizer stopping");
}
