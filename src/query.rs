//! # Query Service
//!
//! [`VaultService`] is the boundary the rest of an application talks to. It owns the shared
//! [`VaultIndex`] behind a `parking_lot::RwLock` and a `tokio` broadcast channel for
//! [`Event::IndexUpdated`] notifications.
//!
//! Reads take the read lock and always see a whole index, never a half-applied change. Mutating
//! commands do their filesystem work first, then apply the matching [`FileEvent`] under the write
//! lock, so the index is current by the time the command returns. When a file watcher is running
//! as well it will report the same change again; re-applying it is a no-op.
//!
//! Every path argument may be absolute or relative to the vault root, and is rejected with
//! [`FolioError::InvalidPath`] when it resolves outside the vault.
//!
//! ```rust,no_run
//! use folio_core::query::VaultService;
//!
//! let service = VaultService::open("/path/to/vault")?;
//! for broken in service.broken_links_report() {
//!     println!("{} <- {} page(s)", broken.target, broken.sources.len());
//! }
//! let header = service.create_file("", "New Page")?;
//! let view = service.build_page_view(&header.path)?;
//! println!("{}", view.rendered.html_after_toc);
//! # Ok::<(), folio_core::FolioError>(())
//! ```

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::broadcast;

use crate::{
    codec::{render_markdown, RenderedPage},
    config::{ConfigProvider, TomlConfigProvider, VaultConfig},
    error::{CascadeFailure, FolioError},
    event::{Event, FileEvent},
    paths::{ensure_within, file_name_string, file_stem_string, next_free_sibling, validate_name},
    sync::rescan,
    vault::{Backlink, BrokenLink, ChangeReport, FileNode, PageHeader, PageView, VaultIndex},
    writer::atomic_write,
};

/// Result of a rename or move. The move itself always happened when this is returned; dependent
/// pages that could not be rewritten are listed in `failures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameOutcome {
    pub from: PathBuf,
    pub to: PathBuf,
    pub rewritten: Vec<PathBuf>,
    pub failures: Vec<CascadeFailure>,
}

impl RenameOutcome {
    /// The aggregated [`FolioError::RenameCascade`] when any dependent rewrite failed.
    pub fn cascade_error(&self) -> Option<FolioError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(FolioError::RenameCascade(self.failures.clone()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultService {
    index: Arc<RwLock<VaultIndex>>,
    events: broadcast::Sender<Event>,
}

impl VaultService {
    /// Open the vault at `root`, reading `.folio.toml` when present.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<VaultService, FolioError> {
        let config = TomlConfigProvider::for_vault(root.as_ref()).get_config()?;
        VaultService::with_config(root, config)
    }

    pub fn with_config<P: AsRef<Path>>(
        root: P,
        config: VaultConfig,
    ) -> Result<VaultService, FolioError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let index = VaultIndex::build(root, config)?;
        Ok(VaultService {
            index: Arc::new(RwLock::new(index)),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.events.clone()
    }

    /// The shared index, for the sync task.
    pub fn index_handle(&self) -> Arc<RwLock<VaultIndex>> {
        self.index.clone()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, VaultIndex> {
        self.index.read()
    }

    pub fn root(&self) -> PathBuf {
        self.index.read().root().to_path_buf()
    }

    pub fn config(&self) -> VaultConfig {
        self.index.read().config().clone()
    }

    fn resolve_path<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, FolioError> {
        ensure_within(self.index.read().root(), path)
    }

    fn announce(&self, changed: bool) {
        if changed {
            let _ = self.events.send(Event::IndexUpdated);
        }
    }

    /// Apply one filesystem change and notify subscribers when the index changed.
    pub fn apply_change(&self, event: &FileEvent) -> ChangeReport {
        let report = self.index.write().apply_change(event);
        self.announce(report.changed);
        report
    }

    /// Rebuild the index from disk.
    pub fn rescan(&self) -> Result<(), FolioError> {
        rescan(&self.index)?;
        self.announce(true);
        Ok(())
    }

    pub fn get_file_tree(&self) -> FileNode {
        self.index.read().file_tree().clone()
    }

    pub fn get_all_tags(&self) -> Vec<(String, Vec<PageHeader>)> {
        self.index.read().tags()
    }

    pub fn get_all_directory_paths(&self) -> Vec<PathBuf> {
        self.index.read().directory_paths()
    }

    pub fn get_all_pages(&self) -> Vec<PageHeader> {
        self.index.read().pages()
    }

    pub fn backlinks_for<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Backlink>, FolioError> {
        let path = self.resolve_path(path)?;
        Ok(self.index.read().backlinks_for(&path))
    }

    pub fn broken_links_report(&self) -> Vec<BrokenLink> {
        self.index.read().broken_links()
    }

    /// Raw text, rendered page and backlinks of the page at `path`.
    #[tracing::instrument(skip(self, path), fields(path = ?path.as_ref()))]
    pub fn build_page_view<P: AsRef<Path>>(&self, path: P) -> Result<PageView, FolioError> {
        let path = self.resolve_path(path)?;
        let index = self.index.read();
        let record = index
            .page(&path)
            .ok_or_else(|| FolioError::NotFound(format!("No page at {path:?}")))?;
        if let Some(too_large) = record
            .errors
            .iter()
            .find(|e| matches!(e, FolioError::FileTooLarge { .. }))
        {
            return Err(too_large.clone());
        }
        let raw_content = fs::read_to_string(&path)?;
        Ok(PageView {
            title: record.title.clone(),
            rendered: index.render(Some(&path), &raw_content),
            backlinks: index.backlinks_for(&path),
            path,
            raw_content,
        })
    }

    /// Render unsaved text against the current index. Nothing is written or indexed.
    pub fn render_preview(&self, content: &str) -> RenderedPage {
        self.index.read().render(None, content)
    }

    /// Render plain markdown without any vault extensions.
    pub fn render_markdown(&self, content: &str) -> RenderedPage {
        render_markdown(content)
    }

    /// Replace the contents of a page and reindex it before returning.
    pub fn write_page_content<P: AsRef<Path>>(
        &self,
        path: P,
        content: &str,
    ) -> Result<(), FolioError> {
        let path = self.resolve_path(path)?;
        if !self.index.read().config().is_page(&path) {
            return Err(FolioError::InvalidPath(path));
        }
        if path.is_dir() {
            return Err(FolioError::InvalidPath(path));
        }
        let existed = path.exists();
        atomic_write(&path, content.as_bytes())?;
        let event = if existed {
            FileEvent::Modified(path)
        } else {
            FileEvent::Created(path)
        };
        self.apply_change(&event);
        Ok(())
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), FolioError> {
        if !dir.exists() {
            return Err(FolioError::NotFound(format!("No folder at {dir:?}")));
        }
        if !dir.is_dir() {
            return Err(FolioError::NotADirectory(dir.to_path_buf()));
        }
        Ok(())
    }

    /// Create a page named `name` in `parent_dir` with an empty metadata skeleton. The page
    /// extension is added when `name` lacks it. Never overwrites.
    pub fn create_file<P: AsRef<Path>>(
        &self,
        parent_dir: P,
        name: &str,
    ) -> Result<PageHeader, FolioError> {
        let parent = self.resolve_path(parent_dir)?;
        self.ensure_dir(&parent)?;
        let name = validate_name(name)?;
        let extension = self.index.read().config().page_extension.clone();
        let file_name = if self.index.read().config().is_page(name) {
            name.to_string()
        } else {
            format!("{name}.{extension}")
        };
        let path = parent.join(file_name);
        let title = file_stem_string(&path);
        let skeleton = format!("---\ntitle: {}\ntags: []\n---\n", serde_json::to_string(&title)?);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FolioError::AlreadyExists(path))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(skeleton.as_bytes())?;
        drop(file);
        tracing::info!("Created page {:?}", path);

        self.apply_change(&FileEvent::Created(path.clone()));
        Ok(PageHeader { title, path })
    }

    pub fn create_folder<P: AsRef<Path>>(
        &self,
        parent_dir: P,
        name: &str,
    ) -> Result<PathBuf, FolioError> {
        let parent = self.resolve_path(parent_dir)?;
        self.ensure_dir(&parent)?;
        let path = parent.join(validate_name(name)?);
        fs::create_dir(&path).map_err(|e| already_exists_or(e, &path))?;
        tracing::info!("Created folder {:?}", path);
        self.apply_change(&FileEvent::Created(path.clone()));
        Ok(path)
    }

    fn relocate(&self, from: PathBuf, to: PathBuf) -> Result<RenameOutcome, FolioError> {
        if to == from {
            return Ok(RenameOutcome {
                from,
                to,
                rewritten: Vec::new(),
                failures: Vec::new(),
            });
        }
        let reserved = !same_file(&from, &to);
        if reserved {
            reserve_destination(&from, &to)?;
        }
        if let Err(e) = fs::rename(&from, &to) {
            if reserved {
                release_destination(&to);
            }
            return Err(e.into());
        }
        tracing::info!("Moved {:?} to {:?}", from, to);
        let report = self.apply_change(&FileEvent::Renamed(from.clone(), to.clone()));
        Ok(RenameOutcome {
            from,
            to,
            rewritten: report.rewritten,
            failures: report.failures,
        })
    }

    /// Rename a page or folder in place. Renaming a page rewrites every reference to its old
    /// title. A page keeps its extension when `new_name` has none.
    pub fn rename_path<P: AsRef<Path>>(
        &self,
        path: P,
        new_name: &str,
    ) -> Result<RenameOutcome, FolioError> {
        let from = self.existing(path)?;
        let new_name = validate_name(new_name)?;
        let parent = from
            .parent()
            .ok_or_else(|| FolioError::InvalidPath(from.clone()))?;
        let keeps_extension = from.is_file() && Path::new(new_name).extension().is_none();
        let to = match from.extension() {
            Some(ext) if keeps_extension => {
                parent.join(format!("{new_name}.{}", ext.to_string_lossy()))
            }
            _ => parent.join(new_name),
        };
        self.relocate(from, to)
    }

    /// Move a page or folder into `dest_dir`, keeping its name.
    pub fn move_path<P: AsRef<Path>, D: AsRef<Path>>(
        &self,
        path: P,
        dest_dir: D,
    ) -> Result<RenameOutcome, FolioError> {
        let from = self.existing(path)?;
        let dest = self.resolve_path(dest_dir)?;
        self.ensure_dir(&dest)?;
        if dest.starts_with(&from) {
            return Err(FolioError::InvalidPath(dest));
        }
        let to = dest.join(file_name_string(&from));
        self.relocate(from, to)
    }

    /// Copy a page next to itself as `<name> 1`, `<name> 2`, ...
    pub fn duplicate_page<P: AsRef<Path>>(&self, path: P) -> Result<PageHeader, FolioError> {
        let from = self.existing(path)?;
        if !self.index.read().config().is_page(&from) || from.is_dir() {
            return Err(FolioError::InvalidPath(from));
        }
        let to = next_free_sibling(&from);
        fs::copy(&from, &to)?;
        tracing::info!("Duplicated {:?} as {:?}", from, to);
        self.apply_change(&FileEvent::Created(to.clone()));
        Ok(PageHeader {
            title: file_stem_string(&to),
            path: to,
        })
    }

    /// Delete a page, image or folder. Pages referencing deleted pages keep their references,
    /// which become broken.
    pub fn delete_path<P: AsRef<Path>>(&self, path: P) -> Result<(), FolioError> {
        let path = self.existing(path)?;
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        tracing::info!("Deleted {:?}", path);
        self.apply_change(&FileEvent::Removed(path));
        Ok(())
    }

    /// Resolve `path` to an existing entry below the root. The root itself is not accepted.
    fn existing<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, FolioError> {
        let path = self.resolve_path(path)?;
        if path.as_path() == self.index.read().root() {
            return Err(FolioError::InvalidPath(path));
        }
        if !path.exists() {
            return Err(FolioError::NotFound(format!("Nothing at {path:?}")));
        }
        Ok(path)
    }
}

/// True when both paths name the same file, as on case-insensitive filesystems.
fn already_exists_or(e: io::Error, path: &Path) -> FolioError {
    match e.kind() {
        io::ErrorKind::AlreadyExists => FolioError::AlreadyExists(path.to_path_buf()),
        _ => e.into(),
    }
}

/// Exclusively create an empty placeholder at `to` of the same kind as `from`. Fails with
/// [`FolioError::AlreadyExists`] when anything is already there. The rename that follows
/// replaces the placeholder, so a destination created by someone else is never clobbered.
fn reserve_destination(from: &Path, to: &Path) -> Result<(), FolioError> {
    let created = if from.is_dir() {
        fs::create_dir(to)
    } else {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(to)
            .map(drop)
    };
    created.map_err(|e| already_exists_or(e, to))
}

fn release_destination(to: &Path) {
    let removed = if to.is_dir() {
        fs::remove_dir(to)
    } else {
        fs::remove_file(to)
    };
    if let Err(e) = removed {
        tracing::warn!("Could not remove placeholder {:?}: {}", to, e);
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::TestVault;
    use test_log::test;

    fn service(vault: &TestVault) -> VaultService {
        VaultService::open(vault.root()).unwrap()
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let vault = TestVault::with_pages(&[("a.md", "old")]);
        let service = service(&vault);
        let mut rx = service.subscribe();
        let content = "---\ntags: [x]\n---\n# Hello\nSee [[a]].";
        service.write_page_content("a.md", content).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::IndexUpdated);

        let view = service.build_page_view("a.md").unwrap();
        assert_eq!(view.raw_content, content);
        assert_eq!(view.rendered.outline[0].text, "Hello");
        assert_eq!(view.backlinks.len(), 1);
        assert_eq!(service.get_all_tags()[0].0, "x");
    }

    #[test]
    fn test_paths_outside_vault_rejected() {
        let vault = TestVault::with_pages(&[("a.md", "x")]);
        let service = service(&vault);
        assert!(matches!(
            service.write_page_content("../escape.md", "x"),
            Err(FolioError::InvalidPath(_))
        ));
        assert!(matches!(
            service.delete_path(""),
            Err(FolioError::InvalidPath(_))
        ));
        assert!(matches!(
            service.create_file("", "../up"),
            Err(FolioError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_create_file_and_folder() {
        let vault = TestVault::new();
        let service = service(&vault);
        let folder = service.create_folder("", "people").unwrap();
        let header = service.create_file(&folder, "Ada: Countess").unwrap();
        assert_eq!(header.title, "Ada: Countess");
        assert_eq!(header.path, vault.path("people/Ada: Countess.md"));
        let view = service.build_page_view(&header.path).unwrap();
        assert!(view.rendered.metadata_error.is_none());
        assert_eq!(
            view.rendered.metadata.get("title").and_then(|v| v.as_str()),
            Some("Ada: Countess")
        );
        assert!(matches!(
            service.create_file(&folder, "Ada: Countess.md"),
            Err(FolioError::AlreadyExists(_))
        ));
        assert!(matches!(
            service.create_folder("", "people"),
            Err(FolioError::AlreadyExists(_))
        ));
        assert_eq!(
            service.get_all_directory_paths(),
            vec![vault.root().to_path_buf(), folder]
        );
    }

    #[test]
    fn test_rename_path_rewrites() {
        let vault = TestVault::with_pages(&[("Bee.md", "x"), ("a.md", "[[Bee|b]]")]);
        let service = service(&vault);
        let outcome = service.rename_path("Bee.md", "Wasp").unwrap();
        assert_eq!(outcome.to, vault.path("Wasp.md"));
        assert_eq!(outcome.rewritten, vec![vault.path("a.md")]);
        assert!(outcome.cascade_error().is_none());
        assert_eq!(vault.read("a.md"), "[[Wasp|b]]");
        assert!(service.broken_links_report().is_empty());
        assert!(matches!(
            service.rename_path("a.md", "Wasp"),
            Err(FolioError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_reserve_destination_never_clobbers() {
        let vault = TestVault::with_pages(&[("a.md", "mine"), ("b.md", "theirs")]);
        std::fs::create_dir(vault.path("dir")).unwrap();
        assert!(matches!(
            reserve_destination(&vault.path("a.md"), &vault.path("b.md")),
            Err(FolioError::AlreadyExists(p)) if p == vault.path("b.md")
        ));
        assert_eq!(vault.read("b.md"), "theirs");
        assert!(matches!(
            reserve_destination(&vault.path("dir"), &vault.path("b.md")),
            Err(FolioError::AlreadyExists(_))
        ));

        reserve_destination(&vault.path("dir"), &vault.path("dir2")).unwrap();
        assert!(vault.path("dir2").is_dir());
        reserve_destination(&vault.path("a.md"), &vault.path("c.md")).unwrap();
        assert_eq!(vault.read("c.md"), "");
    }

    #[test]
    fn test_relocate_onto_existing_keeps_both() {
        let vault = TestVault::with_pages(&[
            ("a.md", "[[b]]"),
            ("b.md", "theirs"),
            ("sub/a.md", "already here"),
        ]);
        let service = service(&vault);
        assert!(matches!(
            service.rename_path("a.md", "b"),
            Err(FolioError::AlreadyExists(_))
        ));
        assert!(matches!(
            service.move_path("a.md", "sub"),
            Err(FolioError::AlreadyExists(_))
        ));
        assert_eq!(vault.read("a.md"), "[[b]]");
        assert_eq!(vault.read("b.md"), "theirs");
        assert_eq!(vault.read("sub/a.md"), "already here");
        assert!(matches!(
            service.create_folder("", "sub"),
            Err(FolioError::AlreadyExists(_))
        ));

        let outcome = service.move_path("b.md", "sub").unwrap();
        assert_eq!(outcome.to, vault.path("sub/b.md"));
        assert_eq!(vault.read("sub/b.md"), "theirs");
        assert!(!vault.path("b.md").exists());
    }

    #[test]
    fn test_move_duplicate_delete() {
        let vault = TestVault::with_pages(&[("Bee.md", "x"), ("a.md", "[[Bee]]")]);
        let service = service(&vault);
        let folder = service.create_folder("", "insects").unwrap();
        let outcome = service.move_path("Bee.md", &folder).unwrap();
        assert!(outcome.rewritten.is_empty());
        assert_eq!(
            service.backlinks_for("insects/Bee.md").unwrap()[0].title,
            "a"
        );
        assert!(matches!(
            service.move_path("insects", "insects"),
            Err(FolioError::InvalidPath(_))
        ));

        let copy = service.duplicate_page("insects/Bee.md").unwrap();
        assert_eq!(copy.title, "Bee 1");
        assert_eq!(service.duplicate_page("insects/Bee.md").unwrap().title, "Bee 2");

        service.delete_path("insects").unwrap();
        let broken = service.broken_links_report();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].target, "Bee");
        assert_eq!(service.get_all_pages().len(), 1);
    }

    #[test]
    fn test_build_page_view_errors() {
        let vault = TestVault::with_pages(&[("big.md", &"x".repeat(100))]);
        let config = VaultConfig {
            max_file_size: 10,
            ..Default::default()
        };
        let service = VaultService::with_config(vault.root(), config).unwrap();
        assert!(matches!(
            service.build_page_view("big.md"),
            Err(FolioError::FileTooLarge { .. })
        ));
        assert!(matches!(
            service.build_page_view("missing.md"),
            Err(FolioError::NotFound(_))
        ));
    }

    #[test]
    fn test_preview_does_not_persist() {
        let vault = TestVault::with_pages(&[("a.md", "x")]);
        let service = service(&vault);
        let rendered = service.render_preview("[[a]] and [[nowhere]]");
        assert_eq!(rendered.unresolved_links, vec!["nowhere".to_string()]);
        assert!(service.broken_links_report().is_empty());
        assert_eq!(service.get_all_pages().len(), 1);
        assert!(service
            .render_markdown("[[a]]")
            .html_before_toc
            .contains("[[a]]"));
    }
}
