use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use walkdir::WalkDir;

use crate::{
    codec::{render_page, wikilink::rewrite_references, LinkLookup, RenderContext, RenderedPage},
    config::VaultConfig,
    error::{CascadeFailure, FolioError},
    event::FileEvent,
    paths::{file_stem_string, has_hidden_component, is_hidden, TitleKey},
    vault::{
        graph::LinkGraph,
        page::{title_order, Backlink, BrokenLink, PageHeader, PageRecord},
        tree::{FileNode, NodeKind},
    },
    writer::atomic_write,
};

/// What a single applied change did to the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// True when any part of the index changed.
    pub changed: bool,
    /// Pages that were (re)indexed.
    pub updated: Vec<PathBuf>,
    /// Dependent pages whose references were rewritten on disk by a rename.
    pub rewritten: Vec<PathBuf>,
    /// Dependent pages that could not be rewritten. The rename itself still happened.
    pub failures: Vec<CascadeFailure>,
}

impl ChangeReport {
    fn merge(&mut self, other: ChangeReport) {
        self.changed |= other.changed;
        self.updated.extend(other.updated);
        self.rewritten.extend(other.rewritten);
        self.failures.extend(other.failures);
    }
}

/// The in-memory model of one vault: page records, title and tag lookups, the reference graph
/// and the file tree.
///
/// All of these are derived from the page records and change together: every public mutation
/// leaves the lookups, both graph views and the broken set consistent with `pages`.
/// [`VaultIndex::check_consistency`] recomputes them from scratch to verify it.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultIndex {
    root: PathBuf,
    config: VaultConfig,
    pages: BTreeMap<PathBuf, PageRecord>,
    titles: BTreeMap<TitleKey, BTreeSet<PathBuf>>,
    tags: BTreeMap<String, BTreeSet<PathBuf>>,
    graph: LinkGraph,
    tree: FileNode,
}

impl VaultIndex {
    /// An empty index for the vault at `root`. The root must be an existing directory.
    pub fn new<P: AsRef<Path>>(root: P, config: VaultConfig) -> Result<VaultIndex, FolioError> {
        let root = fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(FolioError::NotADirectory(root));
        }
        Ok(VaultIndex {
            tree: FileNode::new(&root, NodeKind::Directory),
            root,
            config,
            pages: BTreeMap::new(),
            titles: BTreeMap::new(),
            tags: BTreeMap::new(),
            graph: LinkGraph::default(),
        })
    }

    /// Create and fully scan an index for the vault at `root`.
    pub fn build<P: AsRef<Path>>(root: P, config: VaultConfig) -> Result<VaultIndex, FolioError> {
        let mut index = VaultIndex::new(root, config)?;
        index.full_scan();
        Ok(index)
    }

    /// Discard everything and rebuild from disk.
    #[tracing::instrument(skip(self), fields(root = ?self.root))]
    pub fn full_scan(&mut self) {
        let start = Instant::now();
        self.pages.clear();
        self.titles.clear();
        self.tags.clear();
        self.graph = LinkGraph::default();
        self.tree = FileNode::new(&self.root, NodeKind::Directory);
        let root = self.root.clone();
        let (_, touched) = self.scan_dir(&root);
        self.refresh_broken(touched);
        let with_errors = self.pages.values().filter(|p| !p.errors.is_empty()).count();
        tracing::info!(
            "[full_scan] indexed {} pages ({} with errors), {} references, {} broken targets in {:?}",
            self.pages.len(),
            with_errors,
            self.graph.edge_count(),
            self.graph.broken().len(),
            start.elapsed()
        );
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn in_vault(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && path != self.root && !has_hidden_component(&self.root, path)
    }

    /// Apply one filesystem change. Paths outside the vault and hidden paths are ignored.
    #[tracing::instrument(skip(self))]
    pub fn apply_change(&mut self, event: &FileEvent) -> ChangeReport {
        let report = match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => self.refresh_path(path),
            FileEvent::Removed(path) => self.remove_path(path),
            FileEvent::Renamed(from, to) => self.rename(from, to),
        };
        if report.changed {
            tracing::info!(
                "[apply_change] {}: {} updated, {} rewritten, {} failed",
                event,
                report.updated.len(),
                report.rewritten.len(),
                report.failures.len()
            );
        }
        report
    }

    /// Bring `path` in line with the filesystem: index it if it exists, drop it otherwise.
    pub fn refresh_path(&mut self, path: &Path) -> ChangeReport {
        if !self.in_vault(path) {
            return ChangeReport::default();
        }
        if !path.exists() {
            return self.remove_path(path);
        }
        let (changed, touched) = if path.is_dir() {
            self.scan_dir(path)
        } else {
            self.index_file(path)
        };
        self.refresh_broken(touched);
        ChangeReport {
            changed,
            updated: if changed && !path.is_dir() && self.pages.contains_key(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }

    fn index_file(&mut self, path: &Path) -> (bool, BTreeSet<TitleKey>) {
        if self.config.is_page(path) {
            let record = PageRecord::load(path, self.config.max_file_size);
            if let Some(existing) = self.pages.get(path) {
                if !record.fingerprint.is_empty() && existing.fingerprint == record.fingerprint {
                    tracing::trace!("{:?} unchanged, skipping", path);
                    return (false, BTreeSet::new());
                }
            }
            (true, self.insert_record(record))
        } else if self.config.is_image(path) {
            let known = self
                .tree
                .find(path)
                .map(|n| n.kind == NodeKind::Image)
                .unwrap_or(false);
            if !known {
                self.tree.insert(path, NodeKind::Image);
            }
            (!known, BTreeSet::new())
        } else {
            (false, BTreeSet::new())
        }
    }

    fn scan_dir(&mut self, dir: &Path) -> (bool, BTreeSet<TitleKey>) {
        let mut changed = false;
        let mut touched = BTreeSet::new();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {:?}: {}", dir, e);
                    continue;
                }
            };
            let path = entry.path();
            if path == self.root {
                continue;
            }
            if entry.file_type().is_dir() {
                if self.tree.find(path).map(|n| n.is_dir()) != Some(true) {
                    self.tree.insert(path, NodeKind::Directory);
                    changed = true;
                }
            } else {
                let (file_changed, file_touched) = self.index_file(path);
                changed |= file_changed;
                touched.extend(file_touched);
            }
        }
        (changed, touched)
    }

    /// Add or replace a record, keeping every derived lookup in step. Returns the title keys
    /// whose resolution or inbound edges may have changed.
    fn insert_record(&mut self, record: PageRecord) -> BTreeSet<TitleKey> {
        let key = record.key();
        if let Some(old) = self.pages.remove(&record.path) {
            self.unindex_tags(&old);
        }
        for tag in record.tags.iter() {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(record.path.clone());
        }
        self.titles
            .entry(key.clone())
            .or_default()
            .insert(record.path.clone());
        let mut touched = self.graph.set_outbound(&record.path, &record.references);
        touched.insert(key);
        self.tree.insert(&record.path, NodeKind::Page);
        self.pages.insert(record.path.clone(), record);
        touched
    }

    fn remove_record(&mut self, path: &Path) -> Option<(PageRecord, BTreeSet<TitleKey>)> {
        let record = self.pages.remove(path)?;
        self.unindex_tags(&record);
        let key = record.key();
        if let Some(paths) = self.titles.get_mut(&key) {
            paths.remove(path);
            if paths.is_empty() {
                self.titles.remove(&key);
            }
        }
        let mut touched = self.graph.remove_source(path);
        touched.insert(key);
        self.tree.remove(path);
        Some((record, touched))
    }

    fn unindex_tags(&mut self, record: &PageRecord) {
        for tag in record.tags.iter() {
            if let Some(paths) = self.tags.get_mut(tag) {
                paths.remove(&record.path);
                if paths.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn refresh_broken(&mut self, keys: BTreeSet<TitleKey>) {
        for key in keys {
            let resolvable = self.titles.contains_key(&key);
            self.graph.refresh_broken(&key, resolvable);
        }
    }

    /// Drop `path` from the index. A directory takes every page and image beneath it along.
    pub fn remove_path(&mut self, path: &Path) -> ChangeReport {
        let doomed: Vec<PathBuf> = self
            .pages
            .range(path.to_path_buf()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p.clone())
            .collect();
        let mut touched = BTreeSet::new();
        for page in doomed.iter() {
            if let Some((_, keys)) = self.remove_record(page) {
                touched.extend(keys);
            }
        }
        let removed_node = self.tree.remove(path).is_some();
        self.refresh_broken(touched);
        ChangeReport {
            changed: removed_node || !doomed.is_empty(),
            updated: doomed,
            ..Default::default()
        }
    }

    /// Move `from` to `to` in the index. When a page's title changes and it was the page its old
    /// title resolved to, every page referencing the old title is rewritten on disk to use the
    /// new one. Each rewrite is attempted independently; failures are collected in the report.
    pub fn rename(&mut self, from: &Path, to: &Path) -> ChangeReport {
        if from == to {
            return self.refresh_path(to);
        }
        if !self.in_vault(to) || !to.exists() {
            return self.remove_path(from);
        }
        if to.is_dir() || !self.pages.contains_key(from) || !self.config.is_page(to) {
            // Folders keep their pages' titles, and unknown sources have no dependents.
            let mut report = self.remove_path(from);
            report.merge(self.refresh_path(to));
            return report;
        }

        let Some(old_title) = self.pages.get(from).map(|r| r.title.clone()) else {
            return ChangeReport::default();
        };
        let old_key = TitleKey::new(&old_title);
        let new_title = file_stem_string(to);
        let was_target = self.resolve_key(&old_key) == Some(from);
        let dependents: Vec<PathBuf> = if was_target && old_title != new_title {
            self.graph
                .sources(&old_key)
                .map(|sources| {
                    sources
                        .keys()
                        .map(|p| if p == from { to.to_path_buf() } else { p.clone() })
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut touched = self
            .remove_record(from)
            .map(|(_, keys)| keys)
            .unwrap_or_default();
        let (_, moved) = self.index_file(to);
        touched.extend(moved);

        let mut report = ChangeReport {
            changed: true,
            updated: vec![to.to_path_buf()],
            ..Default::default()
        };
        for dependent in dependents {
            match rewrite_dependent(&dependent, &old_title, &new_title) {
                Ok(true) => {
                    let (_, keys) = self.index_file(&dependent);
                    touched.extend(keys);
                    report.rewritten.push(dependent);
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(
                        "Could not rewrite references to '{}' in {:?}: {}",
                        old_title,
                        dependent,
                        error
                    );
                    report.failures.push(CascadeFailure {
                        path: dependent,
                        error,
                    });
                }
            }
        }
        self.refresh_broken(touched);
        report
    }

    fn resolve_key(&self, key: &TitleKey) -> Option<&Path> {
        self.titles
            .get(key)
            .and_then(|paths| paths.iter().next())
            .map(PathBuf::as_path)
    }

    /// The page a reference target resolves to. Matching is case-insensitive on the NFC form of
    /// the trimmed title; among pages sharing a title the first by path wins.
    pub fn resolve(&self, target: &str) -> Option<&Path> {
        self.resolve_key(&TitleKey::new(target))
    }

    pub fn page(&self, path: &Path) -> Option<&PageRecord> {
        self.pages.get(path)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Every page, ordered by title.
    pub fn pages(&self) -> Vec<PageHeader> {
        let mut headers: Vec<PageHeader> = self.pages.values().map(PageRecord::header).collect();
        sort_headers(&mut headers);
        headers
    }

    /// Pages referencing the page at `path`, with per-page occurrence counts, ordered by title.
    /// A page that shares its title with an earlier page by path has no backlinks.
    pub fn backlinks_for(&self, path: &Path) -> Vec<Backlink> {
        let Some(record) = self.pages.get(path) else {
            return Vec::new();
        };
        let key = record.key();
        if self.resolve_key(&key) != Some(path) {
            return Vec::new();
        }
        let mut backlinks: Vec<Backlink> = self
            .graph
            .sources(&key)
            .into_iter()
            .flatten()
            .filter_map(|(source, count)| {
                self.pages.get(source).map(|page| Backlink {
                    title: page.title.clone(),
                    path: source.clone(),
                    count: *count,
                })
            })
            .collect();
        backlinks.sort_by(|a, b| title_order(&a.title, &b.title).then_with(|| a.path.cmp(&b.path)));
        backlinks
    }

    /// Unresolved targets, ordered case-insensitively, each with the pages referencing it.
    pub fn broken_links(&self) -> Vec<BrokenLink> {
        let mut broken: Vec<BrokenLink> = self
            .graph
            .broken()
            .iter()
            .map(|key| {
                let mut sources: Vec<PageHeader> = self
                    .graph
                    .sources(key)
                    .into_iter()
                    .flatten()
                    .filter_map(|(source, _)| self.pages.get(source).map(PageRecord::header))
                    .collect();
                sort_headers(&mut sources);
                BrokenLink {
                    target: self
                        .graph
                        .spelling(key)
                        .map(str::to_string)
                        .unwrap_or_else(|| key.to_string()),
                    sources,
                }
            })
            .collect();
        broken.sort_by(|a, b| title_order(&a.target, &b.target));
        broken
    }

    /// Every tag with its pages, tags in name order and pages by title.
    pub fn tags(&self) -> Vec<(String, Vec<PageHeader>)> {
        self.tags
            .iter()
            .map(|(tag, paths)| {
                let mut headers: Vec<PageHeader> = paths
                    .iter()
                    .filter_map(|p| self.pages.get(p).map(PageRecord::header))
                    .collect();
                sort_headers(&mut headers);
                (tag.clone(), headers)
            })
            .collect()
    }

    pub fn directory_paths(&self) -> Vec<PathBuf> {
        self.tree.directory_paths()
    }

    pub fn file_tree(&self) -> &FileNode {
        &self.tree
    }

    pub fn graph(&self) -> &LinkGraph {
        &self.graph
    }

    /// Render `content` as if it were the page at `path`, resolving against this index.
    pub fn render(&self, path: Option<&Path>, content: &str) -> RenderedPage {
        let ctx = RenderContext {
            links: self,
            vault_root: &self.root,
            images_dir: &self.config.images_dir,
            page_dir: path.and_then(Path::parent),
        };
        render_page(content, &ctx)
    }

    /// Recompute every derived structure from the page records and report each divergence.
    /// An empty result means the index is internally consistent.
    pub fn check_consistency(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut titles: BTreeMap<TitleKey, BTreeSet<PathBuf>> = BTreeMap::new();
        let mut tags: BTreeMap<String, BTreeSet<PathBuf>> = BTreeMap::new();
        let mut graph = LinkGraph::default();
        for (path, record) in self.pages.iter() {
            if path != &record.path {
                problems.push(format!("page keyed {path:?} records path {:?}", record.path));
            }
            titles.entry(record.key()).or_default().insert(path.clone());
            for tag in record.tags.iter() {
                tags.entry(tag.clone()).or_default().insert(path.clone());
            }
            graph.set_outbound(path, &record.references);
        }
        let keys: Vec<TitleKey> = graph.target_keys().cloned().collect();
        for key in keys.iter() {
            graph.refresh_broken(key, titles.contains_key(key));
        }

        if titles != self.titles {
            problems.push("title lookup diverges from page records".to_string());
        }
        if tags != self.tags {
            problems.push("tag index diverges from page records".to_string());
        }
        problems.extend(self.graph.check_views());
        if graph != self.graph {
            problems.push("link graph diverges from page references".to_string());
        }

        for path in self.pages.keys() {
            if self.tree.find(path).map(|n| n.kind) != Some(NodeKind::Page) {
                problems.push(format!("page {path:?} missing from file tree"));
            }
        }
        for path in self.tree.paths_of(NodeKind::Page) {
            if !self.pages.contains_key(&path) {
                problems.push(format!("file tree lists unknown page {path:?}"));
            }
        }
        if !self.tree.is_sorted() {
            problems.push("file tree children out of order".to_string());
        }
        problems
    }
}

impl LinkLookup for VaultIndex {
    fn resolve_target(&self, target: &str) -> Option<PathBuf> {
        self.resolve(target).map(Path::to_path_buf)
    }
}

fn sort_headers(headers: &mut [PageHeader]) {
    headers.sort_by(|a, b| title_order(&a.title, &b.title).then_with(|| a.path.cmp(&b.path)));
}

/// Returns true when the file referenced `old_title` and was rewritten.
fn rewrite_dependent(path: &Path, old_title: &str, new_title: &str) -> Result<bool, FolioError> {
    let content = fs::read_to_string(path)?;
    match rewrite_references(&content, old_title, new_title) {
        Some(rewritten) => {
            atomic_write(path, rewritten.as_bytes())?;
            Ok(true)
        }
        None => Ok(false),
    }
}
