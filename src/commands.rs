use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

use crate::{
    codec::RenderedPage,
    error::FolioError,
    query::{RenameOutcome, VaultService},
    vault::{Backlink, BrokenLink, FileNode, PageHeader, PageView},
};

/// Command interface between a client application and a [`VaultService`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    GetFileTree,
    GetAllTags,
    GetAllDirectoryPaths,
    GetAllPages,
    /// Raw text, rendered page and backlinks for a page path
    BuildPageView(PathBuf),
    /// Path, full new content
    WritePageContent(PathBuf, String),
    /// Render unsaved content against the index
    RenderPreview(String),
    /// Render plain markdown, no vault extensions
    RenderMarkdown(String),
    /// Parent folder, file name
    CreateFile(PathBuf, String),
    /// Parent folder, folder name
    CreateFolder(PathBuf, String),
    /// Path, new name
    RenamePath(PathBuf, String),
    /// Path, destination folder
    MovePath(PathBuf, PathBuf),
    DuplicatePage(PathBuf),
    DeletePath(PathBuf),
    Backlinks(PathBuf),
    BrokenLinks,
    /// Rebuild the index from disk
    Rescan,
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Op::GetFileTree => write!(f, "GetFileTree"),
            Op::GetAllTags => write!(f, "GetAllTags"),
            Op::GetAllDirectoryPaths => write!(f, "GetAllDirectoryPaths"),
            Op::GetAllPages => write!(f, "GetAllPages"),
            Op::BuildPageView(p) => write!(f, "BuildPageView({p:?})"),
            Op::WritePageContent(p, content) => {
                write!(f, "WritePageContent({p:?}, {} bytes)", content.len())
            }
            Op::RenderPreview(content) => write!(f, "RenderPreview({} bytes)", content.len()),
            Op::RenderMarkdown(content) => write!(f, "RenderMarkdown({} bytes)", content.len()),
            Op::CreateFile(dir, name) => write!(f, "CreateFile({dir:?}, {name})"),
            Op::CreateFolder(dir, name) => write!(f, "CreateFolder({dir:?}, {name})"),
            Op::RenamePath(p, name) => write!(f, "RenamePath({p:?} -> {name})"),
            Op::MovePath(p, dest) => write!(f, "MovePath({p:?} -> {dest:?})"),
            Op::DuplicatePage(p) => write!(f, "DuplicatePage({p:?})"),
            Op::DeletePath(p) => write!(f, "DeletePath({p:?})"),
            Op::Backlinks(p) => write!(f, "Backlinks({p:?})"),
            Op::BrokenLinks => write!(f, "BrokenLinks"),
            Op::Rescan => write!(f, "Rescan"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpResult {
    Ok,
    Tree(FileNode),
    Tags(Vec<(String, Vec<PageHeader>)>),
    Paths(Vec<PathBuf>),
    Pages(Vec<PageHeader>),
    PageView(Box<PageView>),
    Rendered(Box<RenderedPage>),
    Page(PageHeader),
    Path(PathBuf),
    Renamed(RenameOutcome),
    Backlinks(Vec<Backlink>),
    BrokenLinks(Vec<BrokenLink>),
}

impl Display for OpResult {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            OpResult::Ok => write!(f, "Ok"),
            OpResult::Tree(node) => write!(f, "Tree({} top level entries)", node.children.len()),
            OpResult::Tags(tags) => write!(f, "Tags({})", tags.len()),
            OpResult::Paths(paths) => write!(f, "Paths({})", paths.len()),
            OpResult::Pages(pages) => write!(f, "Pages({})", pages.len()),
            OpResult::PageView(view) => write!(
                f,
                "PageView({}, {} backlinks)",
                view.title,
                view.backlinks.len()
            ),
            OpResult::Rendered(page) => write!(
                f,
                "Rendered({} outline entries, {} unresolved links)",
                page.outline.len(),
                page.unresolved_links.len()
            ),
            OpResult::Page(header) => write!(f, "Page({})", header.title),
            OpResult::Path(p) => write!(f, "Path({p:?})"),
            OpResult::Renamed(outcome) => write!(
                f,
                "Renamed({:?} -> {:?}, {} rewritten, {} failed)",
                outcome.from,
                outcome.to,
                outcome.rewritten.len(),
                outcome.failures.len()
            ),
            OpResult::Backlinks(links) => write!(f, "Backlinks({})", links.len()),
            OpResult::BrokenLinks(links) => write!(f, "BrokenLinks({})", links.len()),
        }
    }
}

impl VaultService {
    /// Run one command. Errors are returned, never panicked on, so a client can surface them.
    #[tracing::instrument(skip(self), fields(op = %op))]
    pub fn dispatch(&self, op: Op) -> Result<OpResult, FolioError> {
        let result = match op {
            Op::GetFileTree => OpResult::Tree(self.get_file_tree()),
            Op::GetAllTags => OpResult::Tags(self.get_all_tags()),
            Op::GetAllDirectoryPaths => OpResult::Paths(self.get_all_directory_paths()),
            Op::GetAllPages => OpResult::Pages(self.get_all_pages()),
            Op::BuildPageView(path) => OpResult::PageView(Box::new(self.build_page_view(path)?)),
            Op::WritePageContent(path, content) => {
                self.write_page_content(path, &content)?;
                OpResult::Ok
            }
            Op::RenderPreview(content) => {
                OpResult::Rendered(Box::new(self.render_preview(&content)))
            }
            Op::RenderMarkdown(content) => {
                OpResult::Rendered(Box::new(self.render_markdown(&content)))
            }
            Op::CreateFile(dir, name) => OpResult::Page(self.create_file(dir, &name)?),
            Op::CreateFolder(dir, name) => OpResult::Path(self.create_folder(dir, &name)?),
            Op::RenamePath(path, name) => OpResult::Renamed(self.rename_path(path, &name)?),
            Op::MovePath(path, dest) => OpResult::Renamed(self.move_path(path, dest)?),
            Op::DuplicatePage(path) => OpResult::Page(self.duplicate_page(path)?),
            Op::DeletePath(path) => {
                self.delete_path(path)?;
                OpResult::Ok
            }
            Op::Backlinks(path) => OpResult::Backlinks(self.backlinks_for(path)?),
            Op::BrokenLinks => OpResult::BrokenLinks(self.broken_links_report()),
            Op::Rescan => {
                self.rescan()?;
                OpResult::Ok
            }
        };
        tracing::debug!("{}", result);
        Ok(result)
    }
}
