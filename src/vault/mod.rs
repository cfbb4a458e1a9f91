//! The vault model: page records, the reference graph and the file tree, owned by one
//! [`VaultIndex`].
//!
//! # Module Organization
//!
//! - [`page`]: per-page records and the query result types built from them
//! - [`graph`]: the forward/backward reference multigraph and broken target set
//! - [`tree`]: the recursive directory tree
//! - [`index`]: [`VaultIndex`], the single writer that keeps all of the above consistent

pub mod graph;
pub mod index;
pub mod page;
pub mod tree;


pub use graph::LinkGraph;
pub use index::{ChangeReport, VaultIndex};
pub use page::{fingerprint, Backlink, BrokenLink, PageHeader, PageRecord, PageView};
pub use tree::{FileNode, NodeKind};
