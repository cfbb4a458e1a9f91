//! # folio-core
//!
//! A live index and renderer for a vault: a directory tree of interlinked markdown pages, each
//! with an optional YAML metadata block.
//!
//! ## Overview
//!
//! folio-core keeps an in-memory model of the vault consistent with the files on disk while they
//! change, and turns pages into display-ready markup.
//!
//! ### Key Features
//!
//! - **Reference graph**: `[[Page]]`, `[[Page|Alias]]` and `[[Page#Section|Alias]]` references
//!   with per-page backlink counts and a broken-reference report
//! - **Rename cascades**: renaming a page rewrites every reference to it, on disk
//! - **Incremental updates**: filesystem events are debounced, coalesced and applied as deltas
//! - **Open-ended metadata**: any YAML keys, tag membership, and a small `layout` rule language
//!   (headers and column groups) for arranging metadata display
//! - **Rendering extensions**: reference links, three image syntaxes, `||spoilers||`, GFM tables,
//!   and a numbered outline
//! - **Error tolerance**: malformed pages are indexed with their errors attached, never skipped
//!
//! ## Architecture
//!
//! - **[`codec`]**: page parsing and rendering (metadata block, layout rules, references, markdown)
//! - **[`vault`]**: [`VaultIndex`](vault::VaultIndex), the single writer of vault state
//! - **[`sync`]**: coalescing change events and applying them to a shared index
//! - **`watch`**: the filesystem watcher feeding [`sync`] (requires `service`)
//! - **[`query`]**: [`VaultService`](query::VaultService), the request/response façade
//! - **[`commands`]**: serializable [`Op`](commands::Op)/[`OpResult`](commands::OpResult) surface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_core::query::VaultService;
//!
//! let service = VaultService::open("./vault")?;
//! for (tag, pages) in service.get_all_tags() {
//!     println!("{tag}: {} page(s)", pages.len());
//! }
//! let outcome = service.rename_path("People/Ada.md", "Ada Lovelace")?;
//! println!("rewrote {} page(s)", outcome.rewritten.len());
//! # Ok::<(), folio_core::FolioError>(())
//! ```
//!
//! ## Features
//!
//! - **default**: `service`
//! - **service**: file watching (`notify`, `notify-debouncer-full`)
//! - **bin**: the `folio` command line tool

pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod query;
pub mod sync;
#[cfg(test)]
mod tests;
pub mod vault;
#[cfg(feature = "service")]
pub mod watch;
pub mod writer;

pub use error::*;
