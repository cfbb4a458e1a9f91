//! Page parsing and rendering.
//!
//! This module turns the raw text of a page into the two things the rest of the crate needs: the
//! indexable facts about a page ([`ParsedPage`]) and its display form
//! ([`RenderedPage`](md::RenderedPage)).
//!
//! ## Key Components
//!
//! - [`frontmatter`] - splits the leading `---` metadata block from the markdown body
//! - [`metadata`] - ordered, open-ended metadata values and tag extraction
//! - [`layout`] - the `layout` rule language (headers and column groups) for metadata display
//! - [`wikilink`] - `[[Target#Section|Alias]]` extraction and rename rewriting
//! - [`md`] - the markdown renderer with reference, image, spoiler and outline extensions
//! - [`sanitize`] - the allowlist every rendered fragment passes through
//!
//! ## Failure Model
//!
//! Nothing in this module fails a page. A malformed metadata block produces an empty metadata
//! map plus a [`MetadataError`](crate::error::MetadataError); the body is still parsed and
//! rendered. Unresolved references and images are reported as data on the rendered page.
//!
//! ```rust
//! use folio_core::codec::parse_page;
//!
//! let page = parse_page("---\ntags: [npc]\n---\nAllied with [[House Vey]].");
//! assert_eq!(page.tags, vec!["npc"]);
//! assert_eq!(page.references[0].target, "House Vey");
//! assert!(page.metadata_error.is_none());
//! ```

pub mod frontmatter;
pub mod layout;
pub mod md;
pub mod metadata;
pub mod sanitize;
pub mod wikilink;

pub use layout::{LayoutRule, RenderItem};
pub use md::{render_markdown, render_page, LinkLookup, RenderContext, RenderedPage};
pub use metadata::{MetaMap, MetaValue};
pub use wikilink::Reference;

use crate::error::MetadataError;

/// The indexable facts of a single page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedPage {
    pub metadata: MetaMap,
    pub tags: Vec<String>,
    pub references: Vec<Reference>,
    pub metadata_error: Option<MetadataError>,
}

/// Parse the indexable facts of a page. Never fails; see the module docs.
pub fn parse_page(content: &str) -> ParsedPage {
    let doc = frontmatter::split_document(content);
    let (metadata, metadata_error) = match doc.metadata.map(metadata::parse_metadata) {
        Some(Ok(map)) => (map, doc.error),
        Some(Err(e)) => (MetaMap::default(), Some(e)),
        None => (MetaMap::default(), doc.error),
    };
    let tags = metadata::extract_tags(&metadata);
    ParsedPage {
        metadata,
        tags,
        references: wikilink::extract_references(content),
        metadata_error,
    }
}
