//! `[[Target#Section|Alias]]` cross references: extraction, display text and rewriting.
//!
//! References inside inline code and code blocks are literal text and are neither indexed nor
//! rewritten. Image embeds (`![[file.png]]`) share the bracket syntax but are not references.

use once_cell::sync::Lazy;
use pulldown_cmark::{Event as MdEvent, Parser as MdParser, Tag as MdTag};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{
    codec::{frontmatter::split_document, md::folio_md_options},
    paths::TitleKey,
};

/// Captures: 1: target, 2: section, 3: alias
pub static WIKILINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[([^\[\]\|#]+)(?:#([^\[\]\|]+))?(?:\|([^\[\]]+))?\]\]")
        .expect("wikilink pattern is valid")
});

/// 1-based line and column (in characters) of a reference's opening brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub target: String,
    pub section: Option<String>,
    pub alias: Option<String>,
    pub position: Position,
}

impl Reference {
    pub fn key(&self) -> TitleKey {
        TitleKey::new(&self.target)
    }

    pub fn display_text(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.target)
    }
}

fn trimmed(caps: &Captures, idx: usize) -> Option<String> {
    caps.get(idx)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Byte ranges of inline code spans and code blocks in a markdown body.
pub fn code_ranges(markdown: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for (event, range) in MdParser::new_ext(markdown, folio_md_options()).into_offset_iter() {
        match event {
            MdEvent::Code(_) | MdEvent::Start(MdTag::CodeBlock(_)) => {
                if !ranges.iter().any(|r| r.start <= range.start && range.end <= r.end) {
                    ranges.push(range);
                }
            }
            _ => {}
        }
    }
    ranges
}

/// Byte ranges of `content` (a whole page file) where references are not recognized.
fn excluded_ranges(content: &str) -> Vec<Range<usize>> {
    let doc = split_document(content);
    code_ranges(doc.body)
        .into_iter()
        .map(|r| (r.start + doc.body_offset)..(r.end + doc.body_offset))
        .collect()
}

fn is_embed(content: &str, start: usize) -> bool {
    start > 0 && content.as_bytes()[start - 1] == b'!'
}

fn in_ranges(ranges: &[Range<usize>], idx: usize) -> bool {
    ranges.iter().any(|r| r.contains(&idx))
}

fn position_of(content: &str, byte_idx: usize) -> Position {
    let before = &content[..byte_idx];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = content[line_start..byte_idx].chars().count() + 1;
    Position { line, column }
}

/// Every reference in a page file, metadata block included, in document order.
pub fn extract_references(content: &str) -> Vec<Reference> {
    let excluded = excluded_ranges(content);
    WIKILINK_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if is_embed(content, whole.start()) || in_ranges(&excluded, whole.start()) {
                return None;
            }
            let target = trimmed(&caps, 1)?;
            Some(Reference {
                target,
                section: trimmed(&caps, 2),
                alias: trimmed(&caps, 3),
                position: position_of(content, whole.start()),
            })
        })
        .collect()
}

/// Replace each reference in `text` with its display text.
pub fn display_text(text: &str) -> String {
    WIKILINK_RE
        .replace_all(text, |caps: &Captures| {
            trimmed(caps, 3)
                .or_else(|| trimmed(caps, 1))
                .unwrap_or_default()
        })
        .to_string()
}

/// Point every reference to `old_title` at `new_title`, keeping section and alias text.
///
/// Returns `None` when nothing in `content` refers to `old_title`.
pub fn rewrite_references(content: &str, old_title: &str, new_title: &str) -> Option<String> {
    let old_key = TitleKey::new(old_title);
    let excluded = excluded_ranges(content);
    let mut changed = false;
    let rewritten = WIKILINK_RE.replace_all(content, |caps: &Captures| {
        let Some(whole) = caps.get(0) else {
            return String::new();
        };
        let original = whole.as_str().to_string();
        if is_embed(content, whole.start()) || in_ranges(&excluded, whole.start()) {
            return original;
        }
        let target = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if TitleKey::new(target) != old_key {
            return original;
        }
        changed = true;
        let mut out = format!("[[{new_title}");
        if let Some(section) = caps.get(2) {
            out.push('#');
            out.push_str(section.as_str());
        }
        if let Some(alias) = caps.get(3) {
            out.push('|');
            out.push_str(alias.as_str());
        }
        out.push_str("]]");
        out
    });
    if changed {
        Some(rewritten.into_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_forms() {
        let refs = extract_references("See [[Dragon]], [[Dragon|the wyrm]] and [[Lore#Origins|why]].");
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].target, "Dragon");
        assert_eq!(refs[0].alias, None);
        assert_eq!(refs[1].alias.as_deref(), Some("the wyrm"));
        assert_eq!(refs[1].display_text(), "the wyrm");
        assert_eq!(refs[2].target, "Lore");
        assert_eq!(refs[2].section.as_deref(), Some("Origins"));
        assert_eq!(refs[2].alias.as_deref(), Some("why"));
    }

    #[test]
    fn test_positions() {
        let refs = extract_references("---\nally: \"[[Bob]]\"\n---\nline\n  é [[Ann]]\n");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].position, Position { line: 2, column: 8 });
        assert_eq!(refs[1].position, Position { line: 5, column: 5 });
    }

    #[test]
    fn test_skips_code_and_embeds() {
        let content = "Use `[[Inline]]` or\n\n```\n[[Fenced]]\n```\n\n![[map.png]] [[Real]]\n";
        let refs = extract_references(content);
        let targets: Vec<&str> = refs.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["Real"]);
    }

    #[test]
    fn test_display_text() {
        assert_eq!(display_text("About [[A]] and [[B|bee]]"), "About A and bee");
    }

    #[test]
    fn test_rewrite_preserves_section_and_alias() {
        let content = "[[old name]] [[Old Name#Intro|start]] [[Other]] `[[Old Name]]`";
        let out = rewrite_references(content, "Old Name", "New Name").unwrap();
        assert_eq!(
            out,
            "[[New Name]] [[New Name#Intro|start]] [[Other]] `[[Old Name]]`"
        );
    }

    #[test]
    fn test_rewrite_no_match() {
        assert_eq!(rewrite_references("[[Other]]", "Old", "New"), None);
        assert_eq!(rewrite_references("![[Old]]", "Old", "New"), None);
    }
}
