use once_cell::sync::Lazy;
use pulldown_cmark::{
    html, CowStr, Event as MdEvent, HeadingLevel, Options, Parser as MdParser,
    Tag as MdTag, TagEnd as MdTagEnd,
};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use crate::{
    codec::{
        frontmatter::split_document,
        layout::{evaluate_layout, parse_layout, Field, RenderItem},
        metadata::{parse_metadata, MetaMap, MetaValue, IMAGE_KEY},
        sanitize::sanitize_html,
        wikilink::display_text,
    },
    error::MetadataError,
    paths::{os_path_to_string, to_anchor},
};

pub use pulldown_cmark;

/// Inline extensions, in priority order at any given position.
/// Captures: embed_src/embed_alt for `![[src|alt]]`, target/section/alias for
/// `[[target#section|alias]]`, hidden for `||hidden||`.
static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?P<embed>!\[\[(?P<embed_src>[^\|\]]+)(?:\|(?P<embed_alt>[^\]]+))?\]\])",
        r"|(?P<link>\[\[(?P<target>[^\[\]\|#]+)(?:#(?P<section>[^\[\]\|]+))?(?:\|(?P<alias>[^\[\]]+))?\]\])",
        r"|(?:\|\|(?P<hidden>.+?)\|\|)",
    ))
    .expect("inline extension pattern is valid")
});

/// Captures: 1: everything from `<img` up to the `src` attribute, 2: src attribute content
static IMG_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<img\b[^>]*?\s)src="([^"]+)""#).expect("img tag pattern is valid")
});

const FALLBACK_ANCHOR: &str = "section";

pub fn folio_md_options() -> Options {
    let mut md_options = Options::empty();
    md_options.insert(Options::ENABLE_FOOTNOTES);
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    md_options.insert(Options::ENABLE_TABLES);
    md_options.insert(Options::ENABLE_TASKLISTS);
    md_options
}

/// Read-only view of the index used to resolve reference targets while rendering.
pub trait LinkLookup {
    /// The page a reference target resolves to, if any.
    fn resolve_target(&self, target: &str) -> Option<PathBuf>;
}

/// Resolves nothing. Every reference renders as broken.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLinks;

impl LinkLookup for NoLinks {
    fn resolve_target(&self, _target: &str) -> Option<PathBuf> {
        None
    }
}

/// Where the renderer looks for images and how it resolves references.
pub struct RenderContext<'a> {
    pub links: &'a dyn LinkLookup,
    pub vault_root: &'a Path,
    /// Image folder relative to `vault_root`.
    pub images_dir: &'a str,
    /// Folder of the page being rendered. Relative image paths fall back to it.
    pub page_dir: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Hierarchical number such as `1.2`.
    pub number: String,
    pub text: String,
    pub level: u32,
    /// Unique anchor id, also set on the rendered heading element.
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// The path as written by the author.
    pub src: String,
    /// Resolved location, `None` when the image could not be found.
    pub resolved: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderedPage {
    pub html_before_toc: String,
    pub html_after_toc: String,
    pub outline: Vec<OutlineEntry>,
    /// Parsed metadata, empty when the block is absent or malformed.
    pub metadata: MetaMap,
    /// Metadata display model with string values rendered to markup.
    pub display: Vec<RenderItem>,
    pub infobox_image: Option<ImageRef>,
    pub metadata_error: Option<MetadataError>,
    pub layout_warnings: Vec<String>,
    pub unresolved_links: Vec<String>,
    pub unresolved_images: Vec<String>,
}

enum ImageTarget {
    External(String),
    Local(PathBuf),
    Missing,
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Per-render state: resolution context plus everything found missing along the way.
struct PageRenderer<'a> {
    ctx: &'a RenderContext<'a>,
    unresolved_links: Vec<String>,
    unresolved_images: Vec<String>,
}

impl<'a> PageRenderer<'a> {
    fn new(ctx: &'a RenderContext<'a>) -> Self {
        PageRenderer {
            ctx,
            unresolved_links: Vec::new(),
            unresolved_images: Vec::new(),
        }
    }

    fn note_missing_image(&mut self, src: &str) {
        if !self.unresolved_images.iter().any(|s| s == src) {
            self.unresolved_images.push(src.to_string());
        }
    }

    fn note_missing_link(&mut self, target: &str) {
        if !self.unresolved_links.iter().any(|s| s == target) {
            self.unresolved_links.push(target.to_string());
        }
    }

    fn locate_image(&self, raw: &str) -> ImageTarget {
        let raw = raw.trim();
        if raw.contains("://") || raw.starts_with("data:") || raw.starts_with("//") {
            return ImageTarget::External(raw.to_string());
        }
        if Path::new(raw).is_absolute() {
            return ImageTarget::External(raw.to_string());
        }
        let mut spellings = vec![raw.to_string()];
        if raw.contains("%20") {
            spellings.push(raw.replace("%20", " "));
        }
        for spelling in spellings.iter() {
            let mut candidates = vec![self
                .ctx
                .vault_root
                .join(self.ctx.images_dir)
                .join(spelling)];
            candidates.push(self.ctx.page_dir.unwrap_or(self.ctx.vault_root).join(spelling));
            if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
                return ImageTarget::Local(found);
            }
        }
        ImageTarget::Missing
    }

    /// Returns the src to emit and whether the image was found.
    fn image_src(&mut self, raw: &str) -> (String, bool) {
        match self.locate_image(raw) {
            ImageTarget::External(src) => (src, true),
            ImageTarget::Local(path) => (os_path_to_string(path), true),
            ImageTarget::Missing => {
                tracing::debug!("image '{raw}' not found in vault");
                self.note_missing_image(raw.trim());
                (raw.trim().to_string(), false)
            }
        }
    }

    fn image_ref(&mut self, raw: &str) -> ImageRef {
        let (src, found) = self.image_src(raw);
        ImageRef {
            src: raw.trim().to_string(),
            resolved: found.then_some(src),
        }
    }

    fn img_element(&mut self, raw_src: &str, alt: &str, title: &str, class: &str) -> String {
        let (src, found) = self.image_src(raw_src);
        let class = if found {
            class.to_string()
        } else {
            format!("{class} broken-image").trim().to_string()
        };
        let mut out = format!("<img src=\"{}\" alt=\"{}\"", escape_html(&src), escape_html(alt));
        if !title.is_empty() {
            out.push_str(&format!(" title=\"{}\"", escape_html(title)));
        }
        if !class.is_empty() {
            out.push_str(&format!(" class=\"{class}\""));
        }
        out.push('>');
        out
    }

    fn link_element(&mut self, target: &str, section: Option<&str>, alias: Option<&str>) -> String {
        let label = escape_html(alias.unwrap_or(target));
        match self.ctx.links.resolve_target(target) {
            Some(path) => {
                let anchor = section
                    .map(to_anchor)
                    .filter(|a| !a.is_empty())
                    .map(|a| format!(" data-anchor=\"{}\"", escape_html(&a)))
                    .unwrap_or_default();
                format!(
                    "<a href=\"#\" class=\"internal-link\" data-path=\"{}\"{}>{}</a>",
                    escape_html(&os_path_to_string(path)),
                    anchor,
                    label
                )
            }
            None => {
                self.note_missing_link(target);
                format!(
                    "<a href=\"#\" class=\"internal-link broken\" data-target=\"{}\">{}</a>",
                    escape_html(target),
                    label
                )
            }
        }
    }

    /// Render references, image embeds and spoilers in `text`. With `escape` the remaining text
    /// is treated as plain text, otherwise it is passed through as markup.
    fn render_inline(&mut self, text: &str, escape: bool) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let matches: Vec<Captures> = INLINE_RE.captures_iter(text).collect();
        for caps in matches.iter() {
            let Some(whole) = caps.get(0) else { continue };
            let between = &text[last..whole.start()];
            out.push_str(&if escape { escape_html(between) } else { between.to_string() });
            last = whole.end();

            let trimmed = |name: &str| {
                caps.name(name)
                    .map(|m| m.as_str().trim())
                    .filter(|s| !s.is_empty())
            };
            if caps.name("embed").is_some() {
                let src = trimmed("embed_src").unwrap_or_default();
                let alt = trimmed("embed_alt").unwrap_or(src);
                let element = self.img_element(src, alt, "", "embedded-image");
                out.push_str(&element);
            } else if caps.name("link").is_some() {
                match trimmed("target") {
                    Some(target) => {
                        let element =
                            self.link_element(target, trimmed("section"), trimmed("alias"));
                        out.push_str(&element);
                    }
                    None => out.push_str(&if escape {
                        escape_html(whole.as_str())
                    } else {
                        whole.as_str().to_string()
                    }),
                }
            } else if let Some(hidden) = caps.name("hidden") {
                let inner = self.render_inline(hidden.as_str(), escape);
                out.push_str(&format!("<span class=\"spoiler\">{inner}</span>"));
            }
        }
        let rest = &text[last..];
        out.push_str(&if escape { escape_html(rest) } else { rest.to_string() });
        out
    }

    /// Point `<img src="...">` tags in raw markup at resolved image locations.
    fn rewrite_img_tags(&mut self, markup: &str) -> String {
        let sources: Vec<String> = IMG_TAG_RE
            .captures_iter(markup)
            .filter_map(|caps| caps.get(2).map(|m| m.as_str().replace("&amp;", "&")))
            .collect();
        let resolved: Vec<String> = sources
            .iter()
            .map(|src| escape_html(&self.image_src(src).0))
            .collect();
        let mut idx = 0;
        IMG_TAG_RE
            .replace_all(markup, |caps: &Captures| {
                let src = resolved.get(idx).cloned().unwrap_or_default();
                idx += 1;
                format!("{}src=\"{src}\"", &caps[1])
            })
            .into_owned()
    }

    fn render_markup(&mut self, markup: &str) -> String {
        let with_extensions = self.render_inline(markup, false);
        self.rewrite_img_tags(&with_extensions)
    }

    fn render_value(&mut self, value: &MetaValue) -> MetaValue {
        match value {
            MetaValue::String(s) => MetaValue::String(self.render_inline(s, true)),
            MetaValue::List(items) => {
                MetaValue::List(items.iter().map(|v| self.render_value(v)).collect())
            }
            MetaValue::Map(map) => MetaValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn render_fields(&mut self, fields: Vec<Field>) -> Vec<Field> {
        let mut rendered = Vec::with_capacity(fields.len());
        for field in fields {
            rendered.push(Field {
                value: self.render_value(&field.value),
                key: field.key,
            });
        }
        rendered
    }

    fn render_display(&mut self, items: Vec<RenderItem>) -> Vec<RenderItem> {
        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            rendered.push(match item {
                RenderItem::Header { text } => RenderItem::Header {
                    text: self.render_inline(&text, true),
                },
                RenderItem::Group { render_as, fields } => RenderItem::Group {
                    render_as,
                    fields: self.render_fields(fields),
                },
                RenderItem::Field(field) => RenderItem::Field(Field {
                    value: self.render_value(&field.value),
                    key: field.key,
                }),
            });
        }
        rendered
    }

    /// Render a markdown body, returning markup before the first heading, markup from the first
    /// heading on, and the outline.
    fn render_body(&mut self, markdown: &str) -> (String, String, Vec<OutlineEntry>) {
        let events: Vec<MdEvent> = MdParser::new_ext(markdown, folio_md_options()).collect();
        let outline = build_outline(&events);

        let mut before: Vec<MdEvent> = Vec::new();
        let mut after: Vec<MdEvent> = Vec::new();
        let mut found_heading = false;
        let mut heading_idx = 0;
        let mut text_buffer = String::new();
        let mut in_code_block = false;
        // (dest, title, alt) of the image currently being collected
        let mut image: Option<(String, String, String)> = None;

        for event in events {
            if let Some((_, _, alt)) = image.as_mut() {
                match event {
                    MdEvent::End(MdTagEnd::Image) => {
                        if let Some((dest, title, alt)) = image.take() {
                            let element = self.img_element(&dest, &alt, &title, "");
                            let target = if found_heading { &mut after } else { &mut before };
                            target.push(MdEvent::Html(element.into()));
                        }
                    }
                    MdEvent::Text(t) | MdEvent::Code(t) => alt.push_str(&t),
                    _ => {}
                }
                continue;
            }

            if let MdEvent::Text(text) = &event {
                if !in_code_block {
                    text_buffer.push_str(text);
                    continue;
                }
            }

            let is_heading_start = matches!(event, MdEvent::Start(MdTag::Heading { .. }));
            {
                let target = if found_heading { &mut after } else { &mut before };
                if !text_buffer.is_empty() {
                    let markup = self.render_inline(&text_buffer, true);
                    target.push(MdEvent::Html(markup.into()));
                    text_buffer.clear();
                }
            }
            if is_heading_start {
                found_heading = true;
            }
            let target = if found_heading { &mut after } else { &mut before };

            match event {
                MdEvent::Start(MdTag::Heading {
                    level,
                    classes,
                    attrs,
                    ..
                }) => {
                    let id = outline
                        .get(heading_idx)
                        .map(|entry| CowStr::from(entry.id.clone()));
                    heading_idx += 1;
                    target.push(MdEvent::Start(MdTag::Heading {
                        level,
                        id,
                        classes,
                        attrs,
                    }));
                }
                MdEvent::Start(MdTag::CodeBlock(kind)) => {
                    in_code_block = true;
                    target.push(MdEvent::Start(MdTag::CodeBlock(kind)));
                }
                MdEvent::End(MdTagEnd::CodeBlock) => {
                    in_code_block = false;
                    target.push(MdEvent::End(MdTagEnd::CodeBlock));
                }
                MdEvent::Start(MdTag::Image {
                    dest_url, title, ..
                }) => {
                    image = Some((dest_url.to_string(), title.to_string(), String::new()));
                }
                MdEvent::Html(markup) => {
                    let processed = self.render_markup(&markup);
                    target.push(MdEvent::Html(processed.into()));
                }
                MdEvent::InlineHtml(markup) => {
                    let processed = self.render_markup(&markup);
                    target.push(MdEvent::InlineHtml(processed.into()));
                }
                other => target.push(other),
            }
        }
        if !text_buffer.is_empty() {
            let markup = self.render_inline(&text_buffer, true);
            let target = if found_heading { &mut after } else { &mut before };
            target.push(MdEvent::Html(markup.into()));
        }

        let mut html_before = String::new();
        html::push_html(&mut html_before, before.into_iter());
        let mut html_after = String::new();
        html::push_html(&mut html_after, after.into_iter());
        (sanitize_html(&html_before), sanitize_html(&html_after), outline)
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    level as usize
}

/// Number and anchor every heading. Deeper counters reset when a shallower heading appears and
/// levels that were skipped contribute no number component.
fn build_outline(events: &[MdEvent]) -> Vec<OutlineEntry> {
    let mut outline = Vec::new();
    let mut counters = [0usize; 6];
    let mut used_ids: BTreeSet<String> = BTreeSet::new();
    let mut current: Option<HeadingLevel> = None;
    let mut text = String::new();
    let mut in_image = false;

    for event in events {
        match event {
            MdEvent::Start(MdTag::Heading { level, .. }) => {
                current = Some(*level);
                text.clear();
            }
            MdEvent::End(MdTagEnd::Heading(_)) => {
                let Some(level) = current.take() else { continue };
                let depth = heading_depth(level);
                counters[depth - 1] += 1;
                counters.iter_mut().skip(depth).for_each(|c| *c = 0);
                let number = counters[..depth]
                    .iter()
                    .filter(|c| **c > 0)
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(".");

                let display = display_text(text.trim());
                let mut base = to_anchor(&display);
                if base.is_empty() {
                    base = FALLBACK_ANCHOR.to_string();
                }
                let mut id = base.clone();
                let mut suffix = 1;
                while used_ids.contains(&id) {
                    id = format!("{base}-{suffix}");
                    suffix += 1;
                }
                used_ids.insert(id.clone());

                outline.push(OutlineEntry {
                    number,
                    text: display,
                    level: depth as u32,
                    id,
                });
            }
            MdEvent::Start(MdTag::Image { .. }) => in_image = true,
            MdEvent::End(MdTagEnd::Image) => in_image = false,
            MdEvent::Text(t) | MdEvent::Code(t) if current.is_some() && !in_image => {
                text.push_str(t)
            }
            _ => {}
        }
    }
    outline
}

/// Render a complete page: metadata display model, body markup and outline. Problems with the
/// metadata, layout, references and images are reported inside the result, never as errors.
#[tracing::instrument(skip_all)]
pub fn render_page(content: &str, ctx: &RenderContext) -> RenderedPage {
    let doc = split_document(content);
    let mut metadata_error = doc.error.clone();
    let metadata = match doc.metadata.map(parse_metadata) {
        Some(Ok(map)) => map,
        Some(Err(e)) => {
            tracing::debug!("metadata parse error: {e}");
            metadata_error = Some(e);
            MetaMap::default()
        }
        None => MetaMap::default(),
    };

    let layout = parse_layout(&metadata);
    let mut renderer = PageRenderer::new(ctx);
    let display = renderer.render_display(evaluate_layout(&metadata, &layout.rules));
    let infobox_image = metadata
        .get(IMAGE_KEY)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|src| renderer.image_ref(src));
    let (html_before_toc, html_after_toc, outline) = renderer.render_body(doc.body);

    RenderedPage {
        html_before_toc,
        html_after_toc,
        outline,
        metadata,
        display,
        infobox_image,
        metadata_error,
        layout_warnings: layout.warnings,
        unresolved_links: renderer.unresolved_links,
        unresolved_images: renderer.unresolved_images,
    }
}

/// Plain markdown with none of the vault extensions, used for help-like content.
pub fn render_markdown(markdown: &str) -> RenderedPage {
    let mut output = String::new();
    html::push_html(&mut output, MdParser::new_ext(markdown, folio_md_options()));
    RenderedPage {
        html_before_toc: sanitize_html(&output),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Titles(BTreeMap<String, PathBuf>);

    impl LinkLookup for Titles {
        fn resolve_target(&self, target: &str) -> Option<PathBuf> {
            self.0.get(&target.to_lowercase()).cloned()
        }
    }

    fn titles(entries: &[(&str, &str)]) -> Titles {
        Titles(
            entries
                .iter()
                .map(|(t, p)| (t.to_lowercase(), PathBuf::from(p)))
                .collect(),
        )
    }

    fn render_with(content: &str, links: &dyn LinkLookup, root: &Path) -> RenderedPage {
        let ctx = RenderContext {
            links,
            vault_root: root,
            images_dir: "images",
            page_dir: None,
        };
        render_page(content, &ctx)
    }

    fn render(content: &str) -> RenderedPage {
        render_with(content, &NoLinks, Path::new("/nonexistent-vault"))
    }

    #[test]
    fn test_outline_numbers() {
        let page = render("# A\n## B\n## C\n# D\n");
        let numbers: Vec<&str> = page.outline.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "1.1", "1.2", "2"]);
        let levels: Vec<u32> = page.outline.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_outline_skipped_levels_and_reset() {
        let page = render("# A\n### Deep\n## Mid\n### Deeper\n");
        let numbers: Vec<&str> = page.outline.iter().map(|e| e.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "1.1", "1.1", "1.1.1"]);
    }

    #[test]
    fn test_unique_heading_ids() {
        let page = render("# Notes\n## Notes\n# Notes\n# ???\n");
        let ids: Vec<&str> = page.outline.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["notes", "notes-1", "notes-2", "section"]);
        assert!(page.html_after_toc.contains("<h2 id=\"notes-1\">"));
    }

    #[test]
    fn test_heading_text_uses_display_text() {
        let page = render("# About [[Dragon|wyrms]] and `code`\n");
        assert_eq!(page.outline[0].text, "About wyrms and code");
        assert_eq!(page.outline[0].id, "about-wyrms-and-code");
    }

    #[test]
    fn test_split_at_first_heading() {
        let page = render("Intro text.\n\n# First\n\nBody.\n");
        assert!(page.html_before_toc.contains("Intro text."));
        assert!(!page.html_before_toc.contains("First"));
        assert!(page.html_after_toc.starts_with("<h1"));
        assert!(page.html_after_toc.contains("Body."));

        let no_headings = render("Just text.");
        assert!(no_headings.html_after_toc.is_empty());
        assert!(no_headings.outline.is_empty());
    }

    #[test]
    fn test_links_resolved_and_broken() {
        let links = titles(&[("Dragon", "/vault/Dragon.md")]);
        let page = render_with(
            "See [[dragon|the wyrm]], [[Dragon#Lair Map]] and [[Ghost]].",
            &links,
            Path::new("/vault"),
        );
        let html = &page.html_before_toc;
        assert!(html.contains(
            "<a href=\"#\" class=\"internal-link\" data-path=\"/vault/Dragon.md\">the wyrm</a>"
        ));
        assert!(html.contains("data-anchor=\"lair-map\">Dragon</a>"));
        assert!(html.contains(
            "<a href=\"#\" class=\"internal-link broken\" data-target=\"Ghost\">Ghost</a>"
        ));
        assert_eq!(page.unresolved_links, vec!["Ghost"]);
    }

    #[test]
    fn test_code_is_untouched() {
        let page = render("Inline `[[Link]]` here.\n\n```\n[[Fenced]] ||x||\n```\n");
        let html = &page.html_before_toc;
        assert!(html.contains("<code>[[Link]]</code>"));
        assert!(html.contains("[[Fenced]] ||x||"));
        assert!(!html.contains("internal-link"));
        assert!(page.unresolved_links.is_empty());
    }

    #[test]
    fn test_spoilers() {
        let page = render("The butler ||did it|| and ||[[Ghost]]||.");
        let html = &page.html_before_toc;
        assert!(html.contains("<span class=\"spoiler\">did it</span>"));
        assert!(html.contains("<span class=\"spoiler\"><a href=\"#\" class=\"internal-link broken\""));
    }

    #[test]
    fn test_text_is_escaped() {
        let page = render("a < b & [[A & B]]");
        let html = &page.html_before_toc;
        assert!(html.contains("a &lt; b &amp; "));
        assert!(html.contains("data-target=\"A &amp; B\""));
    }

    #[test]
    fn test_tables_and_alignment() {
        let page = render("| L | C | R |\n|:--|:-:|--:|\n| 1 | 2 | 3 |\n");
        let html = &page.html_before_toc;
        assert!(html.contains("<table>"));
        assert!(html.contains("style=\"text-align: center\""));
        assert!(html.contains("style=\"text-align: right\""));
    }

    #[test]
    fn test_images_resolve_against_images_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/map.png"), b"png").unwrap();
        std::fs::write(dir.path().join("local.png"), b"png").unwrap();

        let content = "![[map.png|World map]]\n\n![Local](local.png)\n\n<img src=\"map.png\">\n\n![[gone.png]]\n\n![remote](https://example.com/x.png)\n";
        let page = render_with(content, &NoLinks, dir.path());
        let html = &page.html_before_toc;
        let map = os_path_to_string(dir.path().join("images/map.png"));
        let local = os_path_to_string(dir.path().join("local.png"));
        assert!(html.contains(&format!(
            "<img src=\"{map}\" alt=\"World map\" class=\"embedded-image\">"
        )));
        assert!(html.contains(&format!("<img src=\"{local}\" alt=\"Local\">")));
        assert!(html.contains(&format!("<img src=\"{map}\">")));
        assert!(html.contains("class=\"embedded-image broken-image\""));
        assert!(html.contains("src=\"https://example.com/x.png\""));
        assert_eq!(page.unresolved_images, vec!["gone.png"]);
    }

    #[test]
    fn test_img_tag_src_after_other_attributes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/map.png"), b"png").unwrap();
        let content = "<img alt=\"Map\" width=\"200\" src=\"map.png\">\n\nInline <img class=\"x\" data-src=\"y\" src=\"gone.png\"> here.\n";
        let page = render_with(content, &NoLinks, dir.path());
        let map = os_path_to_string(dir.path().join("images/map.png"));
        assert!(page.html_before_toc.contains(&format!(
            "<img alt=\"Map\" width=\"200\" src=\"{map}\">"
        )));
        assert_eq!(page.unresolved_images, vec!["gone.png"]);
    }

    #[test]
    fn test_unterminated_metadata_renders_body() {
        let page = render("---\ntitle: x\n# Body\n\ntext");
        assert!(page.metadata_error.is_some());
        assert!(page.metadata.is_empty());
        assert!(page.html_after_toc.contains("Body"));
    }

    #[test]
    fn test_malformed_metadata_renders_body() {
        let page = render("---\ntitle: [unclosed\n---\n# Body\n");
        let err = page.metadata_error.unwrap();
        assert!(err.line.is_some());
        assert!(page.metadata.is_empty());
        assert_eq!(page.outline.len(), 1);
    }

    #[test]
    fn test_display_model_renders_values() {
        let links = titles(&[("Ada", "/vault/Ada.md")]);
        let content = "---\nlayout:\n  - keys: [x, y]\nx: '[[Ada]]'\ny: plain\nz: '||secret||'\n---\nBody";
        let page = render_with(content, &links, Path::new("/vault"));
        assert_eq!(page.display.len(), 2);
        match &page.display[0] {
            RenderItem::Group { render_as, fields } => {
                assert_eq!(render_as, "columns");
                assert_eq!(fields.len(), 2);
                let x = fields[0].value.as_str().unwrap();
                assert!(x.contains("data-path=\"/vault/Ada.md\""));
            }
            other => panic!("expected group, got {other:?}"),
        }
        match &page.display[1] {
            RenderItem::Field(field) => {
                assert_eq!(field.key, "z");
                assert_eq!(
                    field.value.as_str(),
                    Some("<span class=\"spoiler\">secret</span>")
                );
            }
            other => panic!("expected field, got {other:?}"),
        }
        assert_eq!(
            page.metadata.get("x").and_then(|v| v.as_str()),
            Some("[[Ada]]")
        );
    }

    #[test]
    fn test_infobox_image() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/ada.png"), b"png").unwrap();
        let page = render_with("---\nimage: ada.png\n---\n", &NoLinks, dir.path());
        let image = page.infobox_image.unwrap();
        assert_eq!(image.src, "ada.png");
        assert_eq!(
            image.resolved,
            Some(os_path_to_string(dir.path().join("images/ada.png")))
        );

        let page = render_with("---\nimage: nope.png\n---\n", &NoLinks, dir.path());
        assert_eq!(page.infobox_image.unwrap().resolved, None);
        assert_eq!(page.unresolved_images, vec!["nope.png"]);
    }

    #[test]
    fn test_raw_html_is_sanitized() {
        let links = titles(&[("Ada", "/vault/Ada.md")]);
        let content = "Hi <img src=\"x.png\" onerror=\"alert(1)\"> [[Ada#Early life]] ||shh||\n\n<script>alert(2)</script>\n\n# Notes\n\n<div onmouseover=\"alert(3)\">[[Ghost]]</div>\n";
        let page = render_with(content, &links, Path::new("/vault"));
        for html in [&page.html_before_toc, &page.html_after_toc] {
            assert!(!html.contains("<script"));
            assert!(!html.contains("alert("));
            assert!(!html.contains("onerror"));
            assert!(!html.contains("onmouseover"));
        }
        assert!(page
            .html_before_toc
            .contains("data-path=\"/vault/Ada.md\" data-anchor=\"early-life\">Ada</a>"));
        assert!(page
            .html_before_toc
            .contains("<span class=\"spoiler\">shh</span>"));
        assert!(page.html_after_toc.contains("<h1 id=\"notes\">"));
        assert!(page.html_after_toc.contains("data-target=\"Ghost\""));

        let plain = render_markdown("<script>alert(4)</script>\n\n*ok*");
        assert!(!plain.html_before_toc.contains("<script"));
        assert!(plain.html_before_toc.contains("<em>ok</em>"));
    }

    #[test]
    fn test_render_markdown_plain() {
        let page = render_markdown("# Help\n\n[[Not a link]]");
        assert!(page.html_before_toc.contains("<h1>Help</h1>"));
        assert!(page.html_before_toc.contains("[[Not a link]]"));
        assert!(page.outline.is_empty());
    }
}
