//! Allowlist sanitizing for rendered markup.
//!
//! Page bodies may carry raw HTML, so everything the renderer emits passes through [`sanitize_html`]
//! before it leaves the crate. The allowlist covers what markdown produces plus the attributes
//! the vault extensions rely on: `data-path`, `data-target` and `data-anchor` on references,
//! `class` on spoilers and images, `id` on headings.

use ammonia::Builder;
use once_cell::sync::Lazy;
use std::collections::HashSet;

static SANITIZER: Lazy<Builder<'static>> = Lazy::new(|| {
    let mut builder = Builder::new();
    builder
        .tags(HashSet::from([
            "a",
            "abbr",
            "b",
            "blockquote",
            "br",
            "code",
            "dd",
            "del",
            "details",
            "div",
            "dl",
            "dt",
            "em",
            "figcaption",
            "figure",
            "h1",
            "h2",
            "h3",
            "h4",
            "h5",
            "h6",
            "hr",
            "i",
            "img",
            "input",
            "li",
            "ol",
            "p",
            "pre",
            "s",
            "span",
            "strong",
            "sub",
            "summary",
            "sup",
            "table",
            "tbody",
            "td",
            "th",
            "thead",
            "tr",
            "ul",
        ]))
        .link_rel(None)
        .add_tag_attributes(
            "a",
            &["href", "title", "class", "data-path", "data-target", "data-anchor"],
        )
        .add_tag_attributes(
            "img",
            &["src", "alt", "title", "class", "width", "height", "style"],
        )
        .add_tag_attributes("span", &["class"])
        .add_tag_attributes("code", &["class"])
        .add_tag_attributes("div", &["class", "id"])
        .add_tag_attributes("sup", &["class"])
        .add_tag_attributes("input", &["type", "checked", "disabled"])
        .add_tag_attributes("th", &["style", "align"])
        .add_tag_attributes("td", &["style", "align"])
        .add_tag_attributes("details", &["open"])
        .add_tag_attributes("figure", &["style"])
        .add_tag_attributes("figcaption", &["style"])
        .add_tag_attributes("abbr", &["title"]);
    for heading in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        builder.add_tag_attributes(heading, &["id"]);
    }
    builder
});

/// Strip every element and attribute outside the allowlist. Scripts, styles and event handler
/// attributes never survive, and `javascript:` URLs are dropped.
pub fn sanitize_html(dirty: &str) -> String {
    if dirty.is_empty() {
        return String::new();
    }
    SANITIZER.clean(dirty).to_string()
}
