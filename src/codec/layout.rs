//! The layout rule language embedded in page metadata.
//!
//! A page may declare a `layout` list whose entries rearrange how its metadata fields are
//! displayed:
//!
//! ```yaml
//! layout:
//!   - type: header
//!     text: Vital statistics
//!     anchor: born
//!   - render_as: columns
//!     keys: [born, died]
//! born: 1204
//! died: 1261
//! ```
//!
//! Evaluation walks the metadata in its written order and produces a flat list of
//! [`RenderItem`]s. A group is emitted where the first of its keys that is present appears and
//! consumes all of its present keys. A header is emitted immediately before the item that holds
//! its anchor key. Rules that reference only absent keys produce nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::metadata::{MetaMap, MetaValue, LAYOUT_KEY};

pub const DEFAULT_GROUP_STYLE: &str = "columns";

const ANCHOR_ALIASES: [&str; 3] = ["anchor", "above", "before"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutRule {
    Header { text: String, anchor: String },
    Group { render_as: String, keys: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: MetaValue,
}

/// One entry of a page's metadata display model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderItem {
    Header { text: String },
    Group { render_as: String, fields: Vec<Field> },
    Field(Field),
}

/// Rules read from the `layout` field plus a warning for every entry that could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLayout {
    pub rules: Vec<LayoutRule>,
    pub warnings: Vec<String>,
}

fn string_field(map: &MetaMap, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.scalar_string())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_rule(index: usize, entry: &MetaValue) -> Result<LayoutRule, String> {
    let Some(map) = entry.as_map() else {
        return Err(format!("layout entry {index} is not a map"));
    };
    let kind = string_field(map, "type").map(|t| t.to_lowercase());
    let kind = match kind.as_deref() {
        Some(k) => k.to_string(),
        None if map.contains_key("keys") => "group".to_string(),
        None if map.contains_key("text") => "header".to_string(),
        None => {
            return Err(format!(
                "layout entry {index} has no 'type' and neither 'keys' nor 'text'"
            ))
        }
    };
    match kind.as_str() {
        "header" => {
            let text = string_field(map, "text")
                .ok_or_else(|| format!("header rule {index} is missing 'text'"))?;
            let anchor = ANCHOR_ALIASES
                .iter()
                .find_map(|alias| string_field(map, alias))
                .ok_or_else(|| format!("header rule {index} ('{text}') is missing 'anchor'"))?;
            Ok(LayoutRule::Header { text, anchor })
        }
        "group" => {
            let keys: Vec<String> = match map.get("keys") {
                Some(MetaValue::List(items)) => items
                    .iter()
                    .filter_map(|v| v.scalar_string())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                Some(other) => other.scalar_string().into_iter().collect(),
                None => Vec::new(),
            };
            if keys.is_empty() {
                return Err(format!("group rule {index} lists no keys"));
            }
            let render_as =
                string_field(map, "render_as").unwrap_or_else(|| DEFAULT_GROUP_STYLE.to_string());
            Ok(LayoutRule::Group { render_as, keys })
        }
        other => Err(format!("layout entry {index} has unknown type '{other}'")),
    }
}

/// Read the `layout` field of `meta`.
pub fn parse_layout(meta: &MetaMap) -> ParsedLayout {
    let mut parsed = ParsedLayout::default();
    match meta.get(LAYOUT_KEY) {
        None | Some(MetaValue::Null) => {}
        Some(MetaValue::List(entries)) => {
            for (index, entry) in entries.iter().enumerate() {
                match parse_rule(index, entry) {
                    Ok(rule) => parsed.rules.push(rule),
                    Err(warning) => {
                        tracing::debug!("skipping layout rule: {warning}");
                        parsed.warnings.push(warning);
                    }
                }
            }
        }
        Some(_) => parsed
            .warnings
            .push("'layout' must be a list of rules".to_string()),
    }
    parsed
}

/// Build the display model for `meta` under `rules`. The `layout` field itself never appears.
pub fn evaluate_layout(meta: &MetaMap, rules: &[LayoutRule]) -> Vec<RenderItem> {
    // First group to claim a key owns it.
    let mut owner: BTreeMap<&str, usize> = BTreeMap::new();
    for (idx, rule) in rules.iter().enumerate() {
        if let LayoutRule::Group { keys, .. } = rule {
            for key in keys {
                owner.entry(key.as_str()).or_insert(idx);
            }
        }
    }
    let headers_for = |key: &str| -> Vec<RenderItem> {
        rules
            .iter()
            .filter_map(|rule| match rule {
                LayoutRule::Header { text, anchor } if anchor == key => {
                    Some(RenderItem::Header { text: text.clone() })
                }
                _ => None,
            })
            .collect()
    };

    let mut items = Vec::new();
    let mut emitted_groups: Vec<usize> = Vec::new();
    for (key, value) in meta.iter() {
        if key == LAYOUT_KEY {
            continue;
        }
        match owner.get(key.as_str()) {
            Some(&group_idx) => {
                if emitted_groups.contains(&group_idx) {
                    continue;
                }
                emitted_groups.push(group_idx);
                let LayoutRule::Group { render_as, keys } = &rules[group_idx] else {
                    continue;
                };
                let present: Vec<&String> = keys
                    .iter()
                    .filter(|k| {
                        k.as_str() != LAYOUT_KEY
                            && meta.contains_key(k)
                            && owner.get(k.as_str()) == Some(&group_idx)
                    })
                    .collect();
                for k in present.iter() {
                    items.extend(headers_for(k.as_str()));
                }
                let fields = present
                    .into_iter()
                    .filter_map(|k| {
                        meta.get(k).map(|v| Field {
                            key: k.clone(),
                            value: v.clone(),
                        })
                    })
                    .collect();
                items.push(RenderItem::Group {
                    render_as: render_as.clone(),
                    fields,
                });
            }
            None => {
                items.extend(headers_for(key.as_str()));
                items.push(RenderItem::Field(Field {
                    key: key.clone(),
                    value: value.clone(),
                }));
            }
        }
    }
    items
}
