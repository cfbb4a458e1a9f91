//! Structured page metadata parsed from the YAML block.
//!
//! Metadata is open-ended: any key is accepted and key order is preserved, because the layout
//! rules and the default display model both follow the order in which the author wrote fields.

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_yaml::Value as YamlValue;
use std::fmt;

use crate::error::MetadataError;

pub const TAGS_KEY: &str = "tags";
pub const LAYOUT_KEY: &str = "layout";
pub const IMAGE_KEY: &str = "image";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum MetaValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<MetaValue>),
    Map(MetaMap),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MetaMap> {
        match self {
            MetaValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Scalars as text. Lists, maps and null have no scalar form.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            MetaValue::Bool(b) => Some(b.to_string()),
            MetaValue::Integer(i) => Some(i.to_string()),
            MetaValue::Float(f) => Some(f.to_string()),
            MetaValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<&YamlValue> for MetaValue {
    fn from(value: &YamlValue) -> Self {
        match value {
            YamlValue::Null => MetaValue::Null,
            YamlValue::Bool(b) => MetaValue::Bool(*b),
            YamlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetaValue::Integer(i)
                } else {
                    MetaValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            YamlValue::String(s) => MetaValue::String(s.clone()),
            YamlValue::Sequence(seq) => MetaValue::List(seq.iter().map(MetaValue::from).collect()),
            YamlValue::Mapping(mapping) => {
                let mut map = MetaMap::default();
                for (k, v) in mapping.iter() {
                    match yaml_key_string(k) {
                        Some(key) => map.insert(key, MetaValue::from(v)),
                        None => tracing::warn!("Skipping non-scalar metadata key {:?}", k),
                    }
                }
                MetaValue::Map(map)
            }
            YamlValue::Tagged(tagged) => MetaValue::from(&tagged.value),
        }
    }
}

fn yaml_key_string(key: &YamlValue) -> Option<String> {
    match key {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Null => Some("null".to_string()),
        YamlValue::Tagged(tagged) => yaml_key_string(&tagged.value),
        _ => None,
    }
}

/// Insertion-ordered string map. Re-inserting a key replaces the value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaMap(Vec<(String, MetaValue)>);

impl MetaMap {
    pub fn new() -> MetaMap {
        MetaMap::default()
    }

    pub fn insert(&mut self, key: String, value: MetaValue) {
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, MetaValue)> for MetaMap {
    fn from_iter<T: IntoIterator<Item = (String, MetaValue)>>(iter: T) -> Self {
        let mut map = MetaMap::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for MetaMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct MetaMapVisitor;

impl<'de> Visitor<'de> for MetaMapVisitor {
    type Value = MetaMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of metadata fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MetaMap, A::Error> {
        let mut map = MetaMap::default();
        while let Some((key, value)) = access.next_entry::<String, MetaValue>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for MetaMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<MetaMap, D::Error> {
        deserializer.deserialize_map(MetaMapVisitor)
    }
}

/// Parse the raw YAML of a metadata block. Error lines are shifted past the opening delimiter so
/// they refer to lines of the page file.
pub fn parse_metadata(raw: &str) -> Result<MetaMap, MetadataError> {
    if raw.trim().is_empty() {
        return Ok(MetaMap::default());
    }
    let value: YamlValue = serde_yaml::from_str(raw).map_err(|e| {
        let location = e.location();
        MetadataError {
            message: e.to_string(),
            line: location.as_ref().map(|l| l.line() + 1),
            column: location.as_ref().map(|l| l.column()),
        }
    })?;
    match MetaValue::from(&value) {
        MetaValue::Map(map) => Ok(map),
        MetaValue::Null => Ok(MetaMap::default()),
        other => Err(MetadataError {
            message: format!(
                "metadata block must be a mapping of fields, found {}",
                describe(&other)
            ),
            line: Some(2),
            column: Some(1),
        }),
    }
}

fn describe(value: &MetaValue) -> &'static str {
    match value {
        MetaValue::Null => "null",
        MetaValue::Bool(_) => "a boolean",
        MetaValue::Integer(_) | MetaValue::Float(_) => "a number",
        MetaValue::String(_) => "a string",
        MetaValue::List(_) => "a list",
        MetaValue::Map(_) => "a map",
    }
}

/// Tags from the `tags` field: a list, or a single comma separated string. A leading `#` is
/// dropped, blanks are skipped, and the first spelling of a duplicate wins.
pub fn extract_tags(meta: &MetaMap) -> Vec<String> {
    let raw: Vec<String> = match meta.get(TAGS_KEY) {
        Some(MetaValue::List(items)) => items.iter().filter_map(|v| v.scalar_string()).collect(),
        Some(MetaValue::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(other) => other.scalar_string().into_iter().collect(),
        None => Vec::new(),
    };
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim().trim_start_matches('#').trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
