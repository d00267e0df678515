use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Derived attribute holding the entry name.
pub const NAME_KEY: &str = "name";
/// Derived attribute holding the entry content type.
pub const CONTENT_TYPE_KEY: &str = "contentType";

pub const DERIVED_KEYS: [&str; 2] = [NAME_KEY, CONTENT_TYPE_KEY];

pub fn is_derived_key(key: &str) -> bool {
    DERIVED_KEYS.contains(&key)
}

/// Scalar value stored under an attribute key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(value) => write!(f, "{value}"),
            AttributeValue::Number(value) => write!(f, "{value}"),
            AttributeValue::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value.into())
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        AttributeValue::Number(value.into())
    }
}

impl From<serde_json::Number> for AttributeValue {
    fn from(value: serde_json::Number) -> Self {
        AttributeValue::Number(value)
    }
}

impl AttributeValue {
    /// Reads a CLI-style literal: `true`/`false`, a JSON number, or else a string.
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "true" => AttributeValue::Bool(true),
            "false" => AttributeValue::Bool(false),
            _ => match serde_json::from_str::<serde_json::Number>(raw) {
                Ok(number) => AttributeValue::Number(number),
                Err(_) => AttributeValue::String(raw.to_string()),
            },
        }
    }
}

/// Out-of-band record attached to an entry.
///
/// Every mutation takes `self` by value and hands back the new record;
/// persisting it is a separate step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeValue>,
}

impl MetaData {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    pub fn add_tag(mut self, tag: &str) -> Self {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
        self
    }

    pub fn remove_tag(mut self, tag: &str) -> Self {
        if let Some(position) = self.tags.iter().position(|existing| existing == tag) {
            self.tags.remove(position);
        }
        self
    }

    pub fn add_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        if !is_derived_key(key) {
            self.attributes.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn remove_attribute(mut self, key: &str) -> Self {
        if !is_derived_key(key) {
            self.attributes.shift_remove(key);
        }
        self
    }

    /// The record as it may be persisted: derived keys dropped.
    pub fn without_derived(mut self) -> Self {
        self.attributes.retain(|key, _| !is_derived_key(key));
        self
    }

    /// Overlays derived values. They come first and win over stored keys of the same name.
    pub fn with_derived(self, name: &str, content_type: &str) -> Self {
        let mut attributes = IndexMap::with_capacity(self.attributes.len() + DERIVED_KEYS.len());
        attributes.insert(NAME_KEY.to_string(), AttributeValue::from(name));
        attributes.insert(CONTENT_TYPE_KEY.to_string(), AttributeValue::from(content_type));
        for (key, value) in self.attributes {
            if !is_derived_key(&key) {
                attributes.insert(key, value);
            }
        }
        Self {
            tags: self.tags,
            attributes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.attributes.is_empty()
    }
}
