//! Canonical body and field types shared by requests and responses.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use bytes::Bytes;
use serde::Serialize;

/// A value that occurred once, or several times in order.
///
/// Headers, query strings and form fields all fold repeated keys this way:
/// a single occurrence stays a scalar, a repeat turns the entry into a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// The first value, which is the one a single-valued reader wants.
    pub fn first(&self) -> Option<&T> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(values) => values.first(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(value) => std::slice::from_ref(value).iter(),
            Self::Many(values) => values.iter(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a value, promoting a scalar to a list.
    pub fn push(&mut self, value: T) {
        let previous = std::mem::replace(self, Self::Many(Vec::new()));
        *self = match previous {
            Self::One(first) => Self::Many(vec![first, value]),
            Self::Many(mut values) => {
                values.push(value);
                Self::Many(values)
            }
        };
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(value: &str) -> Self {
        Self::One(value.to_owned())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for OneOrMany<String> {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// A string-keyed field map.
///
/// This is a plain hash map: attacker-chosen keys such as `__proto__` or
/// `constructor` are ordinary entries with no effect on anything else.
pub type Fields<T> = HashMap<String, OneOrMany<T>>;

/// Header map of a canonical request or response.
pub type Headers = Fields<String>;

/// Inserts `value` under `key`, folding repeats into a list.
pub(crate) fn append<T>(fields: &mut Fields<T>, key: String, value: T) {
    match fields.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(OneOrMany::One(value));
        }
        Entry::Occupied(mut slot) => slot.get_mut().push(value),
    }
}

/// One part of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Part {
    /// The part's content, if it is UTF-8 text.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// A canonical request or response body.
///
/// `Text` and `Bytes` go over the wire untouched; every other variant is
/// structured and serialises to JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
    Json(serde_json::Value),
    Form(Fields<String>),
    Multipart(Fields<Part>),
}

impl Body {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&Fields<String>> {
        match self {
            Self::Form(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_multipart(&self) -> Option<&Fields<Part>> {
        match self {
            Self::Multipart(fields) => Some(fields),
            _ => None,
        }
    }

    /// Serialises a structured body. `None` for text and bytes.
    pub(crate) fn to_json(&self) -> Option<Result<Vec<u8>, serde_json::Error>> {
        match self {
            Self::Text(_) | Self::Bytes(_) => None,
            Self::Json(value) => Some(serde_json::to_vec(value)),
            Self::Form(fields) => Some(serde_json::to_vec(fields)),
            Self::Multipart(fields) => Some(serde_json::to_vec(fields)),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}
