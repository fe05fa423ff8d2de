//! Documents stored under paths.
//!
//! A [`Document`] is either a [`Scalar`] stored as a single leaf, or a
//! composite mapping child segments to documents. Composites never occupy a
//! key of their own; they exist only through their leaves, which is why an
//! empty composite cannot be stored and reads back as absent.
//!
//! JSON arrays have no dedicated variant. They are converted to composites
//! keyed by the stringified index, and any composite whose keys are exactly
//! `"0"` to `"n-1"` renders back as a JSON array.
//!
//! ```rust
//! use livetree::Document;
//! use serde_json::json;
//!
//! let doc = Document::from(json!({"tags": ["awesome", "hello"]}));
//! assert_eq!(doc.get(&["tags", "1"]), Some(&Document::from("hello")));
//! assert_eq!(doc.to_json(), json!({"tags": ["awesome", "hello"]}));
//! ```

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// A leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    /// Converts a JSON value, returning `None` for arrays and objects.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(b)),
            Value::Number(n) => Some(Scalar::Number(n)),
            Value::String(s) => Some(Scalar::String(s)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Child documents of a composite, ordered by segment.
pub type Children = BTreeMap<String, Document>;

/// A scalar leaf or a composite of child documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Scalar(Scalar),
    Composite(Children),
}

impl Document {
    /// An empty composite.
    pub fn empty() -> Self {
        Document::Composite(Children::new())
    }

    pub fn null() -> Self {
        Document::Scalar(Scalar::Null)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Document::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Document::Scalar(scalar) => Some(scalar),
            Document::Composite(_) => None,
        }
    }

    /// Direct children, or `None` for a scalar.
    pub fn children(&self) -> Option<&Children> {
        match self {
            Document::Composite(children) => Some(children),
            Document::Scalar(_) => None,
        }
    }

    /// Check if this is a composite without any children.
    pub fn is_empty(&self) -> bool {
        matches!(self, Document::Composite(children) if children.is_empty())
    }

    /// Looks up a nested document by relative segments.
    pub fn get<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Document> {
        let mut current = self;
        for segment in segments {
            current = current.children()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Sets the document at `segments` below `self`.
    ///
    /// Missing intermediate levels are created, and scalars found on the way
    /// are replaced by composites. An empty `segments` replaces `self`.
    pub fn insert_at(&mut self, segments: &[String], value: Document) {
        let Some((first, rest)) = segments.split_first() else {
            *self = value;
            return;
        };
        if self.is_scalar() {
            *self = Document::empty();
        }
        let Document::Composite(children) = self else {
            return;
        };
        children
            .entry(first.clone())
            .or_insert_with(Document::empty)
            .insert_at(rest, value);
    }

    /// Removes the document at `segments` below `self` and returns it.
    ///
    /// Removing an absent entry is a no-op. Composites left empty by the
    /// removal are pruned, since an empty composite is not representable in
    /// storage. An empty `segments` removes nothing.
    pub fn remove_at(&mut self, segments: &[String]) -> Option<Document> {
        let (first, rest) = segments.split_first()?;
        let Document::Composite(children) = self else {
            return None;
        };
        if rest.is_empty() {
            return children.remove(first);
        }
        let child = children.get_mut(first)?;
        let removed = child.remove_at(rest);
        if child.is_empty() {
            children.remove(first);
        }
        removed
    }

    /// Flattens the document into `(relative segments, scalar)` leaves.
    ///
    /// A scalar yields one leaf with empty segments; an empty composite yields
    /// no leaves at all.
    pub fn leaves(&self) -> Vec<(Vec<String>, &Scalar)> {
        let mut leaves = Vec::new();
        let mut prefix = Vec::new();
        collect_leaves(self, &mut prefix, &mut leaves);
        leaves
    }

    /// Renders the document as JSON, turning index-keyed composites into arrays.
    pub fn to_json(&self) -> Value {
        match self {
            Document::Scalar(scalar) => scalar.to_json(),
            Document::Composite(children) => {
                if is_array_like(children) {
                    let mut items: Vec<(usize, Value)> = children
                        .iter()
                        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v.to_json())))
                        .collect();
                    items.sort_by_key(|(index, _)| *index);
                    Value::Array(items.into_iter().map(|(_, v)| v).collect())
                } else {
                    Value::Object(
                        children
                            .iter()
                            .map(|(k, v)| (k.clone(), v.to_json()))
                            .collect::<Map<_, _>>(),
                    )
                }
            }
        }
    }
}

fn collect_leaves<'a>(
    doc: &'a Document,
    prefix: &mut Vec<String>,
    leaves: &mut Vec<(Vec<String>, &'a Scalar)>,
) {
    match doc {
        Document::Scalar(scalar) => leaves.push((prefix.clone(), scalar)),
        Document::Composite(children) => {
            for (segment, child) in children {
                prefix.push(segment.clone());
                collect_leaves(child, prefix, leaves);
                prefix.pop();
            }
        }
    }
}

/// Keys are exactly the canonical decimal indices `0..len`.
fn is_array_like(children: &Children) -> bool {
    if children.is_empty() {
        return false;
    }
    let mut seen = vec![false; children.len()];
    for key in children.keys() {
        let canonical = key == "0" || !key.starts_with('0');
        match key.parse::<usize>() {
            Ok(index) if canonical && index < seen.len() && key.bytes().all(|b| b.is_ascii_digit()) => {
                seen[index] = true;
            }
            _ => return false,
        }
    }
    seen.into_iter().all(|present| present)
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Document::Composite(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), Document::from(v)))
                    .collect(),
            ),
            Value::Object(map) => Document::Composite(
                map.into_iter()
                    .map(|(k, v)| (k, Document::from(v)))
                    .collect(),
            ),
            scalar => Scalar::from_json(scalar)
                .map(Document::Scalar)
                .unwrap_or_else(Document::null),
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.to_json()
    }
}

impl From<Scalar> for Document {
    fn from(scalar: Scalar) -> Self {
        Document::Scalar(scalar)
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::Scalar(Scalar::String(s))
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Document {
    fn from(n: i64) -> Self {
        Document::Scalar(Scalar::Number(n.into()))
    }
}

impl From<u64> for Document {
    fn from(n: u64) -> Self {
        Document::Scalar(Scalar::Number(n.into()))
    }
}

impl From<f64> for Document {
    /// Non-finite numbers have no JSON representation and become `null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n)
            .map(|n| Document::Scalar(Scalar::Number(n)))
            .unwrap_or_else(Document::null)
    }
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Document::from)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
