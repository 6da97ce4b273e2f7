//! Todo list view models decoded from stored documents.
//!
//! # Responsibility
//! - Define the immutable read models handed to callers.
//! - Own the single decode step from raw store documents to typed values.
//!
//! # Invariants
//! - View models are only built by `from_document`; there is no public
//!   constructor, so every instance reflects a document that passed decoding.
//! - Decoding is exhaustive: a missing or mistyped field fails the whole
//!   document, never a best-effort partial value.

use crate::model::object_id::ObjectId;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Raw store document shape.
pub type Document = Map<String, Value>;

/// Persisted field names.
pub mod fields {
    pub const ID: &str = "_id";
    pub const NAME: &str = "name";
    pub const ITEMS: &str = "items";
    pub const ITEM_COUNT: &str = "item_count";
    pub const ITEM_ID: &str = "id";
    pub const LABEL: &str = "label";
    pub const IS_CHECKED: &str = "is_checked";
}

/// Reason a stored document failed view-model decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    MissingField(String),
    WrongType {
        path: String,
        expected: &'static str,
    },
}

impl DocumentError {
    /// Dotted/indexed path of the offending field.
    pub fn path(&self) -> &str {
        match self {
            Self::MissingField(path) => path,
            Self::WrongType { path, .. } => path,
        }
    }
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(path) => write!(f, "missing field `{path}`"),
            Self::WrongType { path, expected } => {
                write!(f, "field `{path}` is not a valid {expected}")
            }
        }
    }
}

impl Error for DocumentError {}

/// Enumeration projection of a list: identity, name and item count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSummary {
    id: ObjectId,
    name: String,
    item_count: u64,
}

impl ListSummary {
    /// Decodes a document projected to `{_id, name, item_count}`.
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        Ok(Self {
            id: object_id_field(doc, fields::ID, fields::ID)?,
            name: string_field(doc, fields::NAME, fields::NAME)?,
            item_count: count_field(doc, fields::ITEM_COUNT, fields::ITEM_COUNT)?,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }
}

/// One checkable entry of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoItem {
    id: String,
    label: String,
    is_checked: bool,
}

impl TodoItem {
    /// Decodes an embedded item document.
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        Self::decode_at(doc, "")
    }

    fn decode_at(doc: &Document, prefix: &str) -> Result<Self, DocumentError> {
        let path = |field: &str| format!("{prefix}{field}");
        Ok(Self {
            id: string_field(doc, fields::ITEM_ID, &path(fields::ITEM_ID))?,
            label: string_field(doc, fields::LABEL, &path(fields::LABEL))?,
            is_checked: bool_field(doc, fields::IS_CHECKED, &path(fields::IS_CHECKED))?,
        })
    }

    /// Client-generated id, unique within the parent list.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_checked(&self) -> bool {
        self.is_checked
    }
}

/// Full list with its ordered items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoList {
    id: ObjectId,
    name: String,
    items: Vec<TodoItem>,
}

impl TodoList {
    /// Decodes a full list document.
    ///
    /// # Errors
    /// - Returns `DocumentError` naming the first missing or mistyped field,
    ///   including fields of embedded items (`items[3].label`).
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        let id = object_id_field(doc, fields::ID, fields::ID)?;
        let name = string_field(doc, fields::NAME, fields::NAME)?;
        let raw_items = match doc.get(fields::ITEMS) {
            Some(Value::Array(values)) => values,
            Some(_) => return Err(wrong_type(fields::ITEMS, "array")),
            None => return Err(DocumentError::MissingField(fields::ITEMS.to_string())),
        };

        let mut items = Vec::with_capacity(raw_items.len());
        for (index, raw) in raw_items.iter().enumerate() {
            let prefix = format!("{}[{index}]", fields::ITEMS);
            let item_doc = raw.as_object().ok_or_else(|| wrong_type(&prefix, "object"))?;
            items.push(TodoItem::decode_at(item_doc, &format!("{prefix}."))?);
        }

        Ok(Self { id, name, items })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items in insertion order.
    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Looks up an item by its id.
    pub fn item(&self, item_id: &str) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

fn field<'a>(doc: &'a Document, key: &str, path: &str) -> Result<&'a Value, DocumentError> {
    doc.get(key)
        .ok_or_else(|| DocumentError::MissingField(path.to_string()))
}

fn string_field(doc: &Document, key: &str, path: &str) -> Result<String, DocumentError> {
    field(doc, key, path)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(path, "string"))
}

fn bool_field(doc: &Document, key: &str, path: &str) -> Result<bool, DocumentError> {
    field(doc, key, path)?
        .as_bool()
        .ok_or_else(|| wrong_type(path, "boolean"))
}

fn count_field(doc: &Document, key: &str, path: &str) -> Result<u64, DocumentError> {
    field(doc, key, path)?
        .as_u64()
        .ok_or_else(|| wrong_type(path, "non-negative integer"))
}

fn object_id_field(doc: &Document, key: &str, path: &str) -> Result<ObjectId, DocumentError> {
    field(doc, key, path)?
        .as_str()
        .and_then(|text| ObjectId::parse(text).ok())
        .ok_or_else(|| wrong_type(path, "object id"))
}

fn wrong_type(path: &str, expected: &'static str) -> DocumentError {
    DocumentError::WrongType {
        path: path.to_string(),
        expected,
    }
}
