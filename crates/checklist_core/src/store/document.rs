//! In-process evaluation of filters, update operators and projections.
//!
//! # Responsibility
//! - Decide whether a stored document satisfies a `Filter`.
//! - Apply `Update` operators to a document copy.
//! - Shape enumeration output according to a `Projection`.
//!
//! # Invariants
//! - `apply_update` either fully applies or returns an error; callers write
//!   back only on success, so a failed operator never persists a half state.

use super::{Filter, Projection, StoreError, StoreResult, Update};
use crate::model::todo_list::Document;
use serde_json::Value;

/// Returns whether `doc` satisfies every non-`_id` condition of `filter`.
///
/// `_id` equality is resolved by the caller against the stored key.
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    filter.conditions().iter().all(|(path, expected)| {
        let segments: Vec<&str> = path.split('.').collect();
        match segments.split_first() {
            Some((head, rest)) => doc
                .get(*head)
                .is_some_and(|value| value_matches(value, rest, expected)),
            None => false,
        }
    })
}

fn value_matches(value: &Value, path: &[&str], expected: &Value) -> bool {
    match path.split_first() {
        None => match value {
            Value::Array(elements) if !expected.is_array() => {
                elements.iter().any(|element| element == expected)
            }
            other => other == expected,
        },
        Some((head, rest)) => match value {
            Value::Object(map) => map
                .get(*head)
                .is_some_and(|child| value_matches(child, rest, expected)),
            Value::Array(elements) => elements
                .iter()
                .any(|element| value_matches(element, path, expected)),
            _ => false,
        },
    }
}

/// Applies `update` to `doc` in place.
///
/// # Errors
/// - `InvalidUpdate` when the target field exists but is not an array, or a
///   positional set finds no matching element.
pub fn apply_update(doc: &mut Document, update: &Update) -> StoreResult<()> {
    match update {
        Update::Push { array, value } => {
            match doc
                .entry(array.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(elements) => {
                    elements.push(value.clone());
                    Ok(())
                }
                _ => Err(not_an_array(array)),
            }
        }
        Update::SetMatched {
            array,
            key,
            key_value,
            field,
            value,
        } => {
            let elements = match doc.get_mut(array) {
                Some(Value::Array(elements)) => elements,
                Some(_) => return Err(not_an_array(array)),
                None => {
                    return Err(StoreError::InvalidUpdate(format!(
                        "positional update on missing array `{array}`"
                    )))
                }
            };
            let target = elements
                .iter_mut()
                .filter_map(Value::as_object_mut)
                .find(|element| element.get(key) == Some(key_value))
                .ok_or_else(|| {
                    StoreError::InvalidUpdate(format!(
                        "no element of `{array}` has `{key}` = {key_value}"
                    ))
                })?;
            target.insert(field.clone(), value.clone());
            Ok(())
        }
        Update::Pull {
            array,
            key,
            key_value,
        } => match doc.get_mut(array) {
            Some(Value::Array(elements)) => {
                elements.retain(|element| {
                    element
                        .as_object()
                        .map_or(true, |object| object.get(key) != Some(key_value))
                });
                Ok(())
            }
            Some(_) => Err(not_an_array(array)),
            None => Ok(()),
        },
    }
}

/// Builds the projected output for one stored document.
///
/// `id` is the stored key rendered into `_id`.
pub fn project(id: &str, doc: &Document, projection: &Projection) -> StoreResult<Document> {
    let mut out = Document::new();
    out.insert("_id".to_string(), Value::String(id.to_string()));

    for field in projection.included() {
        if let Some(value) = doc.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }

    for (output, array) in projection.sizes() {
        let len = match doc.get(array) {
            Some(Value::Array(elements)) => elements.len(),
            _ => {
                return Err(StoreError::InvalidDocument {
                    id: id.to_string(),
                    reason: format!("cannot take size of non-array field `{array}`"),
                })
            }
        };
        out.insert(output.clone(), Value::from(len));
    }

    Ok(out)
}

fn not_an_array(field: &str) -> StoreError {
    StoreError::InvalidUpdate(format!("field `{field}` is not an array"))
}

#[cfg(test)]
mod tests {
    use super::{apply_update, matches, project};
    use crate::model::todo_list::Document;
    use crate::store::{Filter, Projection, StoreError, Update};
    use serde_json::{json, Value};

    fn list_doc() -> Document {
        json!({
            "name": "Groceries",
            "items": [
                {"id": "a1", "label": "Milk", "is_checked": false},
                {"id": "b2", "label": "Eggs", "is_checked": false},
            ],
        })
        .as_object()
        .cloned()
        .expect("object literal")
    }

    #[test]
    fn filter_descends_into_arrays() {
        let doc = list_doc();
        assert!(matches(&doc, &Filter::all()));
        assert!(matches(&doc, &Filter::all().and_eq("items.id", "b2")));
        assert!(!matches(&doc, &Filter::all().and_eq("items.id", "zz")));
        assert!(matches(&doc, &Filter::all().and_eq("name", "Groceries")));
        assert!(!matches(&doc, &Filter::all().and_eq("missing.path", 1)));
    }

    #[test]
    fn push_appends_and_creates_missing_array() {
        let mut doc = list_doc();
        apply_update(
            &mut doc,
            &Update::Push {
                array: "items".into(),
                value: json!({"id": "c3", "label": "Bread", "is_checked": false}),
            },
        )
        .unwrap();
        assert_eq!(doc["items"].as_array().unwrap().len(), 3);

        let mut empty = Document::new();
        apply_update(
            &mut empty,
            &Update::Push {
                array: "items".into(),
                value: json!(1),
            },
        )
        .unwrap();
        assert_eq!(empty["items"], json!([1]));
    }

    #[test]
    fn push_onto_scalar_fails_without_mutation() {
        let mut doc = list_doc();
        doc.insert("items".into(), json!("oops"));
        let before = doc.clone();
        let err = apply_update(
            &mut doc,
            &Update::Push {
                array: "items".into(),
                value: json!(1),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate(_)));
        assert_eq!(doc, before);
    }

    #[test]
    fn set_matched_touches_only_the_matching_element() {
        let mut doc = list_doc();
        apply_update(
            &mut doc,
            &Update::SetMatched {
                array: "items".into(),
                key: "id".into(),
                key_value: json!("b2"),
                field: "is_checked".into(),
                value: Value::Bool(true),
            },
        )
        .unwrap();
        assert_eq!(doc["items"][0]["is_checked"], json!(false));
        assert_eq!(doc["items"][1]["is_checked"], json!(true));
        assert_eq!(doc["items"][1]["label"], json!("Eggs"));
    }

    #[test]
    fn pull_removes_matching_elements() {
        let mut doc = list_doc();
        apply_update(
            &mut doc,
            &Update::Pull {
                array: "items".into(),
                key: "id".into(),
                key_value: json!("a1"),
            },
        )
        .unwrap();
        let items = doc["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], json!("b2"));
    }

    #[test]
    fn projection_counts_array_and_rejects_non_array() {
        let projection = Projection::new()
            .include("name")
            .size_of("item_count", "items");
        let out = project("abc", &list_doc(), &projection).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"_id": "abc", "name": "Groceries", "item_count": 2})
        );

        let mut broken = list_doc();
        broken.remove("items");
        let err = project("abc", &broken, &projection).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument { .. }));
    }
}
