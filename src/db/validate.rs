//! Registry-driven payload validation.
//!
//! Runs before any transaction is opened. A payload that passes here can be
//! normalized without further shape checks.

use std::collections::HashSet;

use serde_json::Value;

use crate::models::EntityKind;

use super::error::{StoreError, StoreResult};
use super::registry::{Collection, Column, ColumnType, EntitySchema, Shape, ID_COLUMN};
use super::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A full aggregate: required root fields must be present.
    Create,
    /// A partial update: only fields present are checked.
    Patch,
}

/// Borrow `value` as a document, rejecting anything that is not a JSON object.
pub fn as_document(value: &Value) -> StoreResult<&Document> {
    value
        .as_object()
        .ok_or_else(|| StoreError::validation("payload must be a JSON object"))
}

/// The caller-supplied id, if any. `null` counts as absent.
/// Ids are stored verbatim and may not carry surrounding whitespace.
pub fn supplied_id(doc: &Document) -> StoreResult<Option<&str>> {
    match doc.get(ID_COLUMN) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(StoreError::validation("id must be a non-empty string"))
        }
        Some(Value::String(s)) if s.trim() != s => Err(StoreError::validation(
            "id must not start or end with whitespace",
        )),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(StoreError::validation("id must be a non-empty string")),
    }
}

pub fn validate(schema: &EntitySchema, doc: &Document, mode: Mode) -> StoreResult<()> {
    supplied_id(doc)?;

    for key in doc.keys() {
        if key != ID_COLUMN && schema.column(key).is_none() && schema.collection(key).is_none() {
            return Err(StoreError::validation(format!(
                "unknown field '{}' on {}",
                key, schema.kind
            )));
        }
    }

    for column in schema.columns {
        match doc.get(column.name) {
            Some(value) => check_cell(column, value, column.name)?,
            None if mode == Mode::Create && column.required => {
                return Err(StoreError::validation(format!(
                    "missing required field '{}'",
                    column.name
                )));
            }
            None => {}
        }
    }

    for collection in schema.top_level() {
        if let Some(value) = doc.get(collection.field) {
            check_collection(schema, collection, value, collection.field)?;
        }
    }

    Ok(())
}

fn check_cell(column: &Column, value: &Value, path: &str) -> StoreResult<()> {
    let ok = match (column.ty, value) {
        (_, Value::Null) => !column.required,
        (ColumnType::Text, Value::String(s)) => !(column.required && s.trim().is_empty()),
        (ColumnType::Integer, Value::Number(n)) => n.as_i64().is_some(),
        _ => false,
    };
    if ok {
        return Ok(());
    }

    let expected = match column.ty {
        ColumnType::Text if column.required => "a non-empty string",
        ColumnType::Text => "a string or null",
        ColumnType::Integer if column.required => "an integer",
        ColumnType::Integer => "an integer or null",
    };
    Err(StoreError::validation(format!(
        "'{}' must be {}",
        path, expected
    )))
}

fn check_collection(
    schema: &EntitySchema,
    collection: &Collection,
    value: &Value,
    path: &str,
) -> StoreResult<()> {
    let items = value
        .as_array()
        .ok_or_else(|| StoreError::validation(format!("'{}' must be an array", path)))?;

    let key_columns = collection.key_columns();
    let mut seen = HashSet::new();

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);

        let key = match collection.shape {
            Shape::Value => {
                if item.is_null() {
                    return Err(StoreError::validation(format!(
                        "'{}' must not be null",
                        item_path
                    )));
                }
                check_cell(&collection.columns[0], item, &item_path)?;
                item.to_string()
            }
            Shape::Record { .. } => {
                let record = item.as_object().ok_or_else(|| {
                    StoreError::validation(format!("'{}' must be an object", item_path))
                })?;
                check_record(schema, collection, record, &item_path)?;
                key_columns
                    .iter()
                    .map(|k| record.get(*k).unwrap_or(&Value::Null).to_string())
                    .collect::<Vec<_>>()
                    .join("\u{1f}")
            }
        };

        if !seen.insert(key) {
            return Err(StoreError::validation(format!(
                "'{}' repeats an earlier item in '{}'",
                item_path, path
            )));
        }
    }

    Ok(())
}

fn check_record(
    schema: &EntitySchema,
    collection: &Collection,
    record: &Document,
    path: &str,
) -> StoreResult<()> {
    let is_intermediate = schema.is_intermediate(collection);

    for key in record.keys() {
        let known = collection.column(key).is_some()
            || (is_intermediate && schema.leaf(collection.field, key).is_some());
        if !known {
            return Err(StoreError::validation(format!(
                "unknown field '{}' in '{}'",
                key, path
            )));
        }
    }

    for column in collection.columns {
        let cell_path = format!("{}.{}", path, column.name);
        match record.get(column.name) {
            Some(value) => check_cell(column, value, &cell_path)?,
            None if column.required => {
                return Err(StoreError::validation(format!(
                    "missing required field '{}'",
                    cell_path
                )));
            }
            None => {}
        }
    }

    if is_intermediate {
        for leaf in schema.leaves_of(collection.field) {
            if let Some(value) = record.get(leaf.field) {
                check_collection(schema, leaf, value, &format!("{}.{}", path, leaf.field))?;
            }
        }
    }

    Ok(())
}

/// A weak reference found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Where the reference sits, e.g. `faction_control` or `districts.npcs`.
    pub field: String,
    pub target: EntityKind,
    pub id: String,
}

/// Every distinct weak reference in an already validated payload, in
/// document order.
pub fn references(schema: &EntitySchema, doc: &Document) -> Vec<Reference> {
    let mut found = Vec::new();

    for column in schema.columns {
        if let (Some(target), Some(Value::String(id))) = (column.references, doc.get(column.name)) {
            found.push(Reference {
                field: column.name.to_string(),
                target,
                id: id.clone(),
            });
        }
    }

    for collection in schema.top_level() {
        let Some(Value::Array(items)) = doc.get(collection.field) else {
            continue;
        };
        collect_references(collection, items, collection.field, &mut found);

        for leaf in schema.leaves_of(collection.field) {
            let path = format!("{}.{}", collection.field, leaf.field);
            for item in items {
                if let Some(Value::Array(leaf_items)) = item.get(leaf.field) {
                    collect_references(leaf, leaf_items, &path, &mut found);
                }
            }
        }
    }

    let mut seen = HashSet::new();
    found.retain(|r| seen.insert(r.clone()));
    found
}

fn collect_references(
    collection: &Collection,
    items: &[Value],
    path: &str,
    found: &mut Vec<Reference>,
) {
    for column in collection.columns {
        let Some(target) = column.references else {
            continue;
        };
        for item in items {
            let cell = match collection.shape {
                Shape::Value => Some(item),
                Shape::Record { .. } => item.get(column.name),
            };
            if let Some(Value::String(id)) = cell {
                found.push(Reference {
                    field: path.to_string(),
                    target,
                    id: id.clone(),
                });
            }
        }
    }
}
