//! Denormalizer: rebuilds a nested document from flat rows.
//!
//! Each collection axis gets its own query scoped to the root id, so sibling
//! collections never multiply against each other. Leaf axes join through their
//! intermediate table and are grouped by the intermediate key before being
//! attached to the matching item.

use std::collections::HashMap;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use serde_json::{Map, Value};

use super::registry::{Collection, EntitySchema, Shape, ID_COLUMN, POSITION_COLUMN};
use super::Document;

/// Load one aggregate. `Ok(None)` means there is no root row; an aggregate
/// whose collections are all empty still comes back as `Some`.
pub fn reconstruct(
    conn: &Connection,
    schema: &EntitySchema,
    id: &str,
) -> rusqlite::Result<Option<Document>> {
    let Some(mut doc) = load_root(conn, schema, id)? else {
        return Ok(None);
    };

    for collection in schema.top_level() {
        let mut items = load_items(conn, schema, collection, id)?;

        if schema.is_intermediate(collection) {
            let key_column = schema.intermediate_key(collection);
            for leaf in schema.leaves_of(collection.field) {
                let mut groups = load_leaf_groups(conn, schema, collection, leaf, id)?;
                for item in items.iter_mut() {
                    let Value::Object(record) = item else {
                        continue;
                    };
                    let key = record.get(key_column).map(Value::to_string).unwrap_or_default();
                    let leaves = groups.remove(&key).unwrap_or_default();
                    record.insert(leaf.field.to_string(), Value::Array(leaves));
                }
            }
        }

        doc.insert(collection.field.to_string(), Value::Array(items));
    }

    Ok(Some(doc))
}

fn load_root(
    conn: &Connection,
    schema: &EntitySchema,
    id: &str,
) -> rusqlite::Result<Option<Document>> {
    let mut names = vec![ID_COLUMN];
    names.extend(schema.columns.iter().map(|c| c.name));

    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        column_list(None, &names),
        quote(schema.table),
        quote(ID_COLUMN)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id])?;

    match rows.next()? {
        Some(row) => Ok(Some(read_record(row, 0, &names)?)),
        None => Ok(None),
    }
}

/// Items of a first-level collection, in insertion order.
fn load_items(
    conn: &Connection,
    schema: &EntitySchema,
    collection: &Collection,
    id: &str,
) -> rusqlite::Result<Vec<Value>> {
    let names: Vec<_> = collection.columns.iter().map(|c| c.name).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
        column_list(None, &names),
        quote(collection.table),
        quote(schema.owner_column),
        quote(POSITION_COLUMN)
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map([id], |row| read_item(collection, row, 0, &names))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Leaf items of every intermediate entity under one root, keyed by the
/// intermediate entity's key (rendered as JSON text).
fn load_leaf_groups(
    conn: &Connection,
    schema: &EntitySchema,
    intermediate: &Collection,
    leaf: &Collection,
    id: &str,
) -> rusqlite::Result<HashMap<String, Vec<Value>>> {
    let Some(parent) = leaf.parent else {
        return Ok(HashMap::new());
    };
    let key_column = schema.intermediate_key(intermediate);
    let names: Vec<_> = leaf.columns.iter().map(|c| c.name).collect();
    let owner = quote(schema.owner_column);

    let sql = format!(
        "SELECT p.{key}, {cols} FROM {parent_table} p \
         JOIN {leaf_table} l ON l.{owner} = p.{owner} AND l.{parent_col} = p.{key} \
         WHERE p.{owner} = ?1 \
         ORDER BY p.{pos}, l.{pos}",
        key = quote(key_column),
        cols = column_list(Some("l"), &names),
        parent_table = quote(intermediate.table),
        leaf_table = quote(leaf.table),
        owner = owner,
        parent_col = quote(parent.column),
        pos = quote(POSITION_COLUMN),
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id])?;
    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let key = cell(row.get_ref(0)?).to_string();
        let item = read_item(leaf, row, 1, &names)?;
        groups.entry(key).or_default().push(item);
    }
    Ok(groups)
}

fn read_item(
    collection: &Collection,
    row: &Row<'_>,
    offset: usize,
    names: &[&str],
) -> rusqlite::Result<Value> {
    match collection.shape {
        Shape::Value => Ok(cell(row.get_ref(offset)?)),
        Shape::Record { .. } => Ok(Value::Object(read_record(row, offset, names)?)),
    }
}

fn read_record(row: &Row<'_>, offset: usize, names: &[&str]) -> rusqlite::Result<Document> {
    let mut record = Map::new();
    for (i, name) in names.iter().enumerate() {
        record.insert(name.to_string(), cell(row.get_ref(offset + i)?));
    }
    Ok(record)
}

fn cell(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

fn column_list(alias: Option<&str>, names: &[&str]) -> String {
    names
        .iter()
        .map(|name| match alias {
            Some(alias) => format!("{}.{}", alias, quote(name)),
            None => quote(name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
