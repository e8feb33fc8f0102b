//! Normalizer: nested document in, per-table row batches out.

use serde_json::Value;

use super::error::{StoreError, StoreResult};
use super::registry::{Collection, EntitySchema, Shape, ID_COLUMN};
use super::Document;

/// Rows destined for one table. Every row already carries the parent key
/// values threaded down from the root, in the order given by `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    /// Key of the row that owns this batch: `[root id]` for first-level
    /// collections, `[root id, intermediate key]` for leaves, empty for the root.
    pub parent_key: Vec<Value>,
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    fn new(table: &'static str, columns: Vec<&'static str>, parent_key: Vec<Value>) -> Self {
        Self {
            table,
            columns,
            parent_key,
            rows: Vec::new(),
        }
    }
}

/// Split a whole aggregate into batches: the root row first, then each
/// first-level collection followed by the leaf batches of its items.
pub fn normalize(schema: &EntitySchema, id: &str, doc: &Document) -> StoreResult<Vec<RowBatch>> {
    let mut columns = vec![ID_COLUMN];
    columns.extend(schema.columns.iter().map(|c| c.name));

    let mut root = RowBatch::new(schema.table, columns, Vec::new());
    let mut row = vec![Value::String(id.to_string())];
    row.extend(
        schema
            .columns
            .iter()
            .map(|c| doc.get(c.name).cloned().unwrap_or(Value::Null)),
    );
    root.rows.push(row);

    let mut batches = vec![root];
    for collection in schema.top_level() {
        let items = match doc.get(collection.field) {
            Some(value) => items_of(value, collection.field)?,
            None => &[],
        };
        batches.extend(normalize_collection(schema, id, collection, items)?);
    }

    Ok(batches)
}

/// Batches for one first-level collection: the collection's own rows, then,
/// for intermediates, one batch per item and leaf collection. Items without
/// leaves still produce their own row.
pub fn normalize_collection(
    schema: &EntitySchema,
    id: &str,
    collection: &Collection,
    items: &[Value],
) -> StoreResult<Vec<RowBatch>> {
    let owner = Value::String(id.to_string());
    let mut head = RowBatch::new(
        collection.table,
        schema.child_columns(collection),
        vec![owner.clone()],
    );
    let mut leaves = Vec::new();

    for (position, item) in items.iter().enumerate() {
        head.rows.push(child_row(collection, &[owner.clone()], position, item));

        if !schema.is_intermediate(collection) {
            continue;
        }

        let key_column = schema.intermediate_key(collection);
        let key = item.get(key_column).cloned().unwrap_or(Value::Null);
        let parent_key = vec![owner.clone(), key];

        for leaf in schema.leaves_of(collection.field) {
            let mut batch =
                RowBatch::new(leaf.table, schema.child_columns(leaf), parent_key.clone());
            if let Some(value) = item.get(leaf.field) {
                for (position, leaf_item) in items_of(value, leaf.field)?.iter().enumerate() {
                    batch
                        .rows
                        .push(child_row(leaf, &parent_key, position, leaf_item));
                }
            }
            leaves.push(batch);
        }
    }

    let mut batches = vec![head];
    batches.extend(leaves);
    Ok(batches)
}

/// Root column assignments for a partial update, in registry order.
pub fn root_assignments(schema: &EntitySchema, doc: &Document) -> Vec<(&'static str, Value)> {
    schema
        .columns
        .iter()
        .filter_map(|c| doc.get(c.name).map(|v| (c.name, v.clone())))
        .collect()
}

fn child_row(
    collection: &Collection,
    parent_key: &[Value],
    position: usize,
    item: &Value,
) -> Vec<Value> {
    let mut row = parent_key.to_vec();
    row.push(Value::from(position as i64));
    match collection.shape {
        Shape::Value => row.push(item.clone()),
        Shape::Record { .. } => row.extend(
            collection
                .columns
                .iter()
                .map(|c| item.get(c.name).cloned().unwrap_or(Value::Null)),
        ),
    }
    row
}

fn items_of<'a>(value: &'a Value, field: &str) -> StoreResult<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| StoreError::validation(format!("'{}' must be an array", field)))
}

/// Store representation of a normalized cell.
pub(crate) fn to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::registry::{LOCATION, QUEST};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn root_batch_comes_first_with_every_column() {
        let batches = normalize(&LOCATION, "loc-1", &doc(json!({"name": "Ravenhollow"}))).unwrap();
        let root = &batches[0];
        assert_eq!(root.table, "locations");
        assert_eq!(root.columns[0], "id");
        assert_eq!(root.rows.len(), 1);
        assert_eq!(root.rows[0][0], json!("loc-1"));
        assert_eq!(root.rows[0][1], json!("Ravenhollow"));
        assert!(root.rows[0][2..].iter().all(Value::is_null));
    }

    #[test]
    fn intermediate_rows_precede_their_leaves_and_carry_parent_keys() {
        let batches = normalize(
            &LOCATION,
            "loc-1",
            &doc(json!({
                "name": "Ravenhollow",
                "districts": [
                    {"name": "Market", "features": ["Stall Row", "Fountain"]},
                    {"name": "Docks"}
                ]
            })),
        )
        .unwrap();

        let tables: Vec<_> = batches.iter().map(|b| b.table).collect();
        let districts = tables.iter().position(|t| *t == "location_districts").unwrap();
        let features = tables.iter().position(|t| *t == "district_features").unwrap();
        assert!(districts < features);

        assert_eq!(batches[districts].rows.len(), 2);
        assert_eq!(
            batches[districts].rows[1],
            vec![json!("loc-1"), json!(1), json!("Docks"), Value::Null]
        );

        let market = &batches[features];
        assert_eq!(market.parent_key, vec![json!("loc-1"), json!("Market")]);
        assert_eq!(
            market.rows,
            vec![
                vec![json!("loc-1"), json!("Market"), json!(0), json!("Stall Row")],
                vec![json!("loc-1"), json!("Market"), json!(1), json!("Fountain")],
            ]
        );

        // Docks has no features but still gets a (empty) batch per leaf collection.
        let docks_batches = batches
            .iter()
            .filter(|b| b.parent_key.get(1) == Some(&json!("Docks")))
            .count();
        assert_eq!(docks_batches, LOCATION.leaves_of("districts").count());
    }

    #[test]
    fn integer_intermediate_keys_are_threaded_as_is() {
        let batches = normalize(
            &QUEST,
            "q-1",
            &doc(json!({
                "title": "The Drowned Bell",
                "stages": [{"stage": 2, "objectives": ["Find the bell"]}]
            })),
        )
        .unwrap();
        let objectives = batches
            .iter()
            .find(|b| b.table == "quest_objectives")
            .unwrap();
        assert_eq!(objectives.columns, vec!["quest_id", "stage", "position", "objective"]);
        assert_eq!(
            objectives.rows[0],
            vec![json!("q-1"), json!(2), json!(0), json!("Find the bell")]
        );
    }

    #[test]
    fn root_assignments_only_cover_present_fields() {
        let assignments = root_assignments(
            &LOCATION,
            &doc(json!({"region": "North", "danger_level": null, "districts": []})),
        );
        assert_eq!(
            assignments,
            vec![("region", json!("North")), ("danger_level", Value::Null)]
        );
    }

    #[test]
    fn converts_cells_for_the_store() {
        use rusqlite::types::Value as Sql;
        assert_eq!(to_sql(&json!("a")), Sql::Text("a".into()));
        assert_eq!(to_sql(&json!(3)), Sql::Integer(3));
        assert_eq!(to_sql(&Value::Null), Sql::Null);
    }
}
