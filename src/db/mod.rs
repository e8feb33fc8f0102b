mod error;
mod normalize;
mod reconstruct;
pub mod registry;
mod schema;
pub mod validate;

pub use error::{StoreError, StoreResult};
pub use normalize::{normalize, normalize_collection, RowBatch};
pub use reconstruct::reconstruct;
pub use registry::{EntitySchema, Registry, RegistryError};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{RetryPolicy, StoreConfig};
use crate::models::{Aggregate, EntityKind};

use registry::{Collection, ID_COLUMN};
use reconstruct::quote;
use validate::{Mode, Reference};

/// A nested aggregate as a JSON object, shaped by the schema registry.
pub type Document = serde_json::Map<String, Value>;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// One column of a live store table, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub default: Option<String>,
}

/// Handle to the campaign store.
///
/// Owns the one connection the process uses; clones share it. Every public
/// operation runs in its own transaction and either commits completely or
/// leaves the store as it was.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    registry: Arc<Registry>,
    retry: RetryPolicy,
}

impl Database {
    pub fn open_with(config: &StoreConfig) -> Result<Self> {
        Self::open_file(config.db_path.clone(), config.busy_timeout, config.retry)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn, DEFAULT_BUSY_TIMEOUT)?;
        Self::from_connection(conn, RetryPolicy::default())
    }

    fn open_file(path: PathBuf, busy_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        configure(&conn, busy_timeout)?;
        tracing::debug!(path = %path.display(), "opened store");
        Self::from_connection(conn, retry)
    }

    fn from_connection(conn: Connection, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            registry: Arc::new(Registry::standard()?),
            retry,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn schema(&self, kind: EntityKind) -> StoreResult<&'static EntitySchema> {
        self.registry
            .schema(kind)
            .ok_or_else(|| StoreError::validation(format!("{} is not a registered entity", kind)))
    }

    // ============================================================
    // Aggregate operations
    // ============================================================

    /// Store a new aggregate and return its id, assigning one when the payload
    /// has none.
    pub fn create_document(&self, kind: EntityKind, payload: &Value) -> StoreResult<String> {
        let schema = self.schema(kind)?;
        let doc = validate::as_document(payload)?;
        validate::validate(schema, doc, Mode::Create)?;

        let id = match validate::supplied_id(doc)? {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let batches = normalize(schema, &id, doc)?;
        let refs = validate::references(schema, doc);

        let rows = self.write("create", kind, |tx| {
            if row_exists(tx, schema.table, &id)? {
                return Err(StoreError::validation(format!(
                    "{} '{}' already exists",
                    kind, id
                )));
            }
            self.check_references(tx, kind, &id, &refs)?;
            insert_batches(tx, &batches)
        })?;

        tracing::debug!(%kind, %id, batches = batches.len(), rows, "created aggregate");
        Ok(id)
    }

    pub fn get_document(&self, kind: EntityKind, id: &str) -> StoreResult<Document> {
        let schema = self.schema(kind)?;
        self.read("get", kind, |tx| {
            reconstruct(tx, schema, id)?.ok_or_else(|| not_found(kind, id))
        })
    }

    /// Apply a partial update and return the aggregate as committed.
    ///
    /// Root fields in `patch` are overwritten. Each collection named in
    /// `patch` is replaced wholesale, leaves included; collections it does not
    /// name are left alone.
    pub fn update_document(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &Value,
    ) -> StoreResult<Document> {
        let schema = self.schema(kind)?;
        let doc = validate::as_document(patch)?;
        validate::validate(schema, doc, Mode::Patch)?;
        if let Some(given) = validate::supplied_id(doc)? {
            if given != id {
                return Err(StoreError::validation(format!(
                    "payload id '{}' does not match '{}'",
                    given, id
                )));
            }
        }

        let assignments = normalize::root_assignments(schema, doc);
        let mut replaced: Vec<(&Collection, Vec<RowBatch>)> = Vec::new();
        for collection in schema.top_level() {
            if let Some(Value::Array(items)) = doc.get(collection.field) {
                replaced.push((
                    collection,
                    normalize_collection(schema, id, collection, items)?,
                ));
            }
        }
        let refs = validate::references(schema, doc);

        let updated = self.write("update", kind, |tx| {
            if !row_exists(tx, schema.table, id)? {
                return Err(not_found(kind, id));
            }
            self.check_references(tx, kind, id, &refs)?;

            if !assignments.is_empty() {
                let sets = assignments
                    .iter()
                    .enumerate()
                    .map(|(i, (column, _))| format!("{} = ?{}", quote(column), i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?{}",
                    quote(schema.table),
                    sets,
                    quote(ID_COLUMN),
                    assignments.len() + 1
                );
                let params = assignments
                    .iter()
                    .map(|(_, value)| normalize::to_sql(value))
                    .chain(std::iter::once(rusqlite::types::Value::Text(id.to_string())));
                tx.execute(&sql, params_from_iter(params))?;
            }

            for (collection, batches) in &replaced {
                clear_collection(tx, schema, collection, id)?;
                insert_batches(tx, batches)?;
            }

            reconstruct(tx, schema, id)?.ok_or_else(|| not_found(kind, id))
        })?;

        tracing::debug!(
            %kind,
            %id,
            fields = assignments.len(),
            collections = replaced.len(),
            "updated aggregate"
        );
        Ok(updated)
    }

    /// Remove an aggregate and everything it owns. Weak references to it held
    /// by other aggregates are detached in the same transaction.
    pub fn delete_document(&self, kind: EntityKind, id: &str) -> StoreResult<()> {
        let schema = self.schema(kind)?;

        let detached = self.write("delete", kind, |tx| {
            if !row_exists(tx, schema.table, id)? {
                return Err(not_found(kind, id));
            }
            let detached = self.detach_references(tx, kind, id)?;

            for table in schema.owned_tables_leaves_first() {
                tx.execute(
                    &format!(
                        "DELETE FROM {} WHERE {} = ?1",
                        quote(table),
                        quote(schema.owner_column)
                    ),
                    [id],
                )?;
            }
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote(schema.table),
                    quote(ID_COLUMN)
                ),
                [id],
            )?;
            Ok(detached)
        })?;

        if detached > 0 {
            tracing::info!(%kind, %id, detached, "detached references to deleted aggregate");
        }
        tracing::debug!(%kind, %id, "deleted aggregate");
        Ok(())
    }

    pub fn exists(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let schema = self.schema(kind)?;
        self.read("exists", kind, |tx| row_exists(tx, schema.table, id))
    }

    /// Ids of every stored aggregate of `kind`, sorted.
    pub fn list_ids(&self, kind: EntityKind) -> StoreResult<Vec<String>> {
        let schema = self.schema(kind)?;
        self.read("list", kind, |tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {id} FROM {} ORDER BY {id}",
                quote(schema.table),
                id = quote(ID_COLUMN)
            ))?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    // ============================================================
    // Typed aggregates
    // ============================================================

    pub fn create<A: Aggregate>(&self, aggregate: &A) -> StoreResult<String> {
        let value = serde_json::to_value(aggregate)
            .map_err(|e| StoreError::validation(format!("cannot encode {}: {}", A::KIND, e)))?;
        self.create_document(A::KIND, &value)
    }

    pub fn get<A: Aggregate>(&self, id: &str) -> StoreResult<A> {
        let doc = self.get_document(A::KIND, id)?;
        decode(doc)
    }

    /// Overwrite every field and collection of an existing aggregate. The
    /// aggregate's own id may be unset, but if set it must be `id`.
    pub fn replace<A: Aggregate>(&self, id: &str, aggregate: &A) -> StoreResult<A> {
        if let Some(own) = aggregate.id().filter(|own| *own != id) {
            return Err(StoreError::validation(format!(
                "{} '{}' cannot replace '{}'",
                A::KIND,
                own,
                id
            )));
        }
        let mut value = serde_json::to_value(aggregate)
            .map_err(|e| StoreError::validation(format!("cannot encode {}: {}", A::KIND, e)))?;
        if let Value::Object(doc) = &mut value {
            doc.remove(ID_COLUMN);
        }
        let doc = self.update_document(A::KIND, id, &value)?;
        decode(doc)
    }

    pub fn delete<A: Aggregate>(&self, id: &str) -> StoreResult<()> {
        self.delete_document(A::KIND, id)
    }

    // ============================================================
    // Diagnostics
    // ============================================================

    pub fn list_tables(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tables)
    }

    /// Column definitions of a live table, or `None` if there is no such table.
    pub fn describe_table(&self, name: &str) -> StoreResult<Option<Vec<ColumnInfo>>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk
             FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map([name], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default: row.get(3)?,
                    primary_key: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((!columns.is_empty()).then_some(columns))
    }

    // ============================================================
    // Transactions
    // ============================================================

    fn write<T>(
        &self,
        op: &'static str,
        kind: EntityKind,
        f: impl Fn(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.run(op, kind, TransactionBehavior::Immediate, f)
    }

    fn read<T>(
        &self,
        op: &'static str,
        kind: EntityKind,
        f: impl Fn(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.run(op, kind, TransactionBehavior::Deferred, f)
    }

    /// Run `f` in a transaction, rerunning the whole thing while the store
    /// reports contention.
    fn run<T>(
        &self,
        op: &'static str,
        kind: EntityKind,
        behavior: TransactionBehavior,
        f: impl Fn(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut attempt = 1;
        loop {
            match self.attempt(behavior, &f) {
                Err(err) if err.is_busy() => {
                    if attempt >= self.retry.attempts {
                        tracing::warn!(op, %kind, attempts = attempt, "store still busy, giving up");
                        return Err(StoreError::ConcurrencyBusy { attempts: attempt });
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(op, %kind, attempt, ?delay, "store busy, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(StoreError::TransactionFailure(err)) => {
                    tracing::error!(op, %kind, error = %err, "transaction failed");
                    return Err(StoreError::TransactionFailure(err));
                }
                other => return other,
            }
        }
    }

    fn attempt<T>(
        &self,
        behavior: TransactionBehavior,
        f: &impl Fn(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction_with_behavior(behavior)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::error!(error = %rollback, "rollback failed");
                    return Err(StoreError::TransactionFailure(rollback));
                }
                tracing::debug!(error = %err, "rolled back");
                Err(err)
            }
        }
    }

    fn check_references(
        &self,
        tx: &Transaction<'_>,
        kind: EntityKind,
        id: &str,
        refs: &[Reference],
    ) -> StoreResult<()> {
        for reference in refs {
            if reference.target == kind && reference.id == id {
                continue;
            }
            let target = self.schema(reference.target)?;
            if !row_exists(tx, target.table, &reference.id)? {
                return Err(StoreError::ForeignKeyViolation {
                    field: reference.field.clone(),
                    target: reference.target,
                    id: reference.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Clear optional root references and drop link rows pointing at `id`.
    fn detach_references(
        &self,
        tx: &Transaction<'_>,
        kind: EntityKind,
        id: &str,
    ) -> StoreResult<usize> {
        let mut detached = 0;
        for reference in self.registry.references_to(kind) {
            let sql = if reference.on_root {
                format!(
                    "UPDATE {table} SET {col} = NULL WHERE {col} = ?1",
                    table = quote(reference.table),
                    col = quote(reference.column)
                )
            } else {
                format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote(reference.table),
                    quote(reference.column)
                )
            };
            detached += tx.execute(&sql, [id])?;
        }
        Ok(detached)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            registry: Arc::clone(&self.registry),
            retry: self.retry,
        }
    }
}

fn configure(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)
}

fn not_found(kind: EntityKind, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn row_exists(conn: &Connection, table: &str, id: &str) -> StoreResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
        quote(table),
        quote(ID_COLUMN)
    );
    Ok(conn.query_row(&sql, [id], |row| row.get(0))?)
}

/// Insert every batch in order; returns the number of rows written.
fn insert_batches(conn: &Connection, batches: &[RowBatch]) -> StoreResult<usize> {
    let mut written = 0;
    for batch in batches.iter().filter(|b| !b.rows.is_empty()) {
        let placeholders = (1..=batch.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let columns = batch
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(batch.table),
            columns,
            placeholders
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        for row in &batch.rows {
            written += stmt.execute(params_from_iter(row.iter().map(normalize::to_sql)))?;
        }
    }
    Ok(written)
}

/// Delete every row of one first-level collection, leaves first.
fn clear_collection(
    conn: &Connection,
    schema: &EntitySchema,
    collection: &Collection,
    id: &str,
) -> StoreResult<()> {
    let leaves = schema.leaves_of(collection.field).map(|leaf| leaf.table);
    for table in leaves.chain(std::iter::once(collection.table)) {
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote(table),
                quote(schema.owner_column)
            ),
            [id],
        )?;
    }
    Ok(())
}

/// Typed view of a stored document. Fails only for rows written outside the
/// store's API.
fn decode<A: Aggregate>(doc: Document) -> StoreResult<A> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        StoreError::validation(format!("stored {} does not fit its typed model: {}", A::KIND, e))
    })
}
