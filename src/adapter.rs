//! Caller-facing boundary over the store.
//!
//! Transports (the MCP server, the HTTP API, the import command) speak to the
//! store only through [`Adapter`]. It checks request shape, dispatches on the
//! entity type, and turns store errors into an [`AdapterError`] carrying a
//! stable code and a message that never includes store-internal text.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db::{ColumnInfo, Database, Document, StoreError};
use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationError,
    NotFound,
    ForeignKeyViolation,
    TransactionFailure,
    ConcurrencyBusy,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::ValidationError => "validation_error",
            Self::NotFound => "not_found",
            Self::ForeignKeyViolation => "foreign_key_violation",
            Self::TransactionFailure => "transaction_failure",
            Self::ConcurrencyBusy => "concurrency_busy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub code: ErrorCode,
    pub message: String,
}

impl AdapterError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }
}

impl From<StoreError> for AdapterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => {
                Self::new(ErrorCode::ValidationError, format!("Invalid payload: {}", msg))
            }
            StoreError::NotFound { kind, id } => {
                Self::new(ErrorCode::NotFound, format!("No {} with id '{}'", kind, id))
            }
            StoreError::ForeignKeyViolation { field, target, id } => Self::new(
                ErrorCode::ForeignKeyViolation,
                format!("'{}' refers to {} '{}', which does not exist", field, target, id),
            ),
            StoreError::TransactionFailure(_) => Self::new(
                ErrorCode::TransactionFailure,
                "The store could not complete the operation; no changes were made",
            ),
            StoreError::ConcurrencyBusy { .. } => Self::new(
                ErrorCode::ConcurrencyBusy,
                "The store is busy; try again shortly",
            ),
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Clone)]
pub struct Adapter {
    db: Database,
}

impl Adapter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an aggregate and return it as stored, id included.
    pub fn create(&self, entity_type: &str, payload: &Value) -> AdapterResult<Document> {
        let kind = entity_kind(entity_type)?;
        require_object(payload)?;
        let id = self.db.create_document(kind, payload)?;
        Ok(self.db.get_document(kind, &id)?)
    }

    pub fn get(&self, entity_type: &str, id: &str) -> AdapterResult<Document> {
        let kind = entity_kind(entity_type)?;
        let id = require_id(id)?;
        Ok(self.db.get_document(kind, id)?)
    }

    pub fn update(&self, entity_type: &str, id: &str, patch: &Value) -> AdapterResult<Document> {
        let kind = entity_kind(entity_type)?;
        let id = require_id(id)?;
        if require_object(patch)?.is_empty() {
            return Err(AdapterError::invalid_request("No fields to update"));
        }
        Ok(self.db.update_document(kind, id, patch)?)
    }

    pub fn delete(&self, entity_type: &str, id: &str) -> AdapterResult<()> {
        let kind = entity_kind(entity_type)?;
        let id = require_id(id)?;
        Ok(self.db.delete_document(kind, id)?)
    }

    /// Every aggregate of one type, ordered by id.
    pub fn list(&self, entity_type: &str) -> AdapterResult<Vec<Document>> {
        let kind = entity_kind(entity_type)?;
        let mut docs = Vec::new();
        for id in self.db.list_ids(kind)? {
            match self.db.get_document(kind, &id) {
                Ok(doc) => docs.push(doc),
                // Deleted between listing and loading
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(docs)
    }

    pub fn list_tables(&self) -> AdapterResult<Vec<String>> {
        Ok(self.db.list_tables()?)
    }

    pub fn describe_table(&self, name: &str) -> AdapterResult<Vec<ColumnInfo>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdapterError::invalid_request("Table name is required"));
        }
        self.db.describe_table(name)?.ok_or_else(|| {
            AdapterError::new(ErrorCode::NotFound, format!("No table named '{}'", name))
        })
    }
}

fn entity_kind(entity_type: &str) -> AdapterResult<EntityKind> {
    entity_type.parse().map_err(AdapterError::invalid_request)
}

fn require_id(id: &str) -> AdapterResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AdapterError::invalid_request("An id is required"));
    }
    Ok(id)
}

fn require_object(payload: &Value) -> AdapterResult<&Document> {
    payload
        .as_object()
        .ok_or_else(|| AdapterError::invalid_request("Payload must be a JSON object"))
}
