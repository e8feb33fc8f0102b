//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{ColumnInfo, Document};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateEntityRequest {
    #[schemars(description = "One of: location, faction, npc, quest")]
    pub entity_type: String,
    #[schemars(
        description = "The full nested aggregate. Omit 'id' to have one assigned. Child collections (districts, areas, leadership, stages, ...) are nested arrays."
    )]
    pub data: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetEntityRequest {
    #[schemars(description = "One of: location, faction, npc, quest")]
    pub entity_type: String,
    #[schemars(description = "Id of the entity to fetch")]
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateEntityRequest {
    #[schemars(description = "One of: location, faction, npc, quest")]
    pub entity_type: String,
    #[schemars(description = "Id of the entity to update")]
    pub id: String,
    #[schemars(
        description = "Fields to change. Scalar fields are overwritten. A collection named here replaces the stored collection entirely (an empty array clears it); collections not named are kept."
    )]
    pub updates: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteEntityRequest {
    #[schemars(description = "One of: location, faction, npc, quest")]
    pub entity_type: String,
    #[schemars(description = "Id of the entity to delete")]
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListEntitiesRequest {
    #[schemars(description = "One of: location, faction, npc, quest")]
    pub entity_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeTableRequest {
    #[schemars(description = "Name of the table, as returned by list_tables")]
    pub table_name: String,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize)]
pub struct DeleteEntityResponse {
    pub entity_type: String,
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct EntityListResponse {
    pub entity_type: String,
    pub count: usize,
    pub entities: Vec<Document>,
}

#[derive(Debug, Serialize)]
pub struct TableListResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TableDescriptionResponse {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}
