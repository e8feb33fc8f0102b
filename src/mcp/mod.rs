//! MCP server exposing campaign entities as tools.

mod types;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterError, ErrorCode};
use crate::db::{Database, Document};

#[derive(Clone)]
pub struct McpServer {
    adapter: Adapter,
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    pub fn new(db: Database) -> Self {
        Self {
            adapter: Adapter::new(db),
            tool_router: Self::tool_router(),
        }
    }

    /// Caller mistakes become invalid-params errors; store trouble becomes an
    /// internal error. Either way the stable code rides along as data.
    fn tool_error(err: AdapterError) -> McpError {
        let data = Some(json!({ "code": err.code }));
        match err.code {
            ErrorCode::TransactionFailure | ErrorCode::ConcurrencyBusy => {
                McpError::internal_error(err.message, data)
            }
            _ => McpError::invalid_params(err.message, data),
        }
    }

    fn json_result(value: &impl Serialize) -> Result<CallToolResult, McpError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    // ============================================================
    // Test helpers - expose tool logic for testing
    // ============================================================

    pub fn test_create_entity(&self, entity_type: &str, data: &Value) -> Result<Document, McpError> {
        self.adapter
            .create(entity_type, data)
            .map_err(Self::tool_error)
    }

    pub fn test_get_entity(&self, entity_type: &str, id: &str) -> Result<Document, McpError> {
        self.adapter.get(entity_type, id).map_err(Self::tool_error)
    }

    pub fn test_update_entity(
        &self,
        entity_type: &str,
        id: &str,
        updates: &Value,
    ) -> Result<Document, McpError> {
        self.adapter
            .update(entity_type, id, updates)
            .map_err(Self::tool_error)
    }

    pub fn test_delete_entity(
        &self,
        entity_type: &str,
        id: &str,
    ) -> Result<DeleteEntityResponse, McpError> {
        self.adapter
            .delete(entity_type, id)
            .map_err(Self::tool_error)?;
        Ok(DeleteEntityResponse {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            deleted: true,
        })
    }

    pub fn test_list_entities(&self, entity_type: &str) -> Result<EntityListResponse, McpError> {
        let entities = self.adapter.list(entity_type).map_err(Self::tool_error)?;
        Ok(EntityListResponse {
            entity_type: entity_type.to_string(),
            count: entities.len(),
            entities,
        })
    }

    pub fn test_list_tables(&self) -> Result<TableListResponse, McpError> {
        let tables = self.adapter.list_tables().map_err(Self::tool_error)?;
        Ok(TableListResponse { tables })
    }

    pub fn test_describe_table(&self, table: &str) -> Result<TableDescriptionResponse, McpError> {
        let columns = self
            .adapter
            .describe_table(table)
            .map_err(Self::tool_error)?;
        Ok(TableDescriptionResponse {
            table: table.trim().to_string(),
            columns,
        })
    }
}

#[tool_router]
impl McpServer {
    #[tool(
        description = "Create a location, faction, npc or quest from a full nested object. Returns the stored entity including its id. Weak references (faction_control, allies, npc ids, quest ids) must name entities that already exist."
    )]
    async fn create_entity(
        &self,
        params: Parameters<CreateEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let entity = self.test_create_entity(&req.entity_type, &req.data)?;
        Self::json_result(&entity)
    }

    #[tool(
        description = "Fetch one entity with every nested collection (districts with their features, areas with their treasures, stages with their objectives, ...)."
    )]
    async fn get_entity(
        &self,
        params: Parameters<GetEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let entity = self.test_get_entity(&req.entity_type, &req.id)?;
        Self::json_result(&entity)
    }

    #[tool(
        description = "Partially update an entity. Scalar fields given are overwritten. Any collection given replaces the stored one wholesale; to add one item, resend the whole list. Collections left out are not touched."
    )]
    async fn update_entity(
        &self,
        params: Parameters<UpdateEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let entity = self.test_update_entity(&req.entity_type, &req.id, &req.updates)?;
        Self::json_result(&entity)
    }

    #[tool(
        description = "Delete an entity and everything it owns. References to it from other entities are cleared. Fails with not_found if the id does not exist."
    )]
    async fn delete_entity(
        &self,
        params: Parameters<DeleteEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let response = self.test_delete_entity(&req.entity_type, &req.id)?;
        Self::json_result(&response)
    }

    #[tool(description = "List every stored entity of one type, ordered by id.")]
    async fn list_entities(
        &self,
        params: Parameters<ListEntitiesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let response = self.test_list_entities(&req.entity_type)?;
        Self::json_result(&response)
    }

    #[tool(description = "List the tables in the campaign store.")]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        let response = self.test_list_tables()?;
        Self::json_result(&response)
    }

    #[tool(description = "Show the column definitions of one table in the campaign store.")]
    async fn describe_table(
        &self,
        params: Parameters<DescribeTableRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let response = self.test_describe_table(&req.table_name)?;
        Self::json_result(&response)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "tome-keeper".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"Tome Keeper stores tabletop campaign content: locations, factions, NPCs and quests.

Each entity is one nested object:
- location: districts[] and areas[] each own their own features, npcs (and, for areas, encounters and treasures)
- faction: leadership[], members[], resources[], allies[]/enemies[] (faction ids), quests[] (quest ids)
- npc: description[], personality[], inventory[], quests[], relationships[], locations[]
- quest: stages[] (objectives, completion_paths), decision_points[] (choices), twists[], rewards[], follow_up_quests[]

WRITING:
- create_entity stores a whole object; ids are assigned when omitted
- update_entity replaces any collection you name and leaves the rest alone
- referenced ids (faction_control, allies, npc_id, quest_id, ...) must already exist, so create referenced entities first

ERRORS carry a code: invalid_request, validation_error, not_found, foreign_key_violation, transaction_failure, concurrency_busy."#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(db: Database) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(db);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
