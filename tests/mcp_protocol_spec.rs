//! MCP protocol integration tests.
//!
//! These tests spawn the actual `tome mcp` process and communicate via
//! JSON-RPC over stdio, testing the complete MCP protocol flow.
//!
//! The rmcp library uses line-delimited JSON (each message is one line):
//! ```
//! {"jsonrpc":"2.0","id":1,"method":"initialize",...}\n
//! {"jsonrpc":"2.0","id":1,"result":{...}}\n
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// MCP test client that spawns and communicates with the server
struct McpTestClient {
    child: Child,
    request_id: u64,
    reader: BufReader<std::process::ChildStdout>,
}

impl McpTestClient {
    /// Spawn a new MCP server process with an isolated test database
    fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut child = Command::new(env!("CARGO_BIN_EXE_tome"))
            .arg("mcp")
            .env("TOME_DB_PATH", temp_dir.path().join("tome.db"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn tome mcp");

        let stdout = child.stdout.take().expect("Failed to get stdout");
        let reader = BufReader::new(stdout);

        // Keep temp_dir alive by leaking it (tests are short-lived anyway)
        std::mem::forget(temp_dir);

        Self {
            child,
            request_id: 0,
            reader,
        }
    }

    /// Send a message as line-delimited JSON
    fn send_message(&mut self, content: &str) {
        let stdin = self.child.stdin.as_mut().expect("Failed to get stdin");
        writeln!(stdin, "{}", content).expect("Failed to write message");
        stdin.flush().expect("Failed to flush stdin");
    }

    /// Read a message as line-delimited JSON
    fn read_message(&mut self) -> String {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .expect("Failed to read line");
        line.trim().to_string()
    }

    /// Send a JSON-RPC request and get the response
    fn request(&mut self, method: &str, params: Option<Value>) -> JsonRpcResponse {
        self.request_id += 1;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id,
            method: method.to_string(),
            params,
        };

        let request_json = serde_json::to_string(&request).expect("Failed to serialize request");
        self.send_message(&request_json);

        let response_json = self.read_message();
        serde_json::from_str(&response_json).expect("Failed to parse response")
    }

    /// Send initialize request and initialized notification (required first messages)
    fn initialize(&mut self) -> JsonRpcResponse {
        let response = self.request(
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "test-client",
                    "version": "1.0.0"
                }
            })),
        );

        // Send initialized notification (required by MCP protocol)
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        });
        self.send_message(&notification.to_string());

        response
    }

    /// List available tools
    fn list_tools(&mut self) -> JsonRpcResponse {
        self.request("tools/list", None)
    }

    /// Call a tool with parameters
    fn call_tool(&mut self, name: &str, arguments: Value) -> JsonRpcResponse {
        self.request(
            "tools/call",
            Some(json!({
                "name": name,
                "arguments": arguments
            })),
        )
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ============================================================
// Protocol Tests
// ============================================================

mod protocol {
    use super::*;

    #[test]
    fn initialize_returns_server_info() {
        let mut client = McpTestClient::spawn();
        let response = client.initialize();

        assert!(response.error.is_none(), "Expected success, got error");
        let result = response.result.expect("Expected result");

        assert!(result.get("serverInfo").is_some());
        assert!(result.get("capabilities").is_some());
    }

    #[test]
    fn tools_list_returns_all_tools() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.list_tools();
        assert!(response.error.is_none(), "Expected success, got error");

        let result = response.result.expect("Expected result");
        let tools = result.get("tools").expect("Expected tools array");
        let tools_array = tools.as_array().expect("Tools should be array");

        let mut tool_names: Vec<&str> = tools_array
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .collect();
        tool_names.sort();

        assert_eq!(
            tool_names,
            vec![
                "create_entity",
                "delete_entity",
                "describe_table",
                "get_entity",
                "list_entities",
                "list_tables",
                "update_entity",
            ]
        );
    }

    #[test]
    fn tools_have_descriptions_and_schemas() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.list_tools();
        let result = response.result.expect("Expected result");
        let tools = result["tools"].as_array().expect("Tools should be array");

        for tool in tools {
            let name = tool["name"].as_str().unwrap_or("<unnamed>");
            assert!(
                tool.get("description").and_then(|d| d.as_str()).is_some(),
                "Tool {} has no description",
                name
            );
            assert!(tool.get("inputSchema").is_some(), "Tool {} has no schema", name);
        }
    }

    #[test]
    fn create_then_get_location() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.call_tool(
            "create_entity",
            json!({
                "entity_type": "location",
                "data": {
                    "name": "Ravenhollow",
                    "districts": [{"name": "Market District", "features": ["Stall Row"]}],
                    "areas": [{"name": "Old Well", "features": ["Cracked stone"]}]
                }
            }),
        );
        assert!(response.error.is_none(), "Expected success, got {:?}", response.error);
        let created: Value =
            serde_json::from_str(&extract_text_content(&response)).expect("Expected JSON");
        let id = created["id"].as_str().expect("Expected id").to_string();

        let response = client.call_tool("get_entity", json!({ "entity_type": "location", "id": id }));
        let fetched: Value =
            serde_json::from_str(&extract_text_content(&response)).expect("Expected JSON");

        assert_eq!(fetched["districts"][0]["features"], json!(["Stall Row"]));
        assert_eq!(fetched["areas"][0]["features"], json!(["Cracked stone"]));
    }

    #[test]
    fn update_and_delete_round_trip() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        client.call_tool(
            "create_entity",
            json!({ "entity_type": "npc", "data": { "id": "mirela", "name": "Mirela" } }),
        );

        let response = client.call_tool(
            "update_entity",
            json!({ "entity_type": "npc", "id": "mirela", "updates": { "inventory": ["lantern"] } }),
        );
        let updated: Value =
            serde_json::from_str(&extract_text_content(&response)).expect("Expected JSON");
        assert_eq!(updated["inventory"], json!(["lantern"]));

        let response = client.call_tool("delete_entity", json!({ "entity_type": "npc", "id": "mirela" }));
        assert!(response.error.is_none(), "Expected success, got {:?}", response.error);

        let response = client.call_tool("get_entity", json!({ "entity_type": "npc", "id": "mirela" }));
        assert!(response.error.is_some(), "Expected not found after delete");
    }

    /// Helper to extract text content from MCP tool response
    fn extract_text_content(response: &JsonRpcResponse) -> String {
        response
            .result
            .as_ref()
            .and_then(|r| r.get("content"))
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .expect("Expected text content in response")
            .to_string()
    }
}

// ============================================================
// Error Handling Tests
// ============================================================

mod errors {
    use super::*;

    fn is_error(response: &JsonRpcResponse) -> bool {
        response.error.is_some()
            || response
                .result
                .as_ref()
                .and_then(|r| r.get("isError"))
                .and_then(|e| e.as_bool())
                .unwrap_or(false)
    }

    #[test]
    fn invalid_tool_name_returns_error() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.call_tool("nonexistent_tool", json!({}));

        assert!(response.error.is_some(), "Expected error for invalid tool");
    }

    #[test]
    fn unknown_entity_type_returns_error() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.call_tool("get_entity", json!({ "entity_type": "dragon", "id": "x" }));

        assert!(is_error(&response));
    }

    #[test]
    fn error_data_carries_a_stable_code() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.call_tool("get_entity", json!({ "entity_type": "quest", "id": "missing" }));

        let error = response.error.expect("Expected error");
        assert_eq!(error.data, Some(json!({ "code": "not_found" })));
    }

    #[test]
    fn missing_required_param_returns_error() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        // create_entity requires 'data'
        let response = client.call_tool("create_entity", json!({ "entity_type": "npc" }));

        assert!(is_error(&response));
    }
}
