//! MCP Server Core
//!
//! Routes JSON-RPC requests to the tool handlers. Owns the shared `Store`
//! and the semantic index used by the delete-cascade and duplicate-check
//! tools.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use memory_core::search::SemanticEngine;
use memory_core::storage::Store;

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;

/// MCP Server implementation.
pub struct McpServer {
    store: Arc<Store>,
    semantic: Arc<Mutex<SemanticEngine>>,
    initialized: bool,
}

impl McpServer {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            semantic: Arc::new(Mutex::new(SemanticEngine::new())),
            initialized: false,
        }
    }

    /// Handle an incoming JSON-RPC request.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => InitializeRequest::default(),
        };

        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo {
                name: "memory-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = std::collections::HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "A persistent memory store partitioned by tier (core/longterm) and scope \
                 (global/project). Use 'memory' to store, search, delete, check for duplicates, \
                 migrate, or inspect stats/analytics. Use 'analyzer' to record access events and \
                 request behavioural insights for a memory. Use 'lifecycle' to run the \
                 promote/demote/archive optimization pass."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: vec![
                ToolDescription {
                    name: "memory".to_string(),
                    description: Some(
                        "Unified memory store tool. Actions: 'store', 'search', 'delete', \
                         'check_duplicate', 'migrate', 'stats', 'analytics'."
                            .to_string(),
                    ),
                    input_schema: tools::memory::schema(),
                },
                ToolDescription {
                    name: "analyzer".to_string(),
                    description: Some(
                        "Behavioural analyzer tool. Actions: 'start_session', 'record_access', \
                         'analyze'."
                            .to_string(),
                    ),
                    input_schema: tools::analyzer::schema(),
                },
                ToolDescription {
                    name: "lifecycle".to_string(),
                    description: Some(
                        "Lifecycle manager tool. Runs the promote/demote/archive optimization \
                         pass over memories with a recorded behavioural pattern."
                            .to_string(),
                    ),
                    input_schema: tools::lifecycle::schema(),
                },
            ],
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?
            }
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result = match request.name.as_str() {
            "memory" => tools::memory::execute(&self.store, &self.semantic, request.arguments).await,
            "analyzer" => tools::analyzer::execute(&self.store, request.arguments).await,
            "lifecycle" => tools::lifecycle::execute(&self.store, request.arguments).await,
            other => {
                return Err(JsonRpcError::method_not_found_with_message(&format!(
                    "Unknown tool: {other}"
                )))
            }
        };

        let call_result = match result {
            Ok(value) => CallToolResult::ok(value),
            Err(message) => CallToolResult::error(message),
        };
        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::JSONRPC_VERSION;

    fn test_server() -> (McpServer, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&memory_core::config::Config::new(dir.path().join("test.db"))).unwrap();
        (McpServer::new(Arc::new(store)), dir)
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let (mut server, _dir) = test_server();
        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(serde_json::json!(1)),
            method: "tools/list".to_string(),
            params: None,
        };
        let response = server.handle_request(request).await.unwrap();
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn initialize_then_tools_list_succeeds() {
        let (mut server, _dir) = test_server();
        let init = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(serde_json::json!(1)),
            method: "initialize".to_string(),
            params: None,
        };
        let response = server.handle_request(init).await.unwrap();
        assert!(response.result.is_some());

        let list = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(serde_json::json!(2)),
            method: "tools/list".to_string(),
            params: None,
        };
        let response = server.handle_request(list).await.unwrap();
        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
    }
}
