//! JSON-RPC 2.0 service shared by the STDIO and HTTP transports.
//!
//! The protocol surface is MCP-shaped: `initialize`/`ping` handshake,
//! `tools/list` + `tools/call`, `resources/list` + `resources/read`.
//! Requests without an id are notifications and get no response.

use crate::dispatch::Dispatcher;
use crate::exec::Remote;
use crate::ssh::client::RusshConnector;
use crate::ssh::pool::Connect;
use crate::utils::error::ScoutError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub mod http;
pub mod stdio;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error codes: the standard set plus the resource-not-found code
/// used by MCP resource reads.
const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const RESOURCE_NOT_FOUND: i64 = -32002;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn parse(err: serde_json::Error) -> Self {
        Self {
            code: PARSE_ERROR,
            message: format!("Parse error: {}", err),
        }
    }

    fn invalid_params(err: serde_json::Error) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: format!("Invalid params: {}", err),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
        }
    }

    fn from_scout(err: ScoutError) -> Self {
        let code = match err {
            ScoutError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// The method table over one dispatcher. Cheap to clone; both transports
/// share the same instance.
pub struct RpcService<C: Connect = RusshConnector>
where
    C::Session: Remote,
{
    dispatcher: Arc<Dispatcher<C>>,
}

impl<C: Connect> Clone for RpcService<C>
where
    C::Session: Remote,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<C: Connect> RpcService<C>
where
    C::Session: Remote,
{
    pub fn new(dispatcher: Arc<Dispatcher<C>>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Handle one raw request line; `None` means nothing should be written
    /// back (a notification).
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle(request).await?,
            Err(e) => JsonRpcResponse::error(Value::Null, RpcError::parse(e)),
        };
        serde_json::to_string(&response).ok()
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let result = self.dispatch_method(&request.method, request.params).await;
        let id = request.id?;
        Some(match result {
            Ok(value) => JsonRpcResponse::result(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    async fn dispatch_method(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "scoutd",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {
                    "tools": {},
                    "resources": {},
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list()),
            "tools/call" => {
                #[derive(Deserialize)]
                struct CallParams {
                    name: String,
                    #[serde(default)]
                    arguments: Value,
                }
                let call: CallParams =
                    serde_json::from_value(params).map_err(RpcError::invalid_params)?;
                let arguments = if call.arguments.is_null() {
                    json!({})
                } else {
                    call.arguments
                };
                let output = self.dispatcher.call_tool(&call.name, arguments).await;
                Ok(json!({
                    "content": [{"type": "text", "text": output.text}],
                    "isError": output.is_error,
                }))
            }
            "resources/list" => Ok(self.resources_list()),
            "resources/read" => {
                #[derive(Deserialize)]
                struct ReadParams {
                    uri: String,
                }
                let read: ReadParams =
                    serde_json::from_value(params).map_err(RpcError::invalid_params)?;
                let content = self
                    .dispatcher
                    .read_resource(&read.uri)
                    .await
                    .map_err(RpcError::from_scout)?;
                Ok(json!({
                    "contents": [{
                        "uri": content.uri,
                        "mimeType": content.mime_type,
                        "text": content.text,
                    }],
                }))
            }
            "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn tools_list(&self) -> Value {
        json!({
            "tools": [{
                "name": "scout",
                "description": "Inspect files, directories, and service state on configured SSH hosts. \
                                Target 'hosts' lists the fleet with reachability; 'host:/path' reads a \
                                file or lists a directory; add a query to run a shell command there.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "description": "'hosts' or 'host:/path'",
                        },
                        "query": {
                            "type": "string",
                            "description": "Optional shell command to run with the path as working directory",
                        },
                        "tree": {
                            "type": "boolean",
                            "description": "Render directories as a depth-limited tree instead of a listing",
                        },
                    },
                    "required": ["target"],
                },
            }],
        })
    }

    fn resources_list(&self) -> Value {
        let mut resources = vec![json!({
            "uri": "hosts://list",
            "name": "Configured hosts",
            "mimeType": "text/plain",
        })];
        for host in self.dispatcher.hosts().iter() {
            for (suffix, label) in [
                ("docker", "containers"),
                ("compose", "compose projects"),
                ("zfs", "ZFS pools"),
                ("syslog", "system log"),
            ] {
                resources.push(json!({
                    "uri": format!("{}://{}", host.name, suffix),
                    "name": format!("{} {}", host.name, label),
                    "mimeType": "text/plain",
                }));
            }
        }
        json!({ "resources": resources })
    }
}
