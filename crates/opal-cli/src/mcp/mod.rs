//! MCP (Model Context Protocol) server for AI assistant integration.
//!
//! Implements a JSON-RPC server over stdin/stdout that exposes the
//! OpenProject operations as tools.

mod protocol;
mod tools;

use anyhow::{Context, Result};
use opal_client::{OpenProjectClient, Settings};
use protocol::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolsCapability, ToolsListResult,
};
use serde_json::json;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, error, info};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "opal";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the MCP server, reading from stdin and writing to stdout.
///
/// One client instance is created up front and shared across all tool
/// calls, so the connection pool and the reference-data cache live for
/// the whole session.
pub async fn serve(settings: &Settings) -> Result<()> {
    info!(base_url = %settings.base_url, "starting MCP server");

    let client = OpenProjectClient::new(settings).context("Failed to initialize API client")?;

    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        if line.trim().is_empty() {
            continue;
        }

        debug!("Received: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let response = JsonRpcResponse::error(None, -32700, format!("Parse error: {e}"));
                write_response(&mut stdout, &response).await?;
                continue;
            }
        };

        if let Some(response) = handle_request(&client, &request).await {
            write_response(&mut stdout, &response).await?;
        }
    }

    client.close();
    Ok(())
}

async fn write_response(stdout: &mut Stdout, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    debug!("Sending: {}", json);
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn handle_request(
    client: &OpenProjectClient,
    request: &JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    match request.method.as_str() {
        "initialize" => Some(handle_initialize(request)),
        "initialized" => {
            // Notification - no response expected
            debug!("Received initialized notification");
            None
        }
        "tools/list" => Some(handle_tools_list(request)),
        "tools/call" => Some(handle_tools_call(client, request).await),
        "ping" => Some(JsonRpcResponse::success(request.id.clone(), json!({}))),
        method if method.starts_with("notifications/") => {
            // All notifications - no response expected
            debug!("Received notification: {}", method);
            None
        }
        _ => {
            error!("Unknown method: {}", request.method);
            Some(JsonRpcResponse::error(
                request.id.clone(),
                -32601,
                format!("Method not found: {}", request.method),
            ))
        }
    }
}

fn handle_initialize(request: &JsonRpcRequest) -> JsonRpcResponse {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
        },
    };

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(request.id.clone(), value),
        Err(e) => JsonRpcResponse::error(request.id.clone(), -32603, e.to_string()),
    }
}

fn handle_tools_list(request: &JsonRpcRequest) -> JsonRpcResponse {
    let tools = tools::get_tool_definitions();
    let result = ToolsListResult { tools };
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(request.id.clone(), value),
        Err(e) => JsonRpcResponse::error(request.id.clone(), -32603, e.to_string()),
    }
}

async fn handle_tools_call(client: &OpenProjectClient, request: &JsonRpcRequest) -> JsonRpcResponse {
    let params: ToolCallParams = match &request.params {
        Some(params) => match serde_json::from_value(params.clone()) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(
                    request.id.clone(),
                    -32602,
                    format!("Invalid params: {e}"),
                )
            }
        },
        None => return JsonRpcResponse::error(request.id.clone(), -32602, "Missing params"),
    };

    info!("Tool call: {} with args: {:?}", params.name, params.arguments);

    let result = tools::handle_tool_call(client, &params.name, params.arguments).await;

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(request.id.clone(), value),
        Err(e) => JsonRpcResponse::error(request.id.clone(), -32603, e.to_string()),
    }
}
