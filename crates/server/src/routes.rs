//! HTTP ingress.
//!
//! `/mcp` is the `rmcp` streamable-HTTP service; `/a2a` lifts the headers
//! into [`InboundCredentials`](salesagent_agent::InboundCredentials) and hands
//! the decoded JSON-RPC body to the A2A handler. Every request carries a
//! correlation id in `x-correlation-id`, echoed on the response.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use uuid::Uuid;

use salesagent_mcp::credentials::{header_value, inbound_credentials, CORRELATION_HEADER};
use salesagent_mcp::{A2aServer, AgentCard, JsonRpcError, JsonRpcResponse, McpError, McpServer};

#[derive(Clone)]
pub struct IngressState {
    pub a2a: A2aServer,
    /// Lowercased name of the header that may carry the tenant id.
    pub tenant_header: String,
}

pub fn router(state: IngressState, mcp: McpServer) -> Router {
    Router::new()
        .route("/a2a", post(a2a))
        .route("/.well-known/agent.json", get(agent_card))
        .with_state(state)
        .nest_service("/mcp", mcp.into_service())
        .layer(middleware::from_fn(correlate))
}

/// Takes the caller's correlation id or generates one, stores it on the
/// request for the handlers below and echoes it on the response.
async fn correlate(mut request: Request, next: Next) -> Response {
    let correlation_id = header_value(request.headers(), CORRELATION_HEADER)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let value = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = &value {
        request.headers_mut().insert(HeaderName::from_static(CORRELATION_HEADER), value.clone());
    }

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    response
}

async fn a2a(State(state): State<IngressState>, headers: HeaderMap, body: Bytes) -> Response {
    let inbound = inbound_credentials(&headers, &state.tenant_header);
    let response = match decode(&body) {
        Ok(body) => state.a2a.handle(&inbound, body).await,
        Err(error) => Some(parse_failure(&error, &inbound.correlation_id)),
    };
    respond(response)
}

async fn agent_card(headers: HeaderMap) -> Json<AgentCard> {
    let host = header_value(&headers, header::HOST.as_str()).unwrap_or_else(|| "localhost".to_string());
    Json(AgentCard::new(format!("https://{host}/a2a")))
}

fn decode(body: &[u8]) -> Result<Value, McpError> {
    serde_json::from_slice(body).map_err(|error| McpError::Parse(error.to_string()))
}

fn parse_failure(error: &McpError, correlation_id: &str) -> JsonRpcResponse {
    JsonRpcResponse::failure(Value::Null, JsonRpcError::from_error(error, correlation_id))
}

/// Notifications get `202 Accepted` with no body.
fn respond(response: Option<JsonRpcResponse>) -> Response {
    match response {
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
