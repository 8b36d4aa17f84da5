//! A2A task surface.
//!
//! `message/send` carries one data part `{ "skill": ..., "parameters": {...} }`.
//! The skill runs to completion within the request, so the returned task is
//! already `completed` or `failed`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use salesagent_agent::envelope::Part;
use salesagent_agent::{AgentRuntime, InboundCredentials, Skill, Task};

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::{McpError, McpResult};

pub const A2A_PROTOCOL_VERSION: &str = "0.3.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingMessage {
    #[serde(default)]
    context_id: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct MessageSendParams {
    message: IncomingMessage,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SkillInvocation {
    skill: String,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

impl IncomingMessage {
    fn invocation(self) -> McpResult<(SkillInvocation, Option<String>)> {
        let data = self
            .parts
            .into_iter()
            .find_map(|part| match part {
                Part::Data { data } => Some(data),
                Part::Text { .. } => None,
            })
            .ok_or_else(|| {
                McpError::InvalidParams("message needs a data part naming a `skill`".to_string())
            })?;
        let invocation = serde_json::from_value(data)
            .map_err(|error| McpError::InvalidParams(format!("invalid skill invocation: {error}")))?;
        Ok((invocation, self.context_id))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub protocol_version: String,
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub preferred_transport: String,
    pub capabilities: Value,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub security_schemes: Value,
    pub security: Vec<Value>,
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    /// Card for an agent whose A2A endpoint is `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            protocol_version: A2A_PROTOCOL_VERSION.to_string(),
            name: "Sales Agent".to_string(),
            description: "Sells publisher inventory to buyer agents: products, media buys, \
                          creatives and delivery reporting."
                .to_string(),
            url: url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            preferred_transport: "JSONRPC".to_string(),
            capabilities: json!({ "streaming": false, "pushNotifications": false }),
            default_input_modes: vec!["application/json".to_string()],
            default_output_modes: vec!["application/json".to_string()],
            security_schemes: json!({
                "bearer": { "type": "http", "scheme": "bearer" }
            }),
            security: vec![json!({ "bearer": [] })],
            skills: Skill::ALL
                .into_iter()
                .map(|skill| AgentSkill {
                    id: skill.name().to_string(),
                    name: skill.name().to_string(),
                    description: skill.description().to_string(),
                    tags: vec![if skill.requires_reviewer() { "reviewer" } else { "buyer" }.to_string()],
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct A2aServer {
    runtime: Arc<AgentRuntime>,
}

impl A2aServer {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    /// Handle one decoded request body. Returns `None` for notifications.
    pub async fn handle(&self, inbound: &InboundCredentials, body: Value) -> Option<JsonRpcResponse> {
        let request = match JsonRpcRequest::parse(body) {
            Ok(request) => request,
            Err(error) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::from_error(&error, &inbound.correlation_id),
                ))
            }
        };
        if request.is_notification() {
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let result = match request.method.as_str() {
            "message/send" => self.send_message(inbound, request.params).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        };
        Some(match result {
            Ok(task) => JsonRpcResponse::success(id, task),
            Err(error) => {
                warn!(
                    event_name = "a2a.request_rejected",
                    correlation_id = %inbound.correlation_id,
                    error_code = error.code_name(),
                    error = %error,
                    "a2a request rejected"
                );
                JsonRpcResponse::failure(id, JsonRpcError::from_error(&error, &inbound.correlation_id))
            }
        })
    }

    async fn send_message(&self, inbound: &InboundCredentials, params: Value) -> McpResult<Value> {
        let params: MessageSendParams =
            serde_json::from_value(params).map_err(|error| McpError::InvalidParams(error.to_string()))?;
        let (invocation, context_id) = params.message.invocation()?;
        let parameters = invocation.parameters.map(Value::Object).unwrap_or_else(|| json!({}));

        let outcome = self.runtime.handle(inbound, &invocation.skill, parameters).await?;
        let task = Task::from_outcome(&outcome, context_id);
        serde_json::to_value(&task).map_err(|error| McpError::Internal(error.to_string()))
    }
}
