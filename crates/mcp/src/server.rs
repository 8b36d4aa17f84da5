//! MCP tool surface, one `rmcp` tool per skill.
//!
//! Tools take their arguments as a raw JSON object so the dispatcher decodes
//! them after authentication. The caller's headers reach the tools through
//! the `http::request::Parts` that the streamable-HTTP transport stores in
//! the request extensions.

use std::collections::HashMap;
use std::sync::Arc;

use http::request::Parts;
use http::HeaderMap;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, ErrorData, Implementation, JsonObject,
    ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{tool, tool_router, RoleServer, ServerHandler};
use serde_json::Value;
use tracing::{debug, warn};

use salesagent_agent::envelope::encode;
use salesagent_agent::{AgentRuntime, AuthError, DispatchOutcome, InboundCredentials, Skill};

use crate::credentials::inbound_credentials;
use crate::jsonrpc::JsonRpcError;
use crate::McpError;

const SERVER_NAME: &str = "salesagent-mcp";

#[derive(Clone)]
pub struct McpServer {
    runtime: Arc<AgentRuntime>,
    /// Lowercased name of the header that may carry the tenant id.
    tenant_header: String,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl McpServer {
    pub fn new(runtime: Arc<AgentRuntime>, tenant_header: impl Into<String>) -> Self {
        Self {
            runtime,
            tenant_header: tenant_header.into().to_ascii_lowercase(),
            tool_router: Self::tool_router(),
        }
    }

    /// Search the tenant's products.
    #[tool]
    async fn get_products(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::GetProducts.name(), arguments).await
    }

    /// List creative formats.
    #[tool]
    async fn list_creative_formats(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::ListCreativeFormats.name(), arguments).await
    }

    /// Create a media buy.
    #[tool]
    async fn create_media_buy(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::CreateMediaBuy.name(), arguments).await
    }

    /// Pause, resume, cancel or re-budget a media buy.
    #[tool]
    async fn update_media_buy(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::UpdateMediaBuy.name(), arguments).await
    }

    /// Read one media buy.
    #[tool]
    async fn get_media_buy(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::GetMediaBuy.name(), arguments).await
    }

    /// Live delivery of one media buy.
    #[tool]
    async fn get_media_buy_delivery(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::GetMediaBuyDelivery.name(), arguments).await
    }

    /// Upload creatives.
    #[tool]
    async fn sync_creatives(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::SyncCreatives.name(), arguments).await
    }

    /// List the caller's creatives.
    #[tool]
    async fn list_creatives(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::ListCreatives.name(), arguments).await
    }

    /// Approve or reject a creative.
    #[tool]
    async fn review_creative(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::ReviewCreative.name(), arguments).await
    }

    /// Creatives waiting for review.
    #[tool]
    async fn list_review_tasks(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::ListReviewTasks.name(), arguments).await
    }

    /// Workflow trail of a media buy.
    #[tool]
    async fn list_workflow_steps(
        &self,
        Parameters(arguments): Parameters<JsonObject>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&self.inbound(&context), Skill::ListWorkflowSteps.name(), arguments).await
    }
}

impl McpServer {
    /// Runs one skill for a caller whose headers are already lifted.
    /// Rejected callers get a JSON-RPC error; skill failures come back as a
    /// tool result with `isError` set.
    pub async fn call(
        &self,
        inbound: &InboundCredentials,
        skill: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(
            event_name = "mcp.tool_called",
            correlation_id = %inbound.correlation_id,
            tool = skill,
            "tool called"
        );
        let outcome = self
            .runtime
            .handle(inbound, skill, Value::Object(arguments))
            .await
            .map_err(|error| rejection(error, &inbound.correlation_id))?;
        tool_result(&outcome)
    }

    /// Tool listing in registry order, described by the skill registry.
    pub fn tools(&self) -> Vec<Tool> {
        let mut routed: HashMap<String, Tool> = self
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| (tool.name.to_string(), tool))
            .collect();
        Skill::ALL
            .into_iter()
            .filter_map(|skill| {
                let mut tool = routed.remove(skill.name())?;
                tool.description = Some(skill.description().into());
                if let Value::Object(schema) = skill.input_schema() {
                    tool.input_schema = Arc::new(schema);
                }
                Some(tool)
            })
            .collect()
    }

    /// Stateless streamable-HTTP service to mount under `/mcp`.
    pub fn into_service(self) -> StreamableHttpService<McpServer, LocalSessionManager> {
        StreamableHttpService::new(
            move || Ok(self.clone()),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig { stateful_mode: false, ..StreamableHttpServerConfig::default() },
        )
    }

    fn inbound(&self, context: &RequestContext<RoleServer>) -> InboundCredentials {
        match context.extensions.get::<Parts>() {
            Some(parts) => inbound_credentials(&parts.headers, &self.tenant_header),
            None => inbound_credentials(&HeaderMap::new(), &self.tenant_header),
        }
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Media-buy sales agent. Discover products with get_products, create buys with \
                 create_media_buy, then upload creatives with sync_creatives."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        if Skill::parse(&request.name).is_some() {
            return self.tool_router.call(ToolCallContext::new(self, request, context)).await;
        }
        // Unknown names still authenticate first and fail as UnsupportedOperation.
        let inbound = self.inbound(&context);
        self.call(&inbound, &request.name, request.arguments.unwrap_or_default()).await
    }
}

fn tool_result(outcome: &DispatchOutcome) -> Result<CallToolResult, ErrorData> {
    match encode(outcome) {
        Ok((result, payload)) => {
            let mut tool_result = CallToolResult::success(vec![Content::text(result.summary())]);
            tool_result.structured_content = Some(payload);
            Ok(tool_result)
        }
        Err(body) => {
            let text = format!("{}: {}", body.code.as_str(), body.message);
            let structured = serde_json::to_value(&body).map_err(|error| {
                rejection_from(McpError::Internal(error.to_string()), &outcome.correlation_id)
            })?;
            let mut tool_result = CallToolResult::error(vec![Content::text(text)]);
            tool_result.structured_content = Some(structured);
            Ok(tool_result)
        }
    }
}

fn rejection(error: AuthError, correlation_id: &str) -> ErrorData {
    rejection_from(McpError::Auth(error), correlation_id)
}

fn rejection_from(error: McpError, correlation_id: &str) -> ErrorData {
    warn!(
        event_name = "mcp.request_rejected",
        correlation_id = %correlation_id,
        error_code = error.code_name(),
        error = %error,
        "mcp request rejected"
    );
    let JsonRpcError { code, message, data } = JsonRpcError::from_error(&error, correlation_id);
    ErrorData::new(ErrorCode(code), message, data)
}
