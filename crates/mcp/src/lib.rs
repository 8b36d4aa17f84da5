//! Protocol surfaces of the sales agent.
//!
//! Both funnel into the same [`AgentRuntime`](salesagent_agent::AgentRuntime):
//!
//! - [`McpServer`]: an `rmcp` server handler with one tool per skill, served
//!   over streamable HTTP
//! - [`A2aServer`]: JSON-RPC `message/send`, plus the agent card
//!
//! [`credentials`] lifts HTTP headers into
//! [`InboundCredentials`](salesagent_agent::InboundCredentials) for both.

pub mod a2a;
pub mod credentials;
pub mod jsonrpc;
mod server;

pub use a2a::{A2aServer, AgentCard};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::McpServer;

use thiserror::Error;

use salesagent_agent::AuthError;

/// Errors raised before a skill is dispatched. Skill failures travel inside
/// the envelope instead.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum McpError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// JSON-RPC error code.
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::Parse(_) => -32700,
            McpError::InvalidRequest(_) => -32600,
            McpError::MethodNotFound(_) => -32601,
            McpError::InvalidParams(_) => -32602,
            McpError::Auth(AuthError::TenantResolution(_) | AuthError::InvalidAuthToken) => -32001,
            McpError::Auth(AuthError::RateLimited { .. }) => -32029,
            McpError::Auth(AuthError::Unavailable) | McpError::Internal(_) => -32603,
        }
    }

    /// Stable error identifier placed in the error `data`.
    pub fn code_name(&self) -> &'static str {
        match self {
            McpError::Parse(_) => "ParseError",
            McpError::InvalidRequest(_) => "InvalidRequest",
            McpError::MethodNotFound(_) => "MethodNotFound",
            McpError::InvalidParams(_) => "SchemaValidationError",
            McpError::Auth(error) => error.code().as_str(),
            McpError::Internal(_) => "InternalError",
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            McpError::Auth(AuthError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use salesagent_agent::AuthError;

    use super::McpError;

    #[test]
    fn auth_failures_map_to_server_error_codes() {
        let unknown = McpError::from(AuthError::InvalidAuthToken);
        assert_eq!(unknown.error_code(), -32001);
        assert_eq!(unknown.code_name(), "InvalidAuthToken");

        let throttled = McpError::from(AuthError::RateLimited { retry_after_secs: 12 });
        assert_eq!(throttled.error_code(), -32029);
        assert_eq!(throttled.retry_after_secs(), Some(12));

        assert_eq!(McpError::from(AuthError::TenantResolution("no tenant")).code_name(), "TenantResolutionError");
    }
}
