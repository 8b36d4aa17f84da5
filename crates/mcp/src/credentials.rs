//! Caller identity lifted from HTTP request headers.

use http::{header, HeaderMap};
use uuid::Uuid;

use salesagent_agent::InboundCredentials;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const AUTH_HEADER: &str = "x-adcp-auth";

/// Reads host, tenant header, token and correlation id. The token comes from
/// `Authorization: Bearer` or, failing that, `x-adcp-auth`.
pub fn inbound_credentials(headers: &HeaderMap, tenant_header: &str) -> InboundCredentials {
    let correlation_id = header_value(headers, CORRELATION_HEADER)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut inbound = InboundCredentials::new(correlation_id);

    if let Some(host) = header_value(headers, header::HOST.as_str()) {
        inbound = inbound.with_host(host);
    }
    if let Some(tenant) = header_value(headers, tenant_header) {
        inbound = inbound.with_tenant_header(tenant);
    }
    if let Some(token) = bearer_token(headers).or_else(|| header_value(headers, AUTH_HEADER)) {
        inbound = inbound.with_token(token);
    }
    inbound
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_value(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
