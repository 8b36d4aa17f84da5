//! Tenant resolution and authentication.
//!
//! Every request passes through [`TenantGuard::authenticate`] before any
//! tenant-scoped data is touched. The guard resolves exactly one tenant from
//! the host and the tenant header, then looks the bearer token up inside that
//! tenant only.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use salesagent_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use salesagent_core::domain::principal::TokenHash;
use salesagent_core::domain::tenant::{Tenant, TenantId};
use salesagent_core::errors::ErrorCode;
use salesagent_db::repositories::{PrincipalRepository, RepositoryError, TenantRepository};

use crate::catalog::CatalogCache;
use crate::context::RequestContext;
use crate::throttle::{RequestThrottle, ThrottleDecision};

const ACTOR: &str = "tenant-guard";

/// Raw identity material lifted off an inbound request by the transport.
#[derive(Clone, Debug, Default)]
pub struct InboundCredentials {
    pub host: Option<String>,
    pub tenant_header: Option<String>,
    pub token: Option<String>,
    pub correlation_id: String,
}

impl InboundCredentials {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), ..Self::default() }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_tenant_header(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_header = Some(tenant.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Messages never name the tenant or principal that was looked up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("tenant could not be resolved: {0}")]
    TenantResolution(&'static str),
    #[error("authentication token is missing or invalid")]
    InvalidAuthToken,
    #[error("request limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("tenant lookup is unavailable")]
    Unavailable,
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TenantResolution(_) => ErrorCode::TenantResolutionError,
            Self::InvalidAuthToken => ErrorCode::InvalidAuthToken,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Unavailable => ErrorCode::InternalError,
        }
    }
}

impl From<RepositoryError> for AuthError {
    fn from(error: RepositoryError) -> Self {
        tracing::error!(event_name = "auth.lookup_failed", error = %error, "tenant lookup failed");
        Self::Unavailable
    }
}

pub struct TenantGuard {
    tenants: Arc<dyn TenantRepository>,
    principals: Arc<dyn PrincipalRepository>,
    base_domain: Option<String>,
    throttle: RequestThrottle,
    catalog: Option<Arc<CatalogCache>>,
    audit: Arc<dyn AuditSink>,
}

impl TenantGuard {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        principals: Arc<dyn PrincipalRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            tenants,
            principals,
            base_domain: None,
            throttle: RequestThrottle::per_minute(0),
            catalog: None,
            audit,
        }
    }

    /// Hosts under `base_domain` resolve by their first label. Without a base
    /// domain only the tenant header is consulted.
    pub fn with_base_domain(mut self, base_domain: Option<String>) -> Self {
        self.base_domain = base_domain
            .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty());
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Catalog entries of tenants found inactive are evicted.
    pub fn with_catalog(mut self, catalog: Arc<CatalogCache>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn authenticate(&self, inbound: &InboundCredentials) -> Result<RequestContext, AuthError> {
        let tenant = self.resolve_tenant(inbound).await?;

        let token = inbound.token.as_deref().map(str::trim).filter(|token| !token.is_empty());
        let Some(token) = token else {
            self.reject(inbound, Some(&tenant.id), "auth.token_missing", "no token presented");
            return Err(AuthError::InvalidAuthToken);
        };
        let Some(principal) =
            self.principals.find_by_token(&tenant.id, &TokenHash::of(token)).await?
        else {
            self.reject(inbound, Some(&tenant.id), "auth.token_rejected", "unknown token");
            return Err(AuthError::InvalidAuthToken);
        };

        if let ThrottleDecision::Limited { retry_after_secs } =
            self.throttle.check(&tenant.id, &principal.id).await
        {
            self.audit.emit(
                AuditEvent::new(
                    Some(tenant.id.clone()),
                    &inbound.correlation_id,
                    "ingress.throttled",
                    AuditCategory::Ingress,
                    ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("principal_id", principal.id.0.clone()),
            );
            return Err(AuthError::RateLimited { retry_after_secs });
        }

        info!(
            event_name = "auth.request_authenticated",
            correlation_id = %inbound.correlation_id,
            tenant_id = %tenant.id,
            principal_id = %principal.id,
            scope = principal.scope.as_str(),
            "request authenticated"
        );
        Ok(RequestContext::new(tenant, principal, inbound.correlation_id.clone()))
    }

    async fn resolve_tenant(&self, inbound: &InboundCredentials) -> Result<Tenant, AuthError> {
        let header = inbound
            .tenant_header
            .as_deref()
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());
        let from_host = inbound.host.as_deref().and_then(|host| self.subdomain_of(host));

        let by_header = match &header {
            Some(value) => self.find_by_header(inbound, value).await?,
            None => None,
        };
        let by_host = match &from_host {
            Some(subdomain) => self.tenants.find_by_subdomain(subdomain).await?,
            None => None,
        };

        let tenant = match (header.is_some(), by_header, from_host.is_some(), by_host) {
            (true, Some(header_tenant), true, Some(host_tenant)) => {
                if header_tenant.id != host_tenant.id {
                    self.reject(inbound, None, "auth.tenant_ambiguous", "host and header disagree");
                    return Err(AuthError::TenantResolution("host and tenant header disagree"));
                }
                header_tenant
            }
            (true, Some(_), true, None) | (true, None, true, Some(_)) => {
                self.reject(inbound, None, "auth.tenant_ambiguous", "host and header disagree");
                return Err(AuthError::TenantResolution("host and tenant header disagree"));
            }
            (true, Some(tenant), false, _) | (false, _, true, Some(tenant)) => tenant,
            (false, _, false, _) => {
                self.reject(inbound, None, "auth.tenant_unresolved", "no tenant hint");
                return Err(AuthError::TenantResolution("no tenant was named by host or header"));
            }
            _ => {
                self.reject(inbound, None, "auth.tenant_unresolved", "unknown tenant");
                return Err(AuthError::TenantResolution("unknown tenant"));
            }
        };

        if !tenant.active {
            if let Some(catalog) = &self.catalog {
                catalog.evict(&tenant.id).await;
            }
            self.reject(inbound, None, "auth.tenant_inactive", "tenant is inactive");
            return Err(AuthError::TenantResolution("unknown tenant"));
        }

        debug!(
            event_name = "auth.tenant_resolved",
            correlation_id = %inbound.correlation_id,
            tenant_id = %tenant.id,
            "tenant resolved"
        );
        Ok(tenant)
    }

    /// The header may carry a tenant id or a subdomain. A value that is one
    /// tenant's id and another tenant's subdomain names neither.
    async fn find_by_header(
        &self,
        inbound: &InboundCredentials,
        value: &str,
    ) -> Result<Option<Tenant>, AuthError> {
        let by_id = self.tenants.find_by_id(&TenantId(value.to_string())).await?;
        let by_subdomain = self.tenants.find_by_subdomain(value).await?;
        match (by_id, by_subdomain) {
            (Some(by_id), Some(by_subdomain)) if by_id.id != by_subdomain.id => {
                self.reject(inbound, None, "auth.tenant_ambiguous", "header names two tenants");
                Err(AuthError::TenantResolution("tenant header is ambiguous"))
            }
            (Some(tenant), _) | (None, Some(tenant)) => Ok(Some(tenant)),
            (None, None) => Ok(None),
        }
    }

    fn subdomain_of(&self, host: &str) -> Option<String> {
        let base = self.base_domain.as_deref()?;
        let host = host.trim().to_ascii_lowercase();
        let host = host.split(':').next().unwrap_or_default().trim_end_matches('.');
        let prefix = host.strip_suffix(base)?.strip_suffix('.')?;
        let label = prefix.rsplit('.').next()?;
        (!label.is_empty()).then(|| label.to_string())
    }

    fn reject(
        &self,
        inbound: &InboundCredentials,
        tenant_id: Option<&TenantId>,
        event_type: &str,
        reason: &str,
    ) {
        self.audit.emit(
            AuditEvent::new(
                tenant_id.cloned(),
                &inbound.correlation_id,
                event_type,
                AuditCategory::Auth,
                ACTOR,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", reason),
        );
    }
}
