use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use salesagent_core::adapter::{AdapterRegistry, CredentialResolver, RetryPolicy};
use salesagent_core::audit::AuditSink;
use salesagent_core::config::AppConfig;
use salesagent_db::repositories::RepositorySet;

use crate::catalog::CatalogCache;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::guard::{AuthError, InboundCredentials, TenantGuard};
use crate::reconciler::Reconciler;
use crate::service::MediaBuyService;
use crate::throttle::RequestThrottle;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub base_domain: Option<String>,
    pub catalog_ttl: Duration,
    pub requests_per_minute: u32,
    pub retry: RetryPolicy,
    pub reconciliation_granularity: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_domain: None,
            catalog_ttl: Duration::from_secs(60),
            requests_per_minute: 0,
            retry: RetryPolicy::default(),
            reconciliation_granularity: Duration::from_secs(3_600),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_domain: config.tenancy.base_domain.clone(),
            catalog_ttl: Duration::from_secs(config.tenancy.catalog_cache_ttl_secs),
            requests_per_minute: config.tenancy.requests_per_minute,
            retry: RetryPolicy::from(&config.adapter),
            reconciliation_granularity: Duration::from_secs(
                config.reconciliation.window_granularity_secs,
            ),
        }
    }
}

/// The wired agent: authenticate, then dispatch. Both transports go through
/// [`AgentRuntime::handle`].
pub struct AgentRuntime {
    guard: TenantGuard,
    dispatcher: Dispatcher,
    reconciler: Arc<Reconciler>,
}

impl AgentRuntime {
    pub fn new(
        repos: RepositorySet,
        adapters: AdapterRegistry,
        credentials: Arc<dyn CredentialResolver>,
        audit: Arc<dyn AuditSink>,
        settings: AgentSettings,
    ) -> Self {
        let catalog = Arc::new(CatalogCache::new(Arc::clone(&repos.products), settings.catalog_ttl));
        let guard = TenantGuard::new(Arc::clone(&repos.tenants), Arc::clone(&repos.principals), audit)
            .with_base_domain(settings.base_domain)
            .with_throttle(RequestThrottle::per_minute(settings.requests_per_minute))
            .with_catalog(Arc::clone(&catalog));
        let service = Arc::new(MediaBuyService::new(
            repos,
            catalog,
            adapters,
            credentials,
            settings.retry,
        ));
        let reconciler =
            Arc::new(Reconciler::new(Arc::clone(&service), settings.reconciliation_granularity));

        Self { guard, dispatcher: Dispatcher::new(service), reconciler }
    }

    pub async fn handle(
        &self,
        inbound: &InboundCredentials,
        skill: &str,
        input: Value,
    ) -> Result<DispatchOutcome, AuthError> {
        let ctx = self.guard.authenticate(inbound).await?;
        Ok(self.dispatcher.dispatch(&ctx, skill, input).await)
    }

    pub fn guard(&self) -> &TenantGuard {
        &self.guard
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }
}
