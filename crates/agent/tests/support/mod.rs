#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use salesagent_agent::{
    AgentRuntime, AgentSettings, DispatchOutcome, DomainResult, InboundCredentials,
};
use salesagent_core::adapter::{
    AdServerAdapter, AdapterRegistry, EnvCredentialResolver, RetryPolicy, SimulationAdapter,
};
use salesagent_core::audit::InMemoryAuditSink;
use salesagent_core::domain::pricing_option::PricingOption;
use salesagent_core::domain::principal::{PermissionScope, Principal, PrincipalId, TokenHash};
use salesagent_core::domain::product::{DeliveryType, Product, ProductId};
use salesagent_core::domain::tenant::{Tenant, TenantConfig, TenantId};
use salesagent_core::errors::ErrorCode;
use salesagent_db::repositories::{PrincipalRepository, ProductRepository, TenantRepository};
use salesagent_db::RepositorySet;

pub const ACME_BUYER: &str = "acme-buyer-token";
pub const ACME_OTHER_BUYER: &str = "acme-other-buyer-token";
pub const ACME_REVIEWER: &str = "acme-reviewer-token";
pub const GLOBEX_BUYER: &str = "globex-buyer-token";

pub struct Harness {
    pub runtime: AgentRuntime,
    pub repos: RepositorySet,
    pub adapter: Arc<SimulationAdapter>,
    pub audit: InMemoryAuditSink,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(TenantConfig::default()).await
    }

    /// Seed `acme` with `config` and `globex` with defaults.
    pub async fn with_config(config: TenantConfig) -> Self {
        let repos = RepositorySet::in_memory();
        seed_tenant(&repos, "acme", config).await;
        seed_tenant(&repos, "globex", TenantConfig::default()).await;
        seed_principal(&repos, "acme", "buyer-1", ACME_BUYER, PermissionScope::Buyer).await;
        seed_principal(&repos, "acme", "buyer-2", ACME_OTHER_BUYER, PermissionScope::Buyer).await;
        seed_principal(&repos, "acme", "reviewer-1", ACME_REVIEWER, PermissionScope::Reviewer).await;
        seed_principal(&repos, "globex", "buyer-9", GLOBEX_BUYER, PermissionScope::Buyer).await;
        for product in [
            display_product("acme", "homepage"),
            eur_product("acme", "newsletter"),
            display_product("globex", "sports"),
        ] {
            repos.products.save(product).await.expect("seed product");
        }

        let adapter = Arc::new(SimulationAdapter::new());
        let registry = AdapterRegistry::new()
            .with_adapter(Arc::clone(&adapter) as Arc<dyn AdServerAdapter>);
        let audit = InMemoryAuditSink::default();
        let settings = AgentSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                multiplier: 2,
                call_timeout: Duration::from_secs(5),
            },
            ..AgentSettings::default()
        };
        let runtime = AgentRuntime::new(
            repos.clone(),
            registry,
            Arc::new(EnvCredentialResolver::with_lookup(|_| None)),
            Arc::new(audit.clone()),
            settings,
        );

        Self { runtime, repos, adapter, audit }
    }

    pub async fn call(&self, tenant: &str, token: &str, skill: &str, input: Value) -> DispatchOutcome {
        let inbound = InboundCredentials::new(format!("test-{skill}"))
            .with_tenant_header(tenant)
            .with_token(token);
        self.runtime.handle(&inbound, skill, input).await.expect("request authenticates")
    }

    pub async fn buyer(&self, skill: &str, input: Value) -> DispatchOutcome {
        self.call("acme", ACME_BUYER, skill, input).await
    }

    pub async fn reviewer(&self, skill: &str, input: Value) -> DispatchOutcome {
        self.call("acme", ACME_REVIEWER, skill, input).await
    }

    pub fn acme() -> TenantId {
        TenantId("acme".to_string())
    }
}

pub fn expect_ok(outcome: DispatchOutcome) -> DomainResult {
    match outcome.result {
        Ok(result) => result,
        Err(error) => panic!("`{}` failed: {error}", outcome.skill),
    }
}

pub fn expect_code(outcome: DispatchOutcome) -> ErrorCode {
    match outcome.result {
        Ok(result) => panic!("`{}` unexpectedly succeeded: {result:?}", outcome.skill),
        Err(error) => error.code(),
    }
}

pub fn create_input(start: DateTime<Utc>, end: DateTime<Utc>) -> Value {
    json!({
        "buyer_ref": "spring-campaign",
        "packages": [
            { "product_id": "homepage", "pricing_option_id": "cpm_usd_fixed", "budget": 2500 }
        ],
        "start_time": start,
        "end_time": end
    })
}

pub fn creative_input(media_buy_id: &str, creative_id: &str) -> Value {
    json!({
        "media_buy_id": media_buy_id,
        "creatives": [{
            "creative_id": creative_id,
            "name": "Spring banner",
            "format_id": "display_300x250",
            "asset_url": "https://cdn.example.com/spring.png",
            "click_url": "https://brand.example.com/spring"
        }]
    })
}

fn fixed_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("timestamp")
}

async fn seed_tenant(repos: &RepositorySet, id: &str, config: TenantConfig) {
    let tenant = Tenant {
        id: TenantId(id.to_string()),
        name: format!("{id} media"),
        subdomain: id.to_string(),
        active: true,
        config,
        created_at: fixed_timestamp(),
        updated_at: fixed_timestamp(),
    };
    repos.tenants.save(tenant).await.expect("seed tenant");
}

async fn seed_principal(
    repos: &RepositorySet,
    tenant: &str,
    id: &str,
    token: &str,
    scope: PermissionScope,
) {
    let principal = Principal {
        id: PrincipalId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        name: format!("{id} agency"),
        token_hash: TokenHash::of(token),
        scope,
        created_at: fixed_timestamp(),
    };
    repos.principals.save(principal).await.expect("seed principal");
}

fn display_product(tenant: &str, id: &str) -> Product {
    Product {
        product_id: ProductId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        name: format!("{id} display"),
        description: "Above-the-fold display placement".to_string(),
        delivery_type: DeliveryType::Guaranteed,
        format_ids: vec!["display_300x250".to_string(), "display_728x90".to_string()],
        pricing_options: vec![
            option(json!({
                "pricing_option_id": "cpm_usd_fixed",
                "pricing_model": "cpm",
                "currency": "USD",
                "is_fixed": true,
                "rate": 12.5,
                "min_spend": 500.0
            })),
            option(json!({
                "pricing_option_id": "cpm_usd_auction",
                "pricing_model": "cpm",
                "currency": "USD",
                "is_fixed": false,
                "floor": 5.0,
                "median": 8.0
            })),
        ],
    }
}

fn eur_product(tenant: &str, id: &str) -> Product {
    Product {
        product_id: ProductId(id.to_string()),
        tenant_id: TenantId(tenant.to_string()),
        name: format!("{id} sponsorship"),
        description: "Weekly newsletter sponsorship".to_string(),
        delivery_type: DeliveryType::NonGuaranteed,
        format_ids: vec!["native_text".to_string()],
        pricing_options: vec![option(json!({
            "pricing_option_id": "flat_eur",
            "pricing_model": "flat_rate",
            "currency": "EUR",
            "is_fixed": true,
            "rate": 1500.0
        }))],
    }
}

fn option(value: Value) -> PricingOption {
    serde_json::from_value(value).expect("pricing option")
}
