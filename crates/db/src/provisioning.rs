//! Startup provisioning from a TOML tenant manifest.
//!
//! Tenants are never created by requests. Operators describe tenants, their
//! principals and their product catalogs in a manifest which is upserted into
//! the repositories when the server boots. Access tokens never appear in the
//! manifest: a principal names either the blake3 hash of its token or an
//! environment variable holding the raw token.

use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use salesagent_core::domain::pricing_option::PricingOption;
use salesagent_core::domain::principal::{PermissionScope, Principal, PrincipalId, TokenHash};
use salesagent_core::domain::product::{DeliveryType, Product, ProductId};
use salesagent_core::domain::tenant::{Tenant, TenantConfig, TenantId};

use crate::repositories::{
    PrincipalRepository, ProductRepository, RepositoryError, TenantRepository,
};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("failed to read tenant manifest `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse tenant manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid tenant manifest: {0}")]
    Invalid(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantManifest {
    #[serde(default)]
    pub tenants: Vec<TenantEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantEntry {
    pub id: String,
    pub name: String,
    pub subdomain: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub config: TenantConfig,
    #[serde(default)]
    pub principals: Vec<PrincipalEntry>,
    #[serde(default)]
    pub products: Vec<ProductEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalEntry {
    pub id: String,
    pub name: String,
    pub scope: PermissionScope,
    #[serde(default)]
    pub token_hash: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductEntry {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub format_ids: Vec<String>,
    pub pricing_options: Vec<PricingOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionSummary {
    pub tenants: usize,
    pub principals: usize,
    pub products: usize,
}

fn default_active() -> bool {
    true
}

impl TenantManifest {
    pub fn load(path: &Path) -> Result<Self, ProvisioningError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ProvisioningError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ProvisioningError> {
        let manifest: Self = toml::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ProvisioningError> {
        let mut subdomains = std::collections::HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.trim().is_empty() || tenant.subdomain.trim().is_empty() {
                return Err(ProvisioningError::Invalid(
                    "tenant id and subdomain must not be empty".to_string(),
                ));
            }
            if !subdomains.insert(tenant.subdomain.to_ascii_lowercase()) {
                return Err(ProvisioningError::Invalid(format!(
                    "subdomain `{}` is used by more than one tenant",
                    tenant.subdomain
                )));
            }
            for principal in &tenant.principals {
                if principal.token_hash.is_some() == principal.token_env.is_some() {
                    return Err(ProvisioningError::Invalid(format!(
                        "principal `{}` of tenant `{}` needs exactly one of token_hash or token_env",
                        principal.id, tenant.id
                    )));
                }
            }
            for product in &tenant.products {
                if product.pricing_options.is_empty() {
                    return Err(ProvisioningError::Invalid(format!(
                        "product `{}` of tenant `{}` has no pricing options",
                        product.product_id, tenant.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Upserts every tenant, principal and product. Token environment
    /// variables are read through `lookup`.
    pub async fn apply(
        &self,
        tenants: &dyn TenantRepository,
        principals: &dyn PrincipalRepository,
        products: &dyn ProductRepository,
        lookup: &(dyn Fn(&str) -> Option<String> + Send + Sync),
    ) -> Result<ProvisionSummary, ProvisioningError> {
        let now = Utc::now();
        let mut summary = ProvisionSummary::default();

        for entry in &self.tenants {
            let tenant_id = TenantId(entry.id.trim().to_string());
            let created_at = tenants
                .find_by_id(&tenant_id)
                .await?
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            tenants
                .save(Tenant {
                    id: tenant_id.clone(),
                    name: entry.name.clone(),
                    subdomain: entry.subdomain.trim().to_ascii_lowercase(),
                    active: entry.active,
                    config: entry.config.clone(),
                    created_at,
                    updated_at: now,
                })
                .await?;
            summary.tenants += 1;

            for principal in &entry.principals {
                let token_hash = principal_token_hash(principal, lookup)?;
                principals
                    .save(Principal {
                        id: PrincipalId(principal.id.clone()),
                        tenant_id: tenant_id.clone(),
                        name: principal.name.clone(),
                        token_hash,
                        scope: principal.scope,
                        created_at: now,
                    })
                    .await?;
                summary.principals += 1;
            }

            for product in &entry.products {
                products
                    .save(Product {
                        product_id: ProductId(product.product_id.clone()),
                        tenant_id: tenant_id.clone(),
                        name: product.name.clone(),
                        description: product.description.clone(),
                        delivery_type: product.delivery_type,
                        format_ids: product.format_ids.clone(),
                        pricing_options: product.pricing_options.clone(),
                    })
                    .await?;
                summary.products += 1;
            }
        }

        Ok(summary)
    }
}

fn principal_token_hash(
    principal: &PrincipalEntry,
    lookup: &(dyn Fn(&str) -> Option<String> + Send + Sync),
) -> Result<TokenHash, ProvisioningError> {
    if let Some(hash) = &principal.token_hash {
        return Ok(TokenHash(hash.trim().to_ascii_lowercase()));
    }
    let variable = principal.token_env.as_deref().unwrap_or_default();
    match lookup(variable) {
        Some(token) if !token.trim().is_empty() => Ok(TokenHash::of(token.trim())),
        _ => Err(ProvisioningError::Invalid(format!(
            "environment variable `{variable}` for principal `{}` is not set",
            principal.id
        ))),
    }
}
