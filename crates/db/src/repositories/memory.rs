use std::collections::HashMap;

use tokio::sync::RwLock;

use salesagent_core::domain::creative::{Creative, CreativeId, ReviewStatus};
use salesagent_core::domain::media_buy::{MediaBuy, MediaBuyId, MediaBuyStatus};
use salesagent_core::domain::principal::{Principal, PrincipalId, TokenHash};
use salesagent_core::domain::product::{Product, ProductId};
use salesagent_core::domain::tenant::{Tenant, TenantId};
use salesagent_core::domain::workflow_step::{WorkflowStep, WorkflowStepKind};

use super::{
    CreativeRepository, MediaBuyRepository, PrincipalRepository, ProductRepository,
    RepositoryError, TenantRepository, WorkflowStepRepository,
};

type Scoped<K> = (TenantId, K);

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

#[async_trait::async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(id).cloned())
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.values().find(|tenant| tenant.subdomain.eq_ignore_ascii_case(subdomain)).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().await;
        let mut active: Vec<Tenant> = tenants.values().filter(|tenant| tenant.active).cloned().collect();
        active.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(active)
    }

    async fn save(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.write().await;
        tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPrincipalRepository {
    principals: RwLock<HashMap<Scoped<PrincipalId>, Principal>>,
}

#[async_trait::async_trait]
impl PrincipalRepository for InMemoryPrincipalRepository {
    async fn find_by_token(
        &self,
        tenant_id: &TenantId,
        token_hash: &TokenHash,
    ) -> Result<Option<Principal>, RepositoryError> {
        let principals = self.principals.read().await;
        Ok(principals
            .values()
            .find(|principal| &principal.tenant_id == tenant_id && &principal.token_hash == token_hash)
            .cloned())
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &PrincipalId,
    ) -> Result<Option<Principal>, RepositoryError> {
        let principals = self.principals.read().await;
        Ok(principals.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn save(&self, principal: Principal) -> Result<(), RepositoryError> {
        let mut principals = self.principals.write().await;
        principals.insert((principal.tenant_id.clone(), principal.id.clone()), principal);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<Scoped<ProductId>, Product>>,
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        let mut listed: Vec<Product> =
            products.values().filter(|product| &product.tenant_id == tenant_id).cloned().collect();
        listed.sort_by(|left, right| left.product_id.0.cmp(&right.product_id.0));
        Ok(listed)
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert((product.tenant_id.clone(), product.product_id.clone()), product);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMediaBuyRepository {
    media_buys: RwLock<HashMap<Scoped<MediaBuyId>, MediaBuy>>,
}

impl InMemoryMediaBuyRepository {
    async fn filtered(
        &self,
        tenant_id: &TenantId,
        predicate: impl Fn(&MediaBuy) -> bool,
    ) -> Vec<MediaBuy> {
        let media_buys = self.media_buys.read().await;
        let mut listed: Vec<MediaBuy> = media_buys
            .values()
            .filter(|buy| &buy.tenant_id == tenant_id && predicate(buy))
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        listed
    }
}

#[async_trait::async_trait]
impl MediaBuyRepository for InMemoryMediaBuyRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &MediaBuyId,
    ) -> Result<Option<MediaBuy>, RepositoryError> {
        let media_buys = self.media_buys.read().await;
        Ok(media_buys.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn list_for_principal(
        &self,
        tenant_id: &TenantId,
        principal_id: &PrincipalId,
    ) -> Result<Vec<MediaBuy>, RepositoryError> {
        Ok(self.filtered(tenant_id, |buy| &buy.principal_id == principal_id).await)
    }

    async fn list_by_status(
        &self,
        tenant_id: &TenantId,
        status: MediaBuyStatus,
    ) -> Result<Vec<MediaBuy>, RepositoryError> {
        Ok(self.filtered(tenant_id, |buy| buy.status == status).await)
    }

    async fn insert(&self, media_buy: MediaBuy) -> Result<(), RepositoryError> {
        let mut media_buys = self.media_buys.write().await;
        let key = (media_buy.tenant_id.clone(), media_buy.id.clone());
        if media_buys.contains_key(&key) {
            return Err(RepositoryError::Duplicate(format!("media buy `{}`", media_buy.id)));
        }
        media_buys.insert(key, media_buy);
        Ok(())
    }

    async fn update(
        &self,
        media_buy: MediaBuy,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let mut media_buys = self.media_buys.write().await;
        let key = (media_buy.tenant_id.clone(), media_buy.id.clone());
        match media_buys.get(&key) {
            Some(stored) if stored.state_version == expected_version => {
                media_buys.insert(key, media_buy);
                Ok(())
            }
            _ => Err(RepositoryError::VersionConflict {
                media_buy_id: media_buy.id,
                expected: expected_version,
            }),
        }
    }
}

#[derive(Default)]
pub struct InMemoryCreativeRepository {
    creatives: RwLock<HashMap<Scoped<CreativeId>, Creative>>,
}

impl InMemoryCreativeRepository {
    async fn filtered(
        &self,
        tenant_id: &TenantId,
        predicate: impl Fn(&Creative) -> bool,
    ) -> Vec<Creative> {
        let creatives = self.creatives.read().await;
        let mut listed: Vec<Creative> = creatives
            .values()
            .filter(|creative| &creative.tenant_id == tenant_id && predicate(creative))
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        listed
    }
}

#[async_trait::async_trait]
impl CreativeRepository for InMemoryCreativeRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &CreativeId,
    ) -> Result<Option<Creative>, RepositoryError> {
        let creatives = self.creatives.read().await;
        Ok(creatives.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn list_for_media_buy(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<Creative>, RepositoryError> {
        Ok(self
            .filtered(tenant_id, |creative| creative.media_buy_id.as_ref() == Some(media_buy_id))
            .await)
    }

    async fn list_for_principal(
        &self,
        tenant_id: &TenantId,
        principal_id: &PrincipalId,
    ) -> Result<Vec<Creative>, RepositoryError> {
        Ok(self.filtered(tenant_id, |creative| &creative.principal_id == principal_id).await)
    }

    async fn list_pending_review(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Creative>, RepositoryError> {
        Ok(self
            .filtered(tenant_id, |creative| creative.review.status == ReviewStatus::PendingReview)
            .await)
    }

    async fn save(&self, creative: Creative) -> Result<(), RepositoryError> {
        let mut creatives = self.creatives.write().await;
        creatives.insert((creative.tenant_id.clone(), creative.id.clone()), creative);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowStepRepository {
    steps: RwLock<HashMap<Scoped<MediaBuyId>, Vec<WorkflowStep>>>,
}

#[async_trait::async_trait]
impl WorkflowStepRepository for InMemoryWorkflowStepRepository {
    async fn append(&self, mut step: WorkflowStep) -> Result<WorkflowStep, RepositoryError> {
        let mut steps = self.steps.write().await;
        let trail =
            steps.entry((step.tenant_id.clone(), step.media_buy_id.clone())).or_default();
        step.sequence = u32::try_from(trail.len() + 1)
            .map_err(|_| RepositoryError::Decode("workflow step sequence overflow".to_string()))?;
        trail.push(step.clone());
        Ok(step)
    }

    async fn list_for_media_buy(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<WorkflowStep>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(steps.get(&(tenant_id.clone(), media_buy_id.clone())).cloned().unwrap_or_default())
    }

    async fn latest_of_kind(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
        kind: WorkflowStepKind,
    ) -> Result<Option<WorkflowStep>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(steps
            .get(&(tenant_id.clone(), media_buy_id.clone()))
            .and_then(|trail| trail.iter().rev().find(|step| step.kind == kind))
            .cloned())
    }
}
