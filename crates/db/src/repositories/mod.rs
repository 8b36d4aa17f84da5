use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use salesagent_core::domain::creative::{Creative, CreativeId};
use salesagent_core::domain::media_buy::{MediaBuy, MediaBuyId, MediaBuyStatus};
use salesagent_core::domain::principal::{Principal, PrincipalId, TokenHash};
use salesagent_core::domain::product::{Product, ProductId};
use salesagent_core::domain::tenant::{Tenant, TenantId};
use salesagent_core::domain::workflow_step::{WorkflowStep, WorkflowStepKind};
use salesagent_core::errors::ApplicationError;

pub mod creative;
pub mod media_buy;
pub mod memory;
pub mod product;
pub mod tenant;
pub mod workflow_step;

#[cfg(test)]
pub(crate) mod test_support;

pub use creative::SqlCreativeRepository;
pub use media_buy::SqlMediaBuyRepository;
pub use memory::{
    InMemoryCreativeRepository, InMemoryMediaBuyRepository, InMemoryPrincipalRepository,
    InMemoryProductRepository, InMemoryTenantRepository, InMemoryWorkflowStepRepository,
};
pub use product::SqlProductRepository;
pub use tenant::{SqlPrincipalRepository, SqlTenantRepository};
pub use workflow_step::SqlWorkflowStepRepository;

/// Every repository the agent needs, behind trait objects so in-memory and
/// SQLite storage are interchangeable.
#[derive(Clone)]
pub struct RepositorySet {
    pub tenants: Arc<dyn TenantRepository>,
    pub principals: Arc<dyn PrincipalRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub media_buys: Arc<dyn MediaBuyRepository>,
    pub creatives: Arc<dyn CreativeRepository>,
    pub workflow_steps: Arc<dyn WorkflowStepRepository>,
}

impl RepositorySet {
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantRepository::default()),
            principals: Arc::new(InMemoryPrincipalRepository::default()),
            products: Arc::new(InMemoryProductRepository::default()),
            media_buys: Arc::new(InMemoryMediaBuyRepository::default()),
            creatives: Arc::new(InMemoryCreativeRepository::default()),
            workflow_steps: Arc::new(InMemoryWorkflowStepRepository::default()),
        }
    }

    pub fn sqlite(pool: crate::DbPool) -> Self {
        Self {
            tenants: Arc::new(SqlTenantRepository::new(pool.clone())),
            principals: Arc::new(SqlPrincipalRepository::new(pool.clone())),
            products: Arc::new(SqlProductRepository::new(pool.clone())),
            media_buys: Arc::new(SqlMediaBuyRepository::new(pool.clone())),
            creatives: Arc::new(SqlCreativeRepository::new(pool.clone())),
            workflow_steps: Arc::new(SqlWorkflowStepRepository::new(pool)),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("media buy `{media_buy_id}` changed concurrently (expected version {expected})")]
    VersionConflict { media_buy_id: MediaBuyId, expected: u32 },
    #[error("{0} already exists")]
    Duplicate(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::VersionConflict { .. } | RepositoryError::Duplicate(_) => {
                ApplicationError::Conflict(error.to_string())
            }
            RepositoryError::Database(_) | RepositoryError::Decode(_) => {
                ApplicationError::Persistence(error.to_string())
            }
        }
    }
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError>;
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError>;
    async fn save(&self, tenant: Tenant) -> Result<(), RepositoryError>;
}

/// Principals are only ever looked up inside an already-resolved tenant.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    async fn find_by_token(
        &self,
        tenant_id: &TenantId,
        token_hash: &TokenHash,
    ) -> Result<Option<Principal>, RepositoryError>;
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &PrincipalId,
    ) -> Result<Option<Principal>, RepositoryError>;
    async fn save(&self, principal: Principal) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Product>, RepositoryError>;
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &ProductId,
    ) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MediaBuyRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &MediaBuyId,
    ) -> Result<Option<MediaBuy>, RepositoryError>;

    async fn list_for_principal(
        &self,
        tenant_id: &TenantId,
        principal_id: &PrincipalId,
    ) -> Result<Vec<MediaBuy>, RepositoryError>;

    async fn list_by_status(
        &self,
        tenant_id: &TenantId,
        status: MediaBuyStatus,
    ) -> Result<Vec<MediaBuy>, RepositoryError>;

    /// Fails with `Duplicate` when the id is already taken within the tenant.
    async fn insert(&self, media_buy: MediaBuy) -> Result<(), RepositoryError>;

    /// Compare-and-set on `state_version`: the stored row must still be at
    /// `expected_version`, otherwise `VersionConflict` and nothing is written.
    async fn update(
        &self,
        media_buy: MediaBuy,
        expected_version: u32,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CreativeRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &CreativeId,
    ) -> Result<Option<Creative>, RepositoryError>;

    async fn list_for_media_buy(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<Creative>, RepositoryError>;

    async fn list_for_principal(
        &self,
        tenant_id: &TenantId,
        principal_id: &PrincipalId,
    ) -> Result<Vec<Creative>, RepositoryError>;

    async fn list_pending_review(&self, tenant_id: &TenantId)
        -> Result<Vec<Creative>, RepositoryError>;

    async fn save(&self, creative: Creative) -> Result<(), RepositoryError>;
}

/// Append-only audit trail. There is no update or delete.
#[async_trait]
pub trait WorkflowStepRepository: Send + Sync {
    /// Assigns the next per-buy sequence number and returns the stored step.
    async fn append(&self, step: WorkflowStep) -> Result<WorkflowStep, RepositoryError>;

    async fn list_for_media_buy(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<WorkflowStep>, RepositoryError>;

    async fn latest_of_kind(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
        kind: WorkflowStepKind,
    ) -> Result<Option<WorkflowStep>, RepositoryError>;
}

pub(crate) fn decode_document<T: serde::de::DeserializeOwned>(
    column: &str,
    value: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

pub(crate) fn encode_document<T: serde::Serialize>(
    column: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode `{column}`: {error}")))
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid non-negative integer in `{column}`: {value}"))
    })
}
