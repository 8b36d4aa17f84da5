use sqlx::{sqlite::SqliteRow, Row};

use salesagent_core::domain::principal::{PermissionScope, Principal, PrincipalId, TokenHash};
use salesagent_core::domain::tenant::{Tenant, TenantId};

use super::{
    decode_document, encode_document, parse_timestamp, PrincipalRepository, RepositoryError,
    TenantRepository,
};
use crate::DbPool;

const TENANT_COLUMNS: &str =
    "id, name, subdomain, active, config_json, created_at, updated_at";

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenant WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(tenant_from_row).transpose()
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant WHERE lower(subdomain) = lower(?)"
        ))
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;
        row.map(tenant_from_row).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant WHERE active = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(tenant_from_row).collect()
    }

    async fn save(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tenant (id, name, subdomain, active, config_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                subdomain = excluded.subdomain,
                active = excluded.active,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at",
        )
        .bind(&tenant.id.0)
        .bind(&tenant.name)
        .bind(&tenant.subdomain)
        .bind(tenant.active)
        .bind(encode_document("config_json", &tenant.config)?)
        .bind(tenant.created_at.to_rfc3339())
        .bind(tenant.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn tenant_from_row(row: SqliteRow) -> Result<Tenant, RepositoryError> {
    let config_json: String = row.try_get("config_json")?;
    Ok(Tenant {
        id: TenantId(row.try_get("id")?),
        name: row.try_get("name")?,
        subdomain: row.try_get("subdomain")?,
        active: row.try_get("active")?,
        config: decode_document("config_json", &config_json)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub struct SqlPrincipalRepository {
    pool: DbPool,
}

impl SqlPrincipalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PrincipalRepository for SqlPrincipalRepository {
    async fn find_by_token(
        &self,
        tenant_id: &TenantId,
        token_hash: &TokenHash,
    ) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, id, name, token_hash, scope, created_at
             FROM principal
             WHERE tenant_id = ? AND token_hash = ?",
        )
        .bind(&tenant_id.0)
        .bind(&token_hash.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(principal_from_row).transpose()
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &PrincipalId,
    ) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, id, name, token_hash, scope, created_at
             FROM principal
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(principal_from_row).transpose()
    }

    async fn save(&self, principal: Principal) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO principal (tenant_id, id, name, token_hash, scope, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, id) DO UPDATE SET
                name = excluded.name,
                token_hash = excluded.token_hash,
                scope = excluded.scope",
        )
        .bind(&principal.tenant_id.0)
        .bind(&principal.id.0)
        .bind(&principal.name)
        .bind(&principal.token_hash.0)
        .bind(principal.scope.as_str())
        .bind(principal.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn principal_from_row(row: SqliteRow) -> Result<Principal, RepositoryError> {
    let scope: String = row.try_get("scope")?;
    Ok(Principal {
        id: PrincipalId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        token_hash: TokenHash(row.try_get("token_hash")?),
        scope: PermissionScope::parse(&scope)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown permission scope `{scope}`")))?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use salesagent_core::domain::principal::{PermissionScope, TokenHash};
    use salesagent_core::domain::tenant::{ApprovalPolicy, BudgetPolicy, TenantId};

    use super::{SqlPrincipalRepository, SqlTenantRepository};
    use crate::repositories::test_support::{sample_principal, sample_tenant, setup_pool};
    use crate::repositories::{PrincipalRepository, TenantRepository};

    #[tokio::test]
    async fn tenant_round_trip_keeps_config() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool);
        let mut tenant = sample_tenant("acme");
        tenant.config.budget_policy = BudgetPolicy::UpperBound;
        tenant.config.approval = ApprovalPolicy {
            allow_resubmission: true,
            approval_timeout_hours: 24,
            auto_approve_formats: vec!["display_300x250".to_string()],
        };

        repo.save(tenant.clone()).await.expect("save tenant");

        let by_id = repo.find_by_id(&tenant.id).await.expect("find by id");
        let by_subdomain = repo.find_by_subdomain("Acme").await.expect("find by subdomain");
        assert_eq!(by_id, Some(tenant.clone()));
        assert_eq!(by_subdomain, Some(tenant));
    }

    #[tokio::test]
    async fn inactive_tenants_are_not_listed() {
        let pool = setup_pool().await;
        let repo = SqlTenantRepository::new(pool);
        repo.save(sample_tenant("acme")).await.expect("save acme");
        let mut paused = sample_tenant("paused");
        paused.active = false;
        repo.save(paused).await.expect("save paused");

        let active = repo.list_active().await.expect("list active");
        assert_eq!(active.iter().map(|tenant| tenant.id.0.as_str()).collect::<Vec<_>>(), ["acme"]);
    }

    #[tokio::test]
    async fn principal_lookup_requires_matching_tenant() {
        let pool = setup_pool().await;
        let tenants = SqlTenantRepository::new(pool.clone());
        tenants.save(sample_tenant("acme")).await.expect("save acme");
        tenants.save(sample_tenant("globex")).await.expect("save globex");
        let repo = SqlPrincipalRepository::new(pool);
        let mut principal = sample_principal("acme", "reviewer-1", "acme-token");
        principal.scope = PermissionScope::Reviewer;
        repo.save(principal.clone()).await.expect("save principal");

        let hash = TokenHash::of("acme-token");
        let found = repo.find_by_token(&TenantId("acme".to_string()), &hash).await.expect("find");
        let cross = repo.find_by_token(&TenantId("globex".to_string()), &hash).await.expect("find");

        assert_eq!(found, Some(principal));
        assert_eq!(cross, None);
    }
}
