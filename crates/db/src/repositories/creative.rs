use sqlx::Row;

use salesagent_core::domain::creative::{Creative, CreativeId, ReviewStatus};
use salesagent_core::domain::media_buy::MediaBuyId;
use salesagent_core::domain::principal::PrincipalId;
use salesagent_core::domain::tenant::TenantId;

use super::{decode_document, encode_document, CreativeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCreativeRepository {
    pool: DbPool,
}

impl SqlCreativeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn list_where(
        &self,
        tenant_id: &TenantId,
        column: &'static str,
        value: &str,
    ) -> Result<Vec<Creative>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT document_json FROM creative
             WHERE tenant_id = ? AND {column} = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&tenant_id.0)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let document: String = row.try_get("document_json")?;
                decode_document("document_json", &document)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CreativeRepository for SqlCreativeRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &CreativeId,
    ) -> Result<Option<Creative>, RepositoryError> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document_json FROM creative WHERE tenant_id = ? AND id = ?")
                .bind(&tenant_id.0)
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;
        document.map(|document| decode_document("document_json", &document)).transpose()
    }

    async fn list_for_media_buy(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<Creative>, RepositoryError> {
        self.list_where(tenant_id, "media_buy_id", &media_buy_id.0).await
    }

    async fn list_for_principal(
        &self,
        tenant_id: &TenantId,
        principal_id: &PrincipalId,
    ) -> Result<Vec<Creative>, RepositoryError> {
        self.list_where(tenant_id, "principal_id", &principal_id.0).await
    }

    async fn list_pending_review(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Creative>, RepositoryError> {
        self.list_where(tenant_id, "review_status", ReviewStatus::PendingReview.as_str()).await
    }

    async fn save(&self, creative: Creative) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO creative (
                tenant_id, id, principal_id, media_buy_id, review_status, document_json,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, id) DO UPDATE SET
                principal_id = excluded.principal_id,
                media_buy_id = excluded.media_buy_id,
                review_status = excluded.review_status,
                document_json = excluded.document_json,
                updated_at = excluded.updated_at",
        )
        .bind(&creative.tenant_id.0)
        .bind(&creative.id.0)
        .bind(&creative.principal_id.0)
        .bind(creative.media_buy_id.as_ref().map(|id| id.0.as_str()))
        .bind(creative.review.status.as_str())
        .bind(encode_document("document_json", &creative)?)
        .bind(creative.created_at.to_rfc3339())
        .bind(creative.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
