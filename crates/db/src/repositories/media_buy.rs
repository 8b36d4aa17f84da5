use sqlx::{sqlite::SqliteRow, Row};

use salesagent_core::domain::media_buy::{MediaBuy, MediaBuyId, MediaBuyStatus};
use salesagent_core::domain::principal::PrincipalId;
use salesagent_core::domain::tenant::TenantId;

use super::{
    decode_document, encode_document, parse_u32, MediaBuyRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlMediaBuyRepository {
    pool: DbPool,
}

impl SqlMediaBuyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MediaBuyRepository for SqlMediaBuyRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &MediaBuyId,
    ) -> Result<Option<MediaBuy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state_version, document_json FROM media_buy WHERE tenant_id = ? AND id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(media_buy_from_row).transpose()
    }

    async fn list_for_principal(
        &self,
        tenant_id: &TenantId,
        principal_id: &PrincipalId,
    ) -> Result<Vec<MediaBuy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT state_version, document_json
             FROM media_buy
             WHERE tenant_id = ? AND principal_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&tenant_id.0)
        .bind(&principal_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(media_buy_from_row).collect()
    }

    async fn list_by_status(
        &self,
        tenant_id: &TenantId,
        status: MediaBuyStatus,
    ) -> Result<Vec<MediaBuy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT state_version, document_json
             FROM media_buy
             WHERE tenant_id = ? AND status = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&tenant_id.0)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(media_buy_from_row).collect()
    }

    async fn insert(&self, media_buy: MediaBuy) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO media_buy (
                tenant_id, id, principal_id, status, state_version, document_json,
                status_changed_at, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, id) DO NOTHING",
        )
        .bind(&media_buy.tenant_id.0)
        .bind(&media_buy.id.0)
        .bind(&media_buy.principal_id.0)
        .bind(media_buy.status.as_str())
        .bind(i64::from(media_buy.state_version))
        .bind(encode_document("document_json", &media_buy)?)
        .bind(media_buy.status_changed_at.to_rfc3339())
        .bind(media_buy.created_at.to_rfc3339())
        .bind(media_buy.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Duplicate(format!("media buy `{}`", media_buy.id)));
        }
        Ok(())
    }

    async fn update(
        &self,
        media_buy: MediaBuy,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE media_buy SET
                status = ?,
                state_version = ?,
                document_json = ?,
                status_changed_at = ?,
                updated_at = ?
             WHERE tenant_id = ? AND id = ? AND state_version = ?",
        )
        .bind(media_buy.status.as_str())
        .bind(i64::from(media_buy.state_version))
        .bind(encode_document("document_json", &media_buy)?)
        .bind(media_buy.status_changed_at.to_rfc3339())
        .bind(media_buy.updated_at.to_rfc3339())
        .bind(&media_buy.tenant_id.0)
        .bind(&media_buy.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                media_buy_id: media_buy.id,
                expected: expected_version,
            });
        }
        Ok(())
    }
}

fn media_buy_from_row(row: SqliteRow) -> Result<MediaBuy, RepositoryError> {
    let document: String = row.try_get("document_json")?;
    let mut media_buy: MediaBuy = decode_document("document_json", &document)?;
    media_buy.state_version = parse_u32("state_version", row.try_get("state_version")?)?;
    Ok(media_buy)
}

#[cfg(test)]
mod tests {
    use salesagent_core::domain::media_buy::MediaBuyStatus;
    use salesagent_core::domain::principal::PrincipalId;
    use salesagent_core::domain::tenant::TenantId;

    use super::SqlMediaBuyRepository;
    use crate::repositories::test_support::{sample_media_buy, sample_tenant, setup_pool};
    use crate::repositories::{
        MediaBuyRepository, RepositoryError, SqlTenantRepository, TenantRepository,
    };
    use crate::DbPool;

    async fn seeded_pool() -> DbPool {
        let pool = setup_pool().await;
        let tenants = SqlTenantRepository::new(pool.clone());
        tenants.save(sample_tenant("acme")).await.expect("save acme");
        tenants.save(sample_tenant("globex")).await.expect("save globex");
        pool
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let repo = SqlMediaBuyRepository::new(seeded_pool().await);
        let buy = sample_media_buy("acme", "mb_1");
        repo.insert(buy.clone()).await.expect("insert");

        let found = repo.find(&buy.tenant_id, &buy.id).await.expect("find");
        assert_eq!(found, Some(buy.clone()));

        let cross = repo.find(&TenantId("globex".to_string()), &buy.id).await.expect("find");
        assert_eq!(cross, None);

        assert!(matches!(repo.insert(buy).await, Err(RepositoryError::Duplicate(_))));
    }

    #[tokio::test]
    async fn compare_and_set_allows_exactly_one_writer_per_version() {
        let repo = SqlMediaBuyRepository::new(seeded_pool().await);
        let buy = sample_media_buy("acme", "mb_1");
        repo.insert(buy.clone()).await.expect("insert");

        let mut winner = buy.clone();
        winner.status = MediaBuyStatus::PendingCreative;
        winner.state_version = 1;
        let mut loser = buy.clone();
        loser.status = MediaBuyStatus::Failed;
        loser.state_version = 1;

        repo.update(winner, 0).await.expect("winner");
        let conflict = repo.update(loser, 0).await.expect_err("loser must conflict");
        assert!(matches!(conflict, RepositoryError::VersionConflict { expected: 0, .. }));

        let stored = repo.find(&buy.tenant_id, &buy.id).await.expect("find").expect("present");
        assert_eq!(stored.status, MediaBuyStatus::PendingCreative);
        assert_eq!(stored.state_version, 1);
    }

    #[tokio::test]
    async fn listings_filter_by_status_and_principal() {
        let repo = SqlMediaBuyRepository::new(seeded_pool().await);
        let draft = sample_media_buy("acme", "mb_1");
        let mut active = sample_media_buy("acme", "mb_2");
        active.status = MediaBuyStatus::Active;
        let mut other_buyer = sample_media_buy("acme", "mb_3");
        other_buyer.principal_id = PrincipalId("buyer-2".to_string());
        let mut other_tenant = sample_media_buy("globex", "mb_4");
        other_tenant.status = MediaBuyStatus::Active;
        for buy in [draft, active, other_buyer, other_tenant] {
            repo.insert(buy).await.expect("insert");
        }

        let acme = TenantId("acme".to_string());
        let active = repo.list_by_status(&acme, MediaBuyStatus::Active).await.expect("by status");
        assert_eq!(active.iter().map(|buy| buy.id.0.as_str()).collect::<Vec<_>>(), ["mb_2"]);

        let mine = repo
            .list_for_principal(&acme, &PrincipalId("buyer-1".to_string()))
            .await
            .expect("by principal");
        assert_eq!(mine.iter().map(|buy| buy.id.0.as_str()).collect::<Vec<_>>(), ["mb_1", "mb_2"]);
    }
}
