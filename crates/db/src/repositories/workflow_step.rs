use sqlx::{sqlite::SqliteRow, Row};

use salesagent_core::domain::media_buy::MediaBuyId;
use salesagent_core::domain::tenant::TenantId;
use salesagent_core::domain::workflow_step::{WorkflowStep, WorkflowStepKind};

use super::{
    decode_document, encode_document, parse_u32, RepositoryError, WorkflowStepRepository,
};
use crate::DbPool;

pub struct SqlWorkflowStepRepository {
    pool: DbPool,
}

impl SqlWorkflowStepRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkflowStepRepository for SqlWorkflowStepRepository {
    async fn append(&self, mut step: WorkflowStep) -> Result<WorkflowStep, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) + 1
             FROM workflow_step
             WHERE tenant_id = ? AND media_buy_id = ?",
        )
        .bind(&step.tenant_id.0)
        .bind(&step.media_buy_id.0)
        .fetch_one(&mut *tx)
        .await?;
        step.sequence = parse_u32("sequence", next)?;

        sqlx::query(
            "INSERT INTO workflow_step (
                id, tenant_id, media_buy_id, sequence, kind, document_json, occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&step.id.0)
        .bind(&step.tenant_id.0)
        .bind(&step.media_buy_id.0)
        .bind(next)
        .bind(step.kind.as_str())
        .bind(encode_document("document_json", &step)?)
        .bind(step.occurred_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(step)
    }

    async fn list_for_media_buy(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
    ) -> Result<Vec<WorkflowStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT sequence, document_json
             FROM workflow_step
             WHERE tenant_id = ? AND media_buy_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&tenant_id.0)
        .bind(&media_buy_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(step_from_row).collect()
    }

    async fn latest_of_kind(
        &self,
        tenant_id: &TenantId,
        media_buy_id: &MediaBuyId,
        kind: WorkflowStepKind,
    ) -> Result<Option<WorkflowStep>, RepositoryError> {
        let row = sqlx::query(
            "SELECT sequence, document_json
             FROM workflow_step
             WHERE tenant_id = ? AND media_buy_id = ? AND kind = ?
             ORDER BY sequence DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(&media_buy_id.0)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(step_from_row).transpose()
    }
}

fn step_from_row(row: SqliteRow) -> Result<WorkflowStep, RepositoryError> {
    let document: String = row.try_get("document_json")?;
    let mut step: WorkflowStep = decode_document("document_json", &document)?;
    step.sequence = parse_u32("sequence", row.try_get("sequence")?)?;
    Ok(step)
}

#[cfg(test)]
mod tests {
    use salesagent_core::domain::creative::CreativeId;
    use salesagent_core::domain::media_buy::{MediaBuyId, MediaBuyStatus};
    use salesagent_core::domain::tenant::TenantId;
    use salesagent_core::domain::workflow_step::{StepOutcome, WorkflowStep, WorkflowStepKind};

    use super::SqlWorkflowStepRepository;
    use crate::repositories::test_support::{sample_tenant, setup_pool};
    use crate::repositories::{SqlTenantRepository, TenantRepository, WorkflowStepRepository};

    #[tokio::test]
    async fn steps_are_appended_in_order_with_details() {
        let pool = setup_pool().await;
        SqlTenantRepository::new(pool.clone())
            .save(sample_tenant("acme"))
            .await
            .expect("save tenant");
        let repo = SqlWorkflowStepRepository::new(pool);
        let tenant_id = TenantId("acme".to_string());
        let media_buy_id = MediaBuyId("mb_1".to_string());

        let first = repo
            .append(
                WorkflowStep::new(
                    tenant_id.clone(),
                    media_buy_id.clone(),
                    WorkflowStepKind::StatusTransition,
                    "buyer-1",
                    StepOutcome::Succeeded,
                )
                .with_transition(MediaBuyStatus::Draft, MediaBuyStatus::PendingCreative)
                .with_detail("event", "buy_accepted"),
            )
            .await
            .expect("append first");
        let second = repo
            .append(
                WorkflowStep::new(
                    tenant_id.clone(),
                    media_buy_id.clone(),
                    WorkflowStepKind::CreativeReview,
                    "reviewer-1",
                    StepOutcome::Rejected,
                )
                .with_creative(CreativeId("cr_1".to_string()))
                .with_detail("feedback", "logo too small"),
            )
            .await
            .expect("append second");

        assert_eq!((first.sequence, second.sequence), (1, 2));

        let trail = repo.list_for_media_buy(&tenant_id, &media_buy_id).await.expect("list");
        assert_eq!(trail, vec![first.clone(), second]);
        assert_eq!(trail[0].to_status, Some(MediaBuyStatus::PendingCreative));

        let latest = repo
            .latest_of_kind(&tenant_id, &media_buy_id, WorkflowStepKind::StatusTransition)
            .await
            .expect("latest");
        assert_eq!(latest, Some(first));

        let none = repo
            .latest_of_kind(&tenant_id, &media_buy_id, WorkflowStepKind::DeliveryReconciliation)
            .await
            .expect("latest delivery");
        assert!(none.is_none());
    }
}
