use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::creative::CreativeId;
use crate::domain::media_buy::{MediaBuyId, MediaBuyStatus};
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowStepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepKind {
    StatusTransition,
    CreativeReview,
    BudgetUpdate,
    DeliveryReconciliation,
}

impl WorkflowStepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusTransition => "status_transition",
            Self::CreativeReview => "creative_review",
            Self::BudgetUpdate => "budget_update",
            Self::DeliveryReconciliation => "delivery_reconciliation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "status_transition" => Some(Self::StatusTransition),
            "creative_review" => Some(Self::CreativeReview),
            "budget_update" => Some(Self::BudgetUpdate),
            "delivery_reconciliation" => Some(Self::DeliveryReconciliation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Rejected,
    Failed,
    Recorded,
}

/// One immutable audit entry on a media buy. `sequence` is assigned by the
/// repository on append and is dense per media buy, starting at 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: WorkflowStepId,
    pub tenant_id: TenantId,
    pub media_buy_id: MediaBuyId,
    pub creative_id: Option<CreativeId>,
    pub sequence: u32,
    pub kind: WorkflowStepKind,
    pub actor: String,
    pub from_status: Option<MediaBuyStatus>,
    pub to_status: Option<MediaBuyStatus>,
    pub outcome: StepOutcome,
    pub detail: BTreeMap<String, String>,
    pub fingerprint: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowStep {
    pub fn new(
        tenant_id: TenantId,
        media_buy_id: MediaBuyId,
        kind: WorkflowStepKind,
        actor: impl Into<String>,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            id: WorkflowStepId(Uuid::new_v4().to_string()),
            tenant_id,
            media_buy_id,
            creative_id: None,
            sequence: 0,
            kind,
            actor: actor.into(),
            from_status: None,
            to_status: None,
            outcome,
            detail: BTreeMap::new(),
            fingerprint: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_transition(mut self, from: MediaBuyStatus, to: MediaBuyStatus) -> Self {
        self.from_status = Some(from);
        self.to_status = Some(to);
        self
    }

    pub fn with_creative(mut self, creative_id: CreativeId) -> Self {
        self.creative_id = Some(creative_id);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{StepOutcome, WorkflowStep, WorkflowStepKind};
    use crate::domain::media_buy::{MediaBuyId, MediaBuyStatus};
    use crate::domain::tenant::TenantId;

    #[test]
    fn builder_records_transition_and_detail() {
        let step = WorkflowStep::new(
            TenantId("tenant_a".to_string()),
            MediaBuyId("mb_1".to_string()),
            WorkflowStepKind::StatusTransition,
            "system",
            StepOutcome::Succeeded,
        )
        .with_transition(MediaBuyStatus::Draft, MediaBuyStatus::PendingCreative)
        .with_detail("event", "buy_accepted");

        assert_eq!(step.from_status, Some(MediaBuyStatus::Draft));
        assert_eq!(step.to_status, Some(MediaBuyStatus::PendingCreative));
        assert_eq!(step.detail.get("event").map(String::as_str), Some("buy_accepted"));
        assert_eq!(step.sequence, 0);
    }

    #[test]
    fn step_kind_round_trips_from_storage_encoding() {
        for kind in [
            WorkflowStepKind::StatusTransition,
            WorkflowStepKind::CreativeReview,
            WorkflowStepKind::BudgetUpdate,
            WorkflowStepKind::DeliveryReconciliation,
        ] {
            assert_eq!(WorkflowStepKind::parse(kind.as_str()), Some(kind));
        }
    }
}
